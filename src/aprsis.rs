//! Client for the APRS-IS network.
//!
//! - [APRS-IS](https://www.aprs-is.net/Connecting.aspx)

use balloon_ax25::Packet;
use balloon_types::Address;
use futures_util::StreamExt;
use tokio::{
    io::AsyncWriteExt,
    net::{
        TcpStream,
        tcp::{
            OwnedReadHalf,
            OwnedWriteHalf,
        },
    },
};
use tokio_util::codec::{
    FramedRead,
    LinesCodec,
};

use crate::Error;

pub const DEFAULT_SERVER: &str = "rotate.aprs2.net:14580";

const MAX_LINE_LENGTH: usize = 512;

/// Login passcode for a callsign. The SSID doesn't matter.
pub fn passcode(callsign: &Address) -> u16 {
    let callsign = callsign.callsign.to_ascii_uppercase();
    let hash = callsign
        .as_bytes()
        .chunks(2)
        .fold(0x73e2u16, |hash, pair| {
            let high = u16::from(pair[0]) << 8;
            let low = pair.get(1).copied().map_or(0, u16::from);
            hash ^ high ^ low
        });
    hash & 0x7fff
}

pub fn login_line(callsign: &Address, filter: Option<&str>) -> String {
    let mut line = format!(
        "user {callsign} pass {} vers balloon {}",
        passcode(callsign),
        env!("CARGO_PKG_VERSION")
    );
    if let Some(filter) = filter {
        line.push_str(" filter ");
        line.push_str(filter);
    }
    line
}

#[derive(Debug)]
pub struct AprsIsClient {
    reader: FramedRead<OwnedReadHalf, LinesCodec>,
    writer: OwnedWriteHalf,
}

impl AprsIsClient {
    /// Connects and logs in, optionally with a server-side filter like
    /// `r/47.2/-122.4/100`.
    pub async fn connect(server: &str, callsign: &Address, filter: Option<&str>) -> Result<Self, Error> {
        let stream = TcpStream::connect(server).await?;
        let (reader, mut writer) = stream.into_split();

        let mut login = login_line(callsign, filter);
        tracing::debug!(%login, "logging in");
        login.push_str("\r\n");
        writer.write_all(login.as_bytes()).await?;

        Ok(Self {
            reader: FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH)),
            writer,
        })
    }

    /// Returns the next packet, or `None` when the server closed the
    /// connection. Server comments and lines that aren't packets are skipped.
    pub async fn next_packet(&mut self) -> Result<Option<Packet>, Error> {
        while let Some(line) = self.reader.next().await {
            let line = line?;
            let line = line.trim_end_matches('\r');

            if line.is_empty() {
                continue;
            }
            if let Some(comment) = line.strip_prefix('#') {
                tracing::debug!(comment = comment.trim(), "server");
                continue;
            }

            match line.parse() {
                Ok(packet) => return Ok(Some(packet)),
                Err(error) => tracing::warn!(%error, "skipping line"),
            }
        }

        Ok(None)
    }

    pub async fn send(&mut self, packet: &Packet) -> Result<(), Error> {
        let line = format!("{packet}\r\n");
        self.writer.write_all(line.as_bytes()).await?;
        Ok(())
    }
}
