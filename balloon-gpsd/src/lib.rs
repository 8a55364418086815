//! Client side of the [gpsd JSON protocol](https://gpsd.gitlab.io/gpsd/gpsd_json.html).
//!
//! After sending [`WATCH`], gpsd streams one JSON object per line. Only `TPV`
//! (time-position-velocity) reports are decoded, everything else is
//! [`Sentence::Other`].

use std::{
    pin::Pin,
    str::Utf8Error,
    task::{
        Context,
        Poll,
    },
};

use balloon_types::Point;
use chrono::{
    DateTime,
    Utc,
};
use futures_util::Stream;
use pin_project_lite::pin_project;
use serde::Deserialize;
use tokio::io::{
    AsyncRead,
    ReadBuf,
};

/// Enables streaming of JSON reports.
pub const WATCH: &str = "?WATCH={\"enable\":true,\"json\":true}\n";

const RECEIVE_BUFFER_SIZE: usize = 8192;

const FEET_PER_METER: f64 = 3.28084;
const MPH_PER_METER_PER_SECOND: f64 = 2.236936;

#[derive(Debug, thiserror::Error)]
#[error("gpsd decode error")]
pub enum Error {
    Io(#[from] std::io::Error),
    MaxLineLengthExceeded,
    InvalidEncoding(#[from] Utf8Error),
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "class")]
pub enum Sentence {
    #[serde(rename = "TPV")]
    Tpv(Tpv),
    #[serde(other)]
    Other,
}

/// A time-position-velocity report. gpsd leaves out fields it doesn't know,
/// e.g. everything but `mode` when there's no fix.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Tpv {
    pub device: Option<String>,
    #[serde(default)]
    pub mode: u8,
    pub time: Option<DateTime<Utc>>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    /// Altitude in meters. Deprecated by gpsd in favor of `altMSL`.
    pub alt: Option<f64>,
    #[serde(rename = "altMSL")]
    pub alt_msl: Option<f64>,
    /// Course over ground in degrees from true north.
    pub track: Option<f64>,
    /// Speed over ground in meters per second.
    pub speed: Option<f64>,
    pub climb: Option<f64>,
}

impl Tpv {
    /// Converts to a [`Point`] in feet and miles per hour. Missing coordinates
    /// read as zero, i.e. no fix.
    pub fn to_point(&self, received: DateTime<Utc>) -> Point {
        Point {
            lat: self.lat.unwrap_or_default(),
            lon: self.lon.unwrap_or_default(),
            altitude: self.alt.or(self.alt_msl).unwrap_or_default() * FEET_PER_METER,
            speed: self.speed.unwrap_or_default() * MPH_PER_METER_PER_SECOND,
            heading: self.track.map_or(0, |track| track.rem_euclid(360.0) as u16),
            time: self.time.unwrap_or(received),
            ..Default::default()
        }
    }
}

pin_project! {
    /// Reads newline-delimited gpsd reports.
    #[derive(Debug)]
    pub struct Reader<R> {
        #[pin]
        reader: R,
        receive_buffer: ReceiveBuffer,
    }
}

impl<R: AsyncRead> Reader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            receive_buffer: ReceiveBuffer::default(),
        }
    }
}

impl<R: AsyncRead> Stream for Reader<R> {
    type Item = Result<Sentence, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let this = self.as_mut().project();

            if let Some(line) = this.receive_buffer.next_line() {
                // gpsd terminates lines with `\r\n`, which leaves empty lines between
                if !line.is_empty() {
                    let result = str::from_utf8(line)
                        .map_err(Error::from)
                        .and_then(|line| Ok(serde_json::from_str(line)?));
                    return Poll::Ready(Some(result));
                }
            }
            else {
                this.receive_buffer.prepare_read();
                if this.receive_buffer.is_full() {
                    return Poll::Ready(Some(Err(Error::MaxLineLengthExceeded)));
                }

                let mut read_buf =
                    ReadBuf::new(&mut this.receive_buffer.buffer[this.receive_buffer.write_pos..]);
                match this.reader.poll_read(cx, &mut read_buf) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Err(error)) => return Poll::Ready(Some(Err(error.into()))),
                    Poll::Ready(Ok(())) => {
                        let num_bytes_read = read_buf.filled().len();
                        if num_bytes_read == 0 {
                            return Poll::Ready(None);
                        }

                        this.receive_buffer.write_pos += num_bytes_read;
                    }
                }
            }
        }
    }
}

#[derive(Debug)]
struct ReceiveBuffer {
    buffer: Box<[u8; RECEIVE_BUFFER_SIZE]>,
    read_pos: usize,
    write_pos: usize,
    no_newline_until: usize,
}

impl ReceiveBuffer {
    fn is_full(&self) -> bool {
        self.read_pos == 0 && self.write_pos == self.buffer.len()
    }

    fn next_line(&mut self) -> Option<&[u8]> {
        let index = self.buffer[self.no_newline_until..self.write_pos]
            .iter()
            .position(|byte| *byte == b'\r' || *byte == b'\n');

        if let Some(index) = index {
            let newline = index + self.no_newline_until;
            let start = self.read_pos;
            self.read_pos = newline + 1;
            self.no_newline_until = self.read_pos;
            Some(&self.buffer[start..newline])
        }
        else {
            self.no_newline_until = self.write_pos;
            None
        }
    }

    fn prepare_read(&mut self) {
        if self.read_pos == self.write_pos {
            self.read_pos = 0;
            self.write_pos = 0;
            self.no_newline_until = 0;
        }
        else if self.read_pos > 0 {
            // move partial line to the front
            self.buffer.copy_within(self.read_pos..self.write_pos, 0);
            self.write_pos -= self.read_pos;
            self.no_newline_until -= self.read_pos;
            self.read_pos = 0;
        }
    }
}

impl Default for ReceiveBuffer {
    fn default() -> Self {
        Self {
            buffer: Box::new([0; RECEIVE_BUFFER_SIZE]),
            read_pos: 0,
            write_pos: 0,
            no_newline_until: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::{
        TimeZone,
        Utc,
    };
    use futures_util::TryStreamExt;

    use crate::{
        Error,
        Reader,
        Sentence,
    };

    const EXAMPLE: &str = concat!(
        "{\"class\":\"VERSION\",\"release\":\"3.25\",\"rev\":\"3.25\",\"proto_major\":3,\"proto_minor\":15}\r\n",
        "{\"class\":\"WATCH\",\"enable\":true,\"json\":true,\"nmea\":false}\r\n",
        "{\"class\":\"TPV\",\"device\":\"/dev/ttyAMA0\",\"mode\":1}\r\n",
        "{\"class\":\"TPV\",\"device\":\"/dev/ttyAMA0\",\"mode\":3,\"time\":\"2014-06-20T17:34:12.000Z\",",
        "\"lat\":47.2111,\"lon\":-122.4898,\"alt\":63.1,\"track\":271.4,\"speed\":4.5,\"climb\":5.1}\r\n",
    );

    #[tokio::test]
    async fn it_reads_tpv_reports() {
        let mut reader = Reader::new(EXAMPLE.as_bytes());
        let mut reports = vec![];
        while let Some(sentence) = reader.try_next().await.unwrap() {
            if let Sentence::Tpv(tpv) = sentence {
                reports.push(tpv);
            }
        }
        assert_eq!(reports.len(), 2);

        let received = Utc::now();
        let no_fix = reports[0].to_point(received);
        assert!(!no_fix.has_fix());
        assert_eq!(no_fix.time, received);

        let point = reports[1].to_point(received);
        assert_abs_diff_eq!(point.lat, 47.2111);
        assert_abs_diff_eq!(point.lon, -122.4898);
        assert_abs_diff_eq!(point.altitude, 207.02, epsilon = 0.01);
        assert_abs_diff_eq!(point.speed, 10.066, epsilon = 0.001);
        assert_eq!(point.heading, 271);
        assert_eq!(
            point.time,
            Utc.with_ymd_and_hms(2014, 6, 20, 17, 34, 12).unwrap()
        );
    }

    #[tokio::test]
    async fn it_reports_malformed_json() {
        let mut reader = Reader::new(&b"{\"class\":\"TPV\",\"lat\":\n"[..]);
        assert!(matches!(reader.try_next().await, Err(Error::Json(_))));
    }

    #[tokio::test]
    async fn it_rejects_overlong_lines() {
        let data = vec![b'x'; 10000];
        let mut reader = Reader::new(&data[..]);
        assert!(matches!(
            reader.try_next().await,
            Err(Error::MaxLineLengthExceeded)
        ));
    }
}
