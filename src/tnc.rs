//! KISS session with the TNC: inbound frames are decoded and forwarded,
//! outbound packets are framed and written in the order they were queued.

use std::time::Duration;

use balloon_ax25::{
    Packet,
    kiss::{
        self,
        FrameKind,
    },
};
use futures_util::StreamExt;
use tokio::{
    io::{
        AsyncRead,
        AsyncWrite,
        AsyncWriteExt,
    },
    sync::mpsc::{
        self,
        error::TrySendError,
    },
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use crate::{
    Error,
    link::{
        Dial,
        Link,
    },
};

/// Runs until shutdown, or until either channel is closed. Reconnects
/// whenever the connection fails.
pub async fn run<D: Dial>(
    link: &Link<D>,
    mut outbound: mpsc::Receiver<Packet>,
    inbound: mpsc::Sender<Packet>,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    loop {
        let Some(stream) = link.connect(&shutdown).await?
        else {
            return Ok(());
        };

        match session(
            stream,
            link.dialer().read_timeout(),
            &mut outbound,
            &inbound,
            &shutdown,
        )
        .await
        {
            Ok(()) => return Ok(()),
            Err(error) => {
                tracing::warn!(link = link.name(), %error, "connection lost");
                link.mark_disconnected();
            }
        }
    }
}

/// Returns `Ok` when the session should end for good, and the error if the
/// connection failed.
async fn session<S: AsyncRead + AsyncWrite>(
    stream: S,
    read_timeout: Option<Duration>,
    outbound: &mut mpsc::Receiver<Packet>,
    inbound: &mpsc::Sender<Packet>,
    shutdown: &CancellationToken,
) -> Result<(), std::io::Error> {
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = kiss::Reader::new(read_half);
    let mut deadline = read_timeout.map(|timeout| Instant::now() + timeout);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            _ = expired(deadline) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "no data received before read deadline",
                ));
            }
            frame = reader.next() => {
                match frame {
                    None => return Err(std::io::ErrorKind::UnexpectedEof.into()),
                    Some(Err(balloon_ax25::Error::Io(error))) => return Err(error),
                    Some(Err(error)) => {
                        tracing::warn!(%error, "dropping malformed frame");
                    }
                    Some(Ok(packet)) => {
                        deadline = read_timeout.map(|timeout| Instant::now() + timeout);
                        tracing::debug!(%packet, "received");
                        // never wait on the consumer here, the outbound queue must keep draining
                        match inbound.try_send(packet) {
                            Ok(()) => {}
                            Err(TrySendError::Full(packet)) => {
                                tracing::warn!(%packet, "inbound queue full, dropping packet");
                            }
                            Err(TrySendError::Closed(_)) => return Ok(()),
                        }
                    }
                }
            }
            packet = outbound.recv() => {
                let Some(packet) = packet
                else {
                    return Ok(());
                };

                match kiss::encode(&packet, FrameKind::Command) {
                    Ok(frame) => {
                        write_frame(&mut write_half, &frame).await?;
                        tracing::debug!(%packet, "transmitted");
                    }
                    Err(error) => {
                        tracing::warn!(%packet, %error, "dropping packet");
                    }
                }
            }
        }
    }
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &[u8]) -> Result<(), std::io::Error> {
    writer.write_all(frame).await?;
    writer.flush().await
}

/// Completes at the deadline, or never if there is none.
pub(crate) async fn expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
