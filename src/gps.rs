//! Position fixes from gpsd.

use std::{
    sync::atomic::{
        AtomicBool,
        Ordering,
    },
    time::Duration,
};

use balloon_gpsd::{
    Reader,
    Sentence,
    Tpv,
    WATCH,
};
use balloon_types::Point;
use chrono::Utc;
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::{
    io::{
        AsyncRead,
        AsyncWrite,
        AsyncWriteExt,
    },
    sync::mpsc,
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use crate::{
    Error,
    link::{
        Dial,
        Link,
    },
    tnc::expired,
};

pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(15);

/// The last known position.
///
/// The GPS is ready while the most recent report had a fix. Without a fix the
/// previous position is kept.
#[derive(Debug, Default)]
pub struct PositionCell {
    position: Mutex<Point>,
    ready: AtomicBool,
}

impl PositionCell {
    pub fn get(&self) -> Point {
        *self.position.lock()
    }

    pub fn set(&self, point: Point) {
        *self.position.lock() = point;
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    fn set_ready(&self, ready: bool) {
        let was_ready = self.ready.swap(ready, Ordering::Relaxed);
        if was_ready != ready {
            tracing::info!(ready, "gps readiness changed");
        }
    }
}

/// Reads TPV reports from gpsd and forwards them to `fixes`. Reconnects
/// whenever the connection fails or a report can't be decoded.
pub async fn read_reports<D: Dial>(
    link: &Link<D>,
    fixes: mpsc::Sender<Tpv>,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    loop {
        let Some(stream) = link.connect(&shutdown).await?
        else {
            return Ok(());
        };

        match session(stream, link.dialer().read_timeout(), &fixes, &shutdown).await {
            Ok(()) => return Ok(()),
            Err(error) => {
                tracing::warn!(link = link.name(), ?error, "connection lost");
                link.mark_disconnected();
            }
        }
    }
}

async fn session<S: AsyncRead + AsyncWrite + Unpin>(
    mut stream: S,
    read_timeout: Option<Duration>,
    fixes: &mpsc::Sender<Tpv>,
    shutdown: &CancellationToken,
) -> Result<(), Error> {
    stream.write_all(WATCH.as_bytes()).await?;
    stream.flush().await?;

    let mut reader = Reader::new(stream);
    let mut deadline = read_timeout.map(|timeout| Instant::now() + timeout);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            _ = expired(deadline) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "no report received before read deadline",
                )
                .into());
            }
            sentence = reader.next() => {
                match sentence {
                    None => return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into()),
                    Some(Err(error)) => return Err(error.into()),
                    Some(Ok(sentence)) => {
                        deadline = read_timeout.map(|timeout| Instant::now() + timeout);
                        if let Sentence::Tpv(tpv) = sentence {
                            let sent = tokio::select! {
                                _ = shutdown.cancelled() => return Ok(()),
                                sent = fixes.send(tpv) => sent,
                            };
                            if sent.is_err() {
                                return Ok(());
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Turns TPV reports into the current position.
pub async fn process_reports(
    mut fixes: mpsc::Receiver<Tpv>,
    position: &PositionCell,
    shutdown: CancellationToken,
) {
    loop {
        let tpv = tokio::select! {
            _ = shutdown.cancelled() => break,
            tpv = fixes.recv() => {
                match tpv {
                    Some(tpv) => tpv,
                    None => break,
                }
            }
        };

        let point = tpv.to_point(Utc::now());
        if point.lat != 0.0 {
            tracing::debug!(lat = point.lat, lon = point.lon, altitude = point.altitude, "fix");
            position.set(point);
            position.set_ready(true);
        }
        else {
            position.set_ready(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::Ordering,
        },
    };

    use approx::assert_abs_diff_eq;
    use balloon_gpsd::{
        Tpv,
        WATCH,
    };
    use tokio::{
        io::{
            AsyncReadExt,
            AsyncWriteExt,
        },
        sync::mpsc,
    };
    use tokio_util::sync::CancellationToken;

    use crate::{
        gps::{
            PositionCell,
            process_reports,
            read_reports,
        },
        link::{
            Link,
            tests::TestDialer,
        },
    };

    const TPV: &str = "{\"class\":\"TPV\",\"mode\":3,\"lat\":47.2111,\"lon\":-122.4898,\"alt\":63.1}\n";

    #[tokio::test(start_paused = true)]
    async fn it_watches_and_forwards_reports() {
        let (first, mut first_peer) = tokio::io::duplex(1024);
        let (second, mut second_peer) = tokio::io::duplex(1024);
        let link = Arc::new(Link::new("gps", TestDialer::new(0, vec![first, second])));
        let shutdown = CancellationToken::new();
        let (fixes_tx, mut fixes_rx) = mpsc::channel(8);

        let task = tokio::spawn({
            let link = link.clone();
            let shutdown = shutdown.clone();
            async move { read_reports(&link, fixes_tx, shutdown).await }
        });

        let mut watch = vec![0; WATCH.len()];
        first_peer.read_exact(&mut watch).await.unwrap();
        assert_eq!(watch, WATCH.as_bytes());

        first_peer
            .write_all(b"{\"class\":\"VERSION\",\"release\":\"3.25\"}\n")
            .await
            .unwrap();
        first_peer.write_all(TPV.as_bytes()).await.unwrap();
        let tpv = fixes_rx.recv().await.unwrap();
        assert_eq!(tpv.lat, Some(47.2111));

        // undecodable report: reconnect and watch again
        first_peer.write_all(b"{\"class\":\n").await.unwrap();
        let mut watch = vec![0; WATCH.len()];
        second_peer.read_exact(&mut watch).await.unwrap();
        assert_eq!(link.dialer().attempts.load(Ordering::SeqCst), 2);

        shutdown.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn it_tracks_fixes_and_readiness() {
        let position = Arc::new(PositionCell::default());
        let shutdown = CancellationToken::new();
        let (fixes_tx, fixes_rx) = mpsc::channel(8);

        let task = tokio::spawn({
            let position = position.clone();
            let shutdown = shutdown.clone();
            async move { process_reports(fixes_rx, &position, shutdown).await }
        });

        fixes_tx
            .send(Tpv {
                lat: Some(47.2111),
                lon: Some(-122.4898),
                alt: Some(1000.0),
                speed: Some(10.0),
                track: Some(90.0),
                ..Default::default()
            })
            .await
            .unwrap();
        fixes_tx.send(Tpv::default()).await.unwrap();
        drop(fixes_tx);
        task.await.unwrap();

        // the fix is kept, but the GPS isn't ready anymore
        let point = position.get();
        assert_abs_diff_eq!(point.altitude, 3280.84, epsilon = 1e-6);
        assert_abs_diff_eq!(point.speed, 22.36936, epsilon = 1e-6);
        assert_eq!(point.heading, 90);
        assert!(!position.is_ready());
    }
}
