//! Periodic position reports.

use std::time::Duration;

use balloon_aprs::{
    Symbol,
    position::encode_compressed_position,
};
use tokio::{
    sync::mpsc,
    time::{
        Instant,
        MissedTickBehavior,
    },
};
use tokio_util::sync::CancellationToken;

use crate::{
    flight::Outbound,
    gps::PositionCell,
};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone, Debug)]
pub struct Beacon {
    pub interval: Duration,
    pub symbol: Symbol,
    pub comment: String,
}

impl Beacon {
    /// Builds the report body for the current position, or `None` without a
    /// fix.
    pub fn report(&self, position: &PositionCell) -> Option<String> {
        let point = position.get();
        if !point.has_fix() {
            return None;
        }

        match encode_compressed_position(&point, self.symbol) {
            Ok(mut body) => {
                body.push_str(&self.comment);
                Some(body)
            }
            Err(error) => {
                tracing::warn!(?error, ?point, "can't encode position");
                None
            }
        }
    }

    /// Queues a report every `interval`, starting one interval from now.
    pub async fn run(
        &self,
        position: &PositionCell,
        outbound: mpsc::Sender<Outbound>,
        shutdown: CancellationToken,
    ) {
        let mut interval = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            let Some(body) = self.report(position)
            else {
                tracing::debug!("no fix, skipping beacon");
                continue;
            };

            tracing::debug!(%body, "beacon");
            let sent = tokio::select! {
                _ = shutdown.cancelled() => break,
                sent = outbound.send(Outbound::Report(body)) => sent,
            };
            if sent.is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Arc,
        time::Duration,
    };

    use balloon_aprs::Symbol;
    use balloon_types::Point;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::{
        beacon::Beacon,
        flight::Outbound,
        gps::PositionCell,
    };

    fn beacon() -> Beacon {
        Beacon {
            interval: Duration::from_secs(60),
            symbol: Symbol::BALLOON,
            comment: " hello".to_owned(),
        }
    }

    #[test]
    fn it_skips_without_fix() {
        let position = PositionCell::default();
        assert_eq!(beacon().report(&position), None);

        position.set(Point::new(47.2111, 0.0));
        assert_eq!(beacon().report(&position), None);
    }

    #[test]
    fn it_appends_the_comment() {
        let position = PositionCell::default();
        position.set(Point {
            altitude: 207.0,
            ..Point::new(47.2111, -122.4898)
        });

        assert_eq!(
            beacon().report(&position).as_deref(),
            Some("!/6Z;?/QcnO>?S hello")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn it_beacons_every_interval() {
        let position = Arc::new(PositionCell::default());
        let shutdown = CancellationToken::new();
        let (outbound_tx, mut outbound_rx) = mpsc::channel(8);

        let task = tokio::spawn({
            let position = position.clone();
            let shutdown = shutdown.clone();
            async move { beacon().run(&position, outbound_tx, shutdown).await }
        });

        // first interval passes without a fix
        tokio::time::sleep(Duration::from_secs(90)).await;
        assert!(outbound_rx.try_recv().is_err());

        position.set(Point {
            altitude: 207.0,
            ..Point::new(47.2111, -122.4898)
        });

        let start = tokio::time::Instant::now();
        let Some(Outbound::Report(body)) = outbound_rx.recv().await
        else {
            panic!("expected a report");
        };
        assert_eq!(body, "!/6Z;?/QcnO>?S hello");
        assert_eq!(start.elapsed(), Duration::from_secs(30));

        shutdown.cancel();
        task.await.unwrap();
    }
}
