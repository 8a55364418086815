//! Ties the links, the beacon and command handling together.

use std::sync::Arc;

use balloon_aprs::{
    Message,
    message::{
        encode_message,
        encode_message_ack,
    },
    parse,
};
use balloon_ax25::{
    Address,
    Packet,
    kiss::DEFAULT_DESTINATION,
};
use tokio::{
    sync::{
        mpsc,
        watch,
    },
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;

use crate::{
    Error,
    config::Config,
    gps::{
        self,
        PositionCell,
    },
    link::{
        Link,
        LinkState,
    },
    tnc,
};

const QUEUE_SIZE: usize = 64;

/// Above this altitude (in feet) a single hop is requested.
pub const HIGH_ALTITUDE: f64 = 3000.0;

const MAX_MESSAGE_ID: u32 = 99999;

/// Something queued for transmission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// A complete APRS packet body.
    Report(String),
    /// Text for the owner.
    Message(String),
}

/// Releases the payload from the balloon.
pub trait Cutdown: Send + Sync {
    fn cut_down(&self);
}

/// Only logs the request, for flights without cutdown hardware.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogCutdown;

impl Cutdown for LogCutdown {
    fn cut_down(&self) {
        tracing::warn!("cutdown requested, but no cutdown device is attached");
    }
}

/// Digipeater path for the current altitude.
pub fn select_path(altitude: f64) -> Vec<Address> {
    if altitude > HIGH_ALTITUDE {
        vec![Address::new_unchecked("WIDE2", 1)]
    }
    else {
        vec![
            Address::new_unchecked("WIDE1", 1),
            Address::new_unchecked("WIDE2", 1),
        ]
    }
}

/// State shared by the flight's tasks.
#[derive(Clone)]
pub struct Context {
    pub config: Arc<Config>,
    pub position: Arc<PositionCell>,
    pub outbound: mpsc::Sender<Outbound>,
    pub shutdown: CancellationToken,
}

pub struct Flight {
    config: Config,
    cutdown: Arc<dyn Cutdown>,
}

impl Flight {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            cutdown: Arc::new(LogCutdown),
        }
    }

    pub fn with_cutdown(mut self, cutdown: impl Cutdown + 'static) -> Self {
        self.cutdown = Arc::new(cutdown);
        self
    }

    /// Runs until shutdown. If any task fails, the others are shut down too.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), Error> {
        let (outbound_tx, outbound_rx) = mpsc::channel(QUEUE_SIZE);
        let (to_tnc_tx, to_tnc_rx) = mpsc::channel(QUEUE_SIZE);
        let (from_tnc_tx, from_tnc_rx) = mpsc::channel(QUEUE_SIZE);
        let (fixes_tx, fixes_rx) = mpsc::channel(QUEUE_SIZE);

        let tnc_link = Arc::new(Link::new("tnc", self.config.tnc.clone()));
        let gps_link = Arc::new(Link::new("gps", self.config.gps.clone()));
        let tnc_state = tnc_link.subscribe();
        let gps_state = gps_link.subscribe();

        tracing::info!(
            callsign = %self.config.callsign,
            owner = %self.config.owner,
            tnc = %self.config.tnc,
            gps = %self.config.gps,
            "starting flight"
        );

        let context = Context {
            config: Arc::new(self.config),
            position: Arc::new(PositionCell::default()),
            outbound: outbound_tx,
            shutdown: shutdown.clone(),
        };

        let mut tasks = JoinSet::new();

        tasks.spawn({
            let shutdown = shutdown.clone();
            async move { tnc::run(&tnc_link, to_tnc_rx, from_tnc_tx, shutdown).await }
        });
        tasks.spawn({
            let shutdown = shutdown.clone();
            async move { gps::read_reports(&gps_link, fixes_tx, shutdown).await }
        });
        tasks.spawn({
            let context = context.clone();
            async move {
                gps::process_reports(fixes_rx, &context.position, context.shutdown.clone()).await;
                Ok(())
            }
        });
        tasks.spawn({
            let context = context.clone();
            async move {
                context
                    .config
                    .beacon
                    .run(
                        &context.position,
                        context.outbound.clone(),
                        context.shutdown.clone(),
                    )
                    .await;
                Ok(())
            }
        });
        tasks.spawn({
            let context = context.clone();
            async move { transmit(&context, outbound_rx, to_tnc_tx).await }
        });
        tasks.spawn({
            let context = context.clone();
            async move {
                report_status(&context, tnc_state, gps_state).await;
                Ok(())
            }
        });
        tasks.spawn({
            let cutdown = self.cutdown.clone();
            async move {
                dispatch(&context, &*cutdown, from_tnc_rx).await;
                Ok(())
            }
        });

        let mut result = Ok(());
        while let Some(joined) = tasks.join_next().await {
            let task_result = match joined {
                Ok(task_result) => task_result,
                Err(error) => {
                    tracing::error!(?error, "task panicked");
                    Err(Error::ChannelClosed)
                }
            };

            if let Err(error) = task_result {
                if result.is_ok() {
                    tracing::error!(?error, "task failed, shutting down");
                    shutdown.cancel();
                    result = Err(error);
                }
            }
        }

        tracing::info!("flight ended");
        result
    }
}

/// Logs link state changes along with GPS readiness. Ends on shutdown or once
/// both links are gone.
pub async fn report_status(
    context: &Context,
    mut tnc: watch::Receiver<LinkState>,
    mut gps: watch::Receiver<LinkState>,
) {
    let mut tnc_open = true;
    let mut gps_open = true;

    while tnc_open || gps_open {
        tokio::select! {
            _ = context.shutdown.cancelled() => break,
            changed = tnc.changed(), if tnc_open => {
                tnc_open = changed.is_ok();
            }
            changed = gps.changed(), if gps_open => {
                gps_open = changed.is_ok();
            }
        }

        let tnc_state = *tnc.borrow_and_update();
        let gps_state = *gps.borrow_and_update();
        tracing::info!(
            tnc = ?tnc_state,
            gps = ?gps_state,
            gps_ready = context.position.is_ready(),
            "link status"
        );
    }
}

/// Turns queued items into packets for the TNC, in queue order.
pub async fn transmit(
    context: &Context,
    mut outbound: mpsc::Receiver<Outbound>,
    tnc: mpsc::Sender<Packet>,
) -> Result<(), Error> {
    let destination = Address::new_unchecked(DEFAULT_DESTINATION, 0);
    let mut message_id = 0;

    loop {
        let item = tokio::select! {
            _ = context.shutdown.cancelled() => return Ok(()),
            item = outbound.recv() => {
                match item {
                    Some(item) => item,
                    None => return Ok(()),
                }
            }
        };

        let body = match item {
            Outbound::Report(body) => body,
            Outbound::Message(text) => {
                message_id = message_id % MAX_MESSAGE_ID + 1;
                let message = Message::new(context.config.owner.clone(), text, message_id.to_string());
                match encode_message(&message) {
                    Ok(body) => body,
                    Err(error) => {
                        tracing::warn!(?error, ?message, "can't encode message");
                        continue;
                    }
                }
            }
        };

        let path = select_path(context.position.get().altitude);
        let packet = Packet::new(
            context.config.callsign.clone(),
            destination.clone(),
            path,
            body,
        );
        tracing::debug!(%packet, "transmitting");

        let sent = tokio::select! {
            _ = context.shutdown.cancelled() => return Ok(()),
            sent = tnc.send(packet) => sent,
        };
        if sent.is_err() {
            return Err(Error::ChannelClosed);
        }
    }
}

/// Handles packets received from the TNC.
pub async fn dispatch(context: &Context, cutdown: &dyn Cutdown, mut inbound: mpsc::Receiver<Packet>) {
    loop {
        let packet = tokio::select! {
            _ = context.shutdown.cancelled() => break,
            packet = inbound.recv() => {
                match packet {
                    Some(packet) => packet,
                    None => break,
                }
            }
        };

        tracing::debug!(%packet, "received");

        let data = parse(&packet);
        if let Some(position) = &data.position {
            tracing::debug!(source = %packet.source, lat = position.lat, lon = position.lon, "station position");
        }

        if let Some(message) = data.message {
            if let Err(error) = handle_message(context, cutdown, message).await {
                tracing::warn!(?error, "can't handle message");
            }
        }
    }
}

async fn handle_message(context: &Context, cutdown: &dyn Cutdown, message: Message) -> Result<(), Error> {
    let callsign = &context.config.callsign;
    if !message.recipient.callsign.eq_ignore_ascii_case(&callsign.callsign)
        || message.recipient.ssid != callsign.ssid
    {
        return Ok(());
    }

    if message.ack || message.rej {
        tracing::info!(sender = %message.sender, id = %message.id, ack = message.ack, "reply received");
        return Ok(());
    }

    tracing::info!(sender = %message.sender, text = %message.text, "message received");

    if !message.id.is_empty() {
        let ack = encode_message_ack(&message)?;
        send(context, Outbound::Report(ack)).await?;
    }

    if message.text.to_ascii_uppercase().contains("CUTDOWN") {
        tracing::warn!(sender = %message.sender, "cutdown command received");
        cutdown.cut_down();
        send(context, Outbound::Message("cutdown initiated".to_owned())).await?;
    }

    Ok(())
}

async fn send(context: &Context, item: Outbound) -> Result<(), Error> {
    tokio::select! {
        _ = context.shutdown.cancelled() => Ok(()),
        sent = context.outbound.send(item) => sent.map_err(|_| Error::ChannelClosed),
    }
}
