//! # Flight controller for APRS telemetry balloons
//!
//! Reads position fixes from gpsd, beacons them as compressed APRS position
//! reports through a KISS TNC, and answers messages sent to the balloon.
//!
//! The protocol crates are re-exported:
//!
//! - [`ax25`]: AX.25 addresses and KISS framing
//! - [`aprs`]: APRS positions, telemetry and messages
//! - [`gpsd`]: the gpsd JSON protocol

pub mod aprsis;
pub mod beacon;
pub mod config;
pub mod flight;
pub mod gps;
pub mod link;
pub mod tnc;

pub use balloon_aprs as aprs;
pub use balloon_ax25 as ax25;
pub use balloon_gpsd as gpsd;
pub use balloon_types::{
    Address,
    AddressError,
    Point,
};

#[derive(Debug, thiserror::Error)]
#[error("balloon error")]
pub enum Error {
    Io(#[from] std::io::Error),
    Ax25(#[from] balloon_ax25::Error),
    Aprs(#[from] balloon_aprs::Error),
    Gpsd(#[from] balloon_gpsd::Error),
    Address(#[from] AddressError),
    Lines(#[from] tokio_util::codec::LinesCodecError),
    #[error("another task is already connecting")]
    AlreadyConnecting,
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("channel closed")]
    ChannelClosed,
}
