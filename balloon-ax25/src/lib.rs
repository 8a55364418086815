//! AX.25 UI frames as used by APRS, and the KISS framing used to exchange them
//! with a terminal node controller.
//!
//! - [AX.25 2.2](https://www.ax25.net/AX25.2.2-Jul%2098-2.pdf)
//! - [KISS](http://www.ka9q.net/papers/kiss.html)

pub mod address;
pub mod kiss;
mod packet;

pub use balloon_types::Address;

pub use crate::packet::Packet;

#[derive(Debug, thiserror::Error)]
#[error("ax.25 error")]
pub enum Error {
    Io(#[from] std::io::Error),
    #[error("truncated frame")]
    TruncatedFrame,
    #[error("invalid KISS escape sequence: {byte:#04x}")]
    InvalidEscape { byte: u8 },
    #[error("frame exceeds {max} bytes")]
    FrameTooLong { max: usize },
    #[error("invalid source callsign: {value}")]
    InvalidSource { value: String },
    #[error("empty packet body")]
    EmptyBody,
    #[error("path has {length} digipeaters, at most 8 are allowed")]
    PathTooLong { length: usize },
    #[error("invalid TNC2 packet: {input}")]
    InvalidTnc2 { input: String },
}
