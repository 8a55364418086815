//! APRS encoding and decoding.
//!
//! Every decoder takes the text it should decode and returns the decoded value
//! along with whatever text it didn't consume. [`parser::parse`] threads that
//! remainder through all decoders that apply to a packet.
//!
//! - [APRS 1.0.1](http://www.aprs.org/doc/APRS101.PDF)

pub mod base91;
pub mod message;
pub mod parser;
pub mod position;
pub mod telemetry;

pub use crate::{
    message::Message,
    parser::{
        PacketData,
        parse,
    },
    telemetry::{
        CompressedTelemetryReport,
        StandardTelemetryReport,
    },
};

#[derive(Debug, thiserror::Error)]
#[error("aprs error")]
pub enum Error {
    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("byte {byte:#04x} is not a base91 digit")]
    MalformedBase91 { byte: u8 },
    #[error("{value} is too large for base91 telemetry")]
    ValueTooLarge { value: u16 },
    #[error("{field} out of range: {value}")]
    ValueOutOfRange { field: &'static str, value: f64 },
    #[error("malformed {field}: {value:?}")]
    MalformedField { field: &'static str, value: String },
    #[error("no {format} found")]
    NoMatch { format: &'static str },
    #[error("message too short: {length} bytes")]
    MessageTooShort { length: usize },
    #[error("message is not framed by colons")]
    InvalidMessageFraming,
    #[error("message has no recipient")]
    NoRecipient,
    #[error("message has no ID")]
    NoMessageId,
}

/// APRS symbol: a table selector (`/` primary, `\` alternate) and a code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Symbol {
    pub table: char,
    pub code: char,
}

impl Symbol {
    pub const BALLOON: Self = Self {
        table: '/',
        code: 'O',
    };
}
