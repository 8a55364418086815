//! Classifies an APRS packet body and runs every decoder that applies to it.

use balloon_ax25::Packet;
use balloon_types::Point;

use crate::{
    Error,
    Symbol,
    message::{
        Message,
        decode_message,
    },
    position::{
        decode_compressed_position,
        decode_uncompressed_position,
        decode_uncompressed_position_with_timestamp,
    },
    telemetry::{
        CompressedTelemetryReport,
        StandardTelemetryReport,
        decode_compressed_telemetry,
        decode_standard_telemetry,
    },
};

/// Everything decoded from a packet. `comment` is the text no decoder claimed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PacketData {
    pub position: Option<Point>,
    pub symbol: Option<Symbol>,
    pub message: Option<Message>,
    pub standard_telemetry: Option<StandardTelemetryReport>,
    pub compressed_telemetry: Option<CompressedTelemetryReport>,
    pub comment: String,
}

/// Parses a packet. Decoding failures are logged and don't stop the remaining
/// decoders.
///
/// Which decoders run is decided by looking at the original body, while each
/// decoder is fed what the previous ones left over.
pub fn parse(packet: &Packet) -> PacketData {
    let original = packet.original_body.as_bytes();
    let mut data = PacketData::default();
    let mut remains = packet.body.clone();

    if original.len() >= 14 {
        let position = match original[0] {
            b'!' | b'=' if matches!(original[1], b'/' | b'\\') => {
                Some(("compressed position", decode_compressed_position(&remains)))
            }
            b'!' | b'=' => {
                Some((
                    "uncompressed position",
                    decode_uncompressed_position(&remains),
                ))
            }
            b'/' | b'@' => {
                Some((
                    "timestamped position",
                    decode_uncompressed_position_with_timestamp(&remains),
                ))
            }
            _ => None,
        };

        match position {
            Some((_, Ok((point, symbol, rest)))) => {
                data.position = Some(point);
                data.symbol = Some(symbol);
                remains = rest.to_owned();
            }
            Some((kind, Err(error))) => log_error(packet, kind, &error),
            None => {}
        }
    }

    if original.len() >= 32 && original[0] == b'T' && original[1] == b'#' && original[5] == b',' {
        match decode_standard_telemetry(&remains) {
            Ok((report, rest)) => {
                data.standard_telemetry = Some(report);
                remains = rest.to_owned();
            }
            Err(error) => log_error(packet, "telemetry", &error),
        }
    }

    if original.len() >= 11 && (original[0] == b':' || original[10] == b':') {
        match decode_message(&remains) {
            Ok((mut message, rest)) => {
                message.sender = packet.source.clone();
                data.message = Some(message);
                remains = rest.to_owned();
            }
            Err(error) => log_error(packet, "message", &error),
        }
    }

    if original.len() >= 16 {
        match decode_compressed_telemetry(&remains) {
            Ok((report, rest)) => {
                data.compressed_telemetry = Some(report);
                remains = rest;
            }
            Err(error) => log_error(packet, "compressed telemetry", &error),
        }
    }

    data.comment = remains;
    data
}

fn log_error(packet: &Packet, kind: &'static str, error: &Error) {
    match error {
        // expected for most packets
        Error::NoMatch { .. } | Error::InvalidMessageFraming => {
            tracing::trace!(%packet, kind, %error, "not decoded");
        }
        _ => {
            tracing::warn!(%packet, kind, %error, "failed to decode");
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use balloon_ax25::Packet;
    use balloon_types::{
        Address,
        Point,
    };

    use crate::{
        Symbol,
        parser::parse,
        position::encode_compressed_position,
        telemetry::{
            CompressedTelemetryReport,
            encode_compressed_telemetry,
        },
    };

    fn packet(body: &str) -> Packet {
        Packet::new(
            "KF7ABC-9".parse().unwrap(),
            "APRS".parse().unwrap(),
            vec![],
            body,
        )
    }

    #[test]
    fn it_parses_a_balloon_beacon() {
        let point = Point {
            altitude: 207.0,
            ..Point::new(47.2111, -122.4898)
        };
        let body = encode_compressed_position(&point, Symbol::BALLOON).unwrap();

        let data = parse(&packet(&body));
        let position = data.position.unwrap();
        assert_abs_diff_eq!(position.lat, 47.2111, epsilon = 1.0 / 380926.0);
        assert_abs_diff_eq!(position.lon, -122.4898, epsilon = 1.0 / 190463.0);
        assert!((position.altitude - 207.0).abs() / 207.0 < 0.002);
        assert_eq!(data.symbol, Some(Symbol::BALLOON));
        assert_eq!(data.comment, "");
        assert!(data.message.is_none());
    }

    #[test]
    fn it_keeps_free_text_after_a_position() {
        let data = parse(&packet("!4712.67N/12229.39WOBalloon launch at 10am"));
        assert!(data.position.is_some());
        assert_eq!(data.comment, "Balloon launch at 10am");
    }

    #[test]
    fn it_parses_an_ack() {
        let data = parse(&packet(":NW5W-7   :ACK707"));
        let message = data.message.unwrap();
        assert!(message.ack);
        assert_eq!(message.id, "707");
        assert_eq!(message.text, "");
        assert_eq!(message.sender, "KF7ABC-9".parse::<Address>().unwrap());
        assert!(data.position.is_none());
    }

    #[test]
    fn it_parses_standard_telemetry() {
        let data = parse(&packet("T#005,199,000,255,073,123,01101001"));
        let report = data.standard_telemetry.unwrap();
        assert_eq!(report.sequence, 5);
        assert_eq!(report.analog[4], 123.0);
        assert_eq!(data.comment, "");
    }

    #[test]
    fn it_finds_compressed_telemetry_in_a_comment() {
        let mut report = CompressedTelemetryReport {
            sequence: 9,
            analog: [100, 200, 300, 400, 500],
            digital: 3,
        };
        let telemetry = encode_compressed_telemetry(&mut report).unwrap();
        let body = format!("!/6Z;?/QcnO>?Sclimbing{telemetry}");

        let data = parse(&packet(&body));
        assert!(data.position.is_some());
        assert_eq!(data.compressed_telemetry, Some(report));
        assert_eq!(data.comment, "climbing");
    }

    #[test]
    fn it_survives_garbage() {
        let data = parse(&packet("!this is not a position at all"));
        assert!(data.position.is_none());
        assert_eq!(data.comment, "!this is not a position at all");

        let data = parse(&packet("short"));
        assert!(data.position.is_none() && data.message.is_none());
        assert_eq!(data.comment, "short");
    }
}
