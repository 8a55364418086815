//! Telemetry reports: five analog channels and eight digital bits.

use crate::{
    Error,
    base91::{
        decode_telemetry,
        encode_telemetry,
    },
};

/// Compressed telemetry sequence numbers wrap at 13 bits.
const SEQUENCE_MASK: u16 = 0x1fff;
const COMPRESSED_LENGTH: usize = 16;

/// `T#sss,aaa,aaa,aaa,aaa,aaa,bbbbbbbb`
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StandardTelemetryReport {
    pub sequence: u16,
    pub analog: [f64; 5],
    pub digital: u8,
}

/// Base-91 telemetry carried between `|` in a comment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompressedTelemetryReport {
    pub sequence: u16,
    pub analog: [u16; 5],
    pub digital: u8,
}

pub fn encode_standard_telemetry(report: &StandardTelemetryReport) -> String {
    let [a1, a2, a3, a4, a5] = report.analog;
    format!(
        "T#{:03},{a1:03},{a2:03},{a3:03},{a4:03},{a5:03},{:08b}",
        report.sequence, report.digital
    )
}

pub fn decode_standard_telemetry(s: &str) -> Result<(StandardTelemetryReport, &str), Error> {
    let malformed = || {
        Error::MalformedField {
            field: "telemetry",
            value: s.to_owned(),
        }
    };

    let mut fields = s.strip_prefix("T#").ok_or_else(malformed)?.splitn(7, ',');
    let mut next_field = || fields.next().ok_or_else(malformed);

    let sequence = next_field()?.parse().map_err(|_| malformed())?;

    let mut analog = [0.0; 5];
    for value in &mut analog {
        let field = next_field()?;
        // plain decimals only, `f64::from_str` would take `inf` or `1e9`
        if field.is_empty() || !field.bytes().all(|byte| byte.is_ascii_digit() || byte == b'.') {
            return Err(malformed());
        }
        *value = field.parse().map_err(|_| malformed())?;
    }

    let rest = next_field()?;
    let digital = rest.get(..8).ok_or_else(malformed)?;
    if !digital.bytes().all(|byte| matches!(byte, b'0' | b'1')) {
        return Err(malformed());
    }
    let digital = u8::from_str_radix(digital, 2).map_err(|_| malformed())?;

    Ok((
        StandardTelemetryReport {
            sequence,
            analog,
            digital,
        },
        &rest[8..],
    ))
}

/// Advances the report's sequence number, then encodes it.
pub fn encode_compressed_telemetry(report: &mut CompressedTelemetryReport) -> Result<String, Error> {
    report.sequence = report.sequence.wrapping_add(1) & SEQUENCE_MASK;

    let mut encoded = Vec::with_capacity(COMPRESSED_LENGTH);
    encoded.push(b'|');
    encoded.extend(encode_telemetry(report.sequence)?);
    for value in report.analog {
        encoded.extend(encode_telemetry(value)?);
    }
    encoded.extend(encode_telemetry(report.digital.into())?);
    encoded.push(b'|');

    Ok(encoded.into_iter().map(char::from).collect())
}

/// Finds compressed telemetry anywhere in `s`. The remainder is `s` with the
/// telemetry cut out.
pub fn decode_compressed_telemetry(s: &str) -> Result<(CompressedTelemetryReport, String), Error> {
    let bytes = s.as_bytes();
    let start = (0..bytes.len().saturating_sub(COMPRESSED_LENGTH - 1))
        .find(|&i| bytes[i] == b'|' && bytes[i + COMPRESSED_LENGTH - 1] == b'|')
        .ok_or(Error::NoMatch {
            format: "compressed telemetry",
        })?;

    let data = &bytes[start + 1..start + COMPRESSED_LENGTH - 1];
    let sequence = decode_telemetry(&data[0..2])?;
    let mut analog = [0; 5];
    for (i, value) in analog.iter_mut().enumerate() {
        *value = decode_telemetry(&data[2 + 2 * i..4 + 2 * i])?;
    }
    let digital = decode_telemetry(&data[12..14])?;
    let digital = u8::try_from(digital).map_err(|_| {
        Error::ValueOutOfRange {
            field: "digital telemetry",
            value: digital.into(),
        }
    })?;

    let remains = format!("{}{}", &s[..start], &s[start + COMPRESSED_LENGTH..]);
    Ok((
        CompressedTelemetryReport {
            sequence,
            analog,
            digital,
        },
        remains,
    ))
}
