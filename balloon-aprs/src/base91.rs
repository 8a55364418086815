//! Base-91 digits as used by compressed APRS positions and telemetry.
//!
//! Each digit is sent as `value + 33`.

use crate::Error;

const OFFSET: u8 = 33;
const MAX_BYTE: u8 = 126;

/// Largest value two base-91 digits can hold.
pub const MAX_TELEMETRY_VALUE: u16 = 91 * 91 - 1;

const LAT_SCALE: f64 = 380926.0;
const LON_SCALE: f64 = 190463.0;

pub(crate) fn decode_digit(byte: u8) -> Result<u32, Error> {
    if (OFFSET..=MAX_BYTE).contains(&byte) {
        Ok(u32::from(byte - OFFSET))
    }
    else {
        Err(Error::MalformedBase91 { byte })
    }
}

fn decode_digits(bytes: &[u8], expected: usize) -> Result<u32, Error> {
    if bytes.len() != expected {
        return Err(Error::InvalidLength {
            expected,
            actual: bytes.len(),
        });
    }

    bytes
        .iter()
        .try_fold(0, |value: u32, byte| -> Result<u32, Error> {
            Ok(value * 91 + decode_digit(*byte)?)
        })
}

/// Compresses an altitude in feet into 2 digits of `log_1.002(feet)`.
pub fn compress_altitude(feet: f64) -> Result<[u8; 2], Error> {
    let exponent = (feet.ln() / 1.002f64.ln()).round();
    if !(feet >= 1.0) || exponent > f64::from(MAX_TELEMETRY_VALUE) {
        return Err(Error::ValueOutOfRange {
            field: "altitude",
            value: feet,
        });
    }

    let exponent = exponent as u16;
    Ok([(exponent / 91) as u8 + OFFSET, (exponent % 91) as u8 + OFFSET])
}

pub fn precompress_lat(lat: f64) -> u32 {
    (LAT_SCALE * (90.0 - lat)) as u32
}

pub fn precompress_lon(lon: f64) -> u32 {
    (LON_SCALE * (180.0 + lon)) as u32
}

/// Encodes a precompressed coordinate into 4 digits, most significant first.
///
/// `value` must be below `91^4`, which holds for every valid latitude and
/// longitude.
pub fn encode_position(mut value: u32) -> [u8; 4] {
    debug_assert!(value < 91 * 91 * 91 * 91);

    let mut encoded = [0; 4];
    for (digit, divisor) in encoded.iter_mut().zip([91 * 91 * 91, 91 * 91, 91, 1]) {
        *digit = (value / divisor) as u8 + OFFSET;
        value %= divisor;
    }
    encoded
}

pub fn encode_telemetry(value: u16) -> Result<[u8; 2], Error> {
    if value > MAX_TELEMETRY_VALUE {
        return Err(Error::ValueTooLarge { value });
    }
    Ok([(value / 91) as u8 + OFFSET, (value % 91) as u8 + OFFSET])
}

pub fn decode_lat(bytes: &[u8]) -> Result<f64, Error> {
    Ok(90.0 - f64::from(decode_digits(bytes, 4)?) / LAT_SCALE)
}

pub fn decode_lon(bytes: &[u8]) -> Result<f64, Error> {
    Ok(-180.0 + f64::from(decode_digits(bytes, 4)?) / LON_SCALE)
}

/// Decodes an altitude in feet.
pub fn decode_altitude(bytes: &[u8]) -> Result<f64, Error> {
    let exponent = decode_digits(bytes, 2)?;
    Ok(1.002f64.powi(exponent as i32))
}

/// Decodes course (degrees) and speed.
pub fn decode_course_speed(bytes: &[u8]) -> Result<(u16, f64), Error> {
    if bytes.len() != 2 {
        return Err(Error::InvalidLength {
            expected: 2,
            actual: bytes.len(),
        });
    }

    // computed in u16: the course digit times 4 exceeds a byte
    let course = decode_digit(bytes[0])? as u16 * 4;
    let speed = 1.08f64.powi(decode_digit(bytes[1])? as i32) - 1.0;
    Ok((course, speed))
}

/// Decodes the pre-calculated radio range in miles.
pub fn decode_radio_range(byte: u8) -> Result<f64, Error> {
    Ok(1.08f64.powi(decode_digit(byte)? as i32) * 2.0)
}

pub fn decode_telemetry(bytes: &[u8]) -> Result<u16, Error> {
    Ok(decode_digits(bytes, 2)? as u16)
}
