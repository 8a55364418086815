//! Position reports, compressed and uncompressed.

use balloon_types::{
    Point,
    format_latitude_ddm,
    format_longitude_ddm,
};
use chrono::{
    DateTime,
    Datelike,
    Local,
    NaiveDate,
    NaiveTime,
    Utc,
};

use crate::{
    Error,
    Symbol,
    base91::{
        self,
        compress_altitude,
        decode_altitude,
        decode_course_speed,
        decode_radio_range,
        encode_position,
        precompress_lat,
        precompress_lon,
    },
};

const COMPRESSED_LENGTH: usize = 14;
const COORDINATES_LENGTH: usize = 19;
const UNCOMPRESSED_LENGTH: usize = 1 + COORDINATES_LENGTH;
const TIMESTAMPED_LENGTH: usize = 8 + COORDINATES_LENGTH;

/// Compression type: current fix, GGA source, compressed origin. Tells the
/// receiver the `cs` bytes hold an altitude.
const COMPRESSION_TYPE: u8 = 0x32 + 33;

fn check_bounds(point: &Point) -> Result<(), Error> {
    if !(-90.0..=90.0).contains(&point.lat) {
        return Err(Error::ValueOutOfRange {
            field: "latitude",
            value: point.lat,
        });
    }
    if !(-180.0..=180.0).contains(&point.lon) {
        return Err(Error::ValueOutOfRange {
            field: "longitude",
            value: point.lon,
        });
    }
    Ok(())
}

/// Encodes a compressed position report without timestamp, carrying the
/// altitude.
///
/// Altitudes below 1 ft can't be compressed and are left out.
pub fn encode_compressed_position(point: &Point, symbol: Symbol) -> Result<String, Error> {
    check_bounds(point)?;

    let mut encoded = Vec::with_capacity(COMPRESSED_LENGTH);
    encoded.push(b'!');
    encoded.push(symbol.table as u8);
    encoded.extend(encode_position(precompress_lat(point.lat)));
    encoded.extend(encode_position(precompress_lon(point.lon)));
    encoded.push(symbol.code as u8);
    if point.altitude >= 1.0 {
        encoded.extend(compress_altitude(point.altitude)?);
    }
    else {
        encoded.extend(b"  ");
    }
    encoded.push(COMPRESSION_TYPE);

    Ok(encoded.into_iter().map(char::from).collect())
}

/// Decodes a compressed position report: `[!=]` table, lat, lon, code, `cs`
/// and compression type.
pub fn decode_compressed_position(s: &str) -> Result<(Point, Symbol, &str), Error> {
    let bytes = s.as_bytes();
    if bytes.len() < COMPRESSED_LENGTH {
        return Err(Error::InvalidLength {
            expected: COMPRESSED_LENGTH,
            actual: bytes.len(),
        });
    }
    if !matches!(bytes[0], b'!' | b'=')
        || !matches!(bytes[1], b'/' | b'\\')
        || !bytes[..COMPRESSED_LENGTH].is_ascii()
    {
        return Err(Error::MalformedField {
            field: "compressed position",
            value: s.to_owned(),
        });
    }

    let mut point = Point {
        lat: base91::decode_lat(&bytes[2..6])?,
        lon: base91::decode_lon(&bytes[6..10])?,
        message_capable: bytes[0] == b'=',
        time: Utc::now(),
        ..Default::default()
    };
    let symbol = Symbol {
        table: char::from(bytes[1]),
        code: char::from(bytes[10]),
    };

    let cs = &bytes[11..13];
    // a space means there's no course/speed, range or altitude
    if cs[0] != b' ' {
        let compression_type = base91::decode_digit(bytes[13])?;
        if compression_type & 0x18 == 0x10 {
            point.altitude = decode_altitude(cs)?;
        }
        else if (33..=122).contains(&cs[0]) {
            (point.heading, point.speed) = decode_course_speed(cs)?;
        }
        else if cs[0] == b'{' {
            point.radio_range = decode_radio_range(cs[1])?;
        }
    }

    Ok((point, symbol, &s[COMPRESSED_LENGTH..]))
}

/// Encodes an uncompressed position report without timestamp
/// (`!DDMM.mmN/DDDMM.mmW-`). `messaging` selects `=` to advertise a
/// message-capable station.
pub fn encode_uncompressed_position(
    point: &Point,
    symbol: Symbol,
    messaging: bool,
) -> Result<String, Error> {
    check_bounds(point)?;

    Ok(format!(
        "{}{}{}{}{}",
        if messaging { '=' } else { '!' },
        format_latitude_ddm(point.lat),
        symbol.table,
        format_longitude_ddm(point.lon),
        symbol.code,
    ))
}

/// Decodes an uncompressed position report without timestamp.
pub fn decode_uncompressed_position(s: &str) -> Result<(Point, Symbol, &str), Error> {
    let bytes = s.as_bytes();
    if bytes.len() < UNCOMPRESSED_LENGTH {
        return Err(Error::InvalidLength {
            expected: UNCOMPRESSED_LENGTH,
            actual: bytes.len(),
        });
    }
    if !matches!(bytes[0], b'!' | b'=') {
        return Err(Error::MalformedField {
            field: "position",
            value: s.to_owned(),
        });
    }

    let (mut point, symbol) = decode_coordinates(&bytes[1..UNCOMPRESSED_LENGTH])?;
    point.message_capable = bytes[0] == b'=';
    point.time = Utc::now();

    Ok((point, symbol, &s[UNCOMPRESSED_LENGTH..]))
}

/// Decodes an uncompressed position report with a `DDHHMMz`, `DDHHMM/` or
/// `HHMMSSh` timestamp.
pub fn decode_uncompressed_position_with_timestamp(
    s: &str,
) -> Result<(Point, Symbol, &str), Error> {
    let bytes = s.as_bytes();
    if bytes.len() < TIMESTAMPED_LENGTH {
        return Err(Error::InvalidLength {
            expected: TIMESTAMPED_LENGTH,
            actual: bytes.len(),
        });
    }
    if !matches!(bytes[0], b'/' | b'@') || !bytes[1..7].iter().all(u8::is_ascii_digit) {
        return Err(Error::MalformedField {
            field: "timestamped position",
            value: s.to_owned(),
        });
    }

    let (mut point, symbol) = decode_coordinates(&bytes[8..TIMESTAMPED_LENGTH])?;
    point.message_capable = bytes[0] == b'@';
    point.time = decode_timestamp(&s[1..7], bytes[7], Utc::now())?;

    Ok((point, symbol, &s[TIMESTAMPED_LENGTH..]))
}

/// `DDMM.mmH` table `DDDMM.mmH` code
fn decode_coordinates(bytes: &[u8]) -> Result<(Point, Symbol), Error> {
    debug_assert_eq!(bytes.len(), COORDINATES_LENGTH);

    let malformed = || {
        Error::MalformedField {
            field: "coordinates",
            value: String::from_utf8_lossy(bytes).into_owned(),
        }
    };
    if !bytes.is_ascii() {
        return Err(malformed());
    }

    let mut lat = decode_degrees_minutes(&bytes[0..7], 2, "latitude")?;
    match bytes[7] {
        b'N' | b'n' => {}
        b'S' | b's' => lat = -lat,
        _ => return Err(malformed()),
    }

    let mut lon = decode_degrees_minutes(&bytes[9..17], 3, "longitude")?;
    match bytes[17] {
        b'E' | b'e' => {}
        b'W' | b'w' => lon = -lon,
        _ => return Err(malformed()),
    }

    if lat.abs() > 90.0 {
        return Err(Error::ValueOutOfRange {
            field: "latitude",
            value: lat,
        });
    }
    if lon.abs() > 180.0 {
        return Err(Error::ValueOutOfRange {
            field: "longitude",
            value: lon,
        });
    }

    let point = Point {
        lat,
        lon,
        ..Default::default()
    };
    let symbol = Symbol {
        table: char::from(bytes[8]),
        code: char::from(bytes[18]),
    };
    Ok((point, symbol))
}

/// Parses `DDMM.mm` / `DDDMM.mm`. Spaces (position ambiguity) count as zeros.
fn decode_degrees_minutes(
    field: &[u8],
    degree_digits: usize,
    name: &'static str,
) -> Result<f64, Error> {
    let malformed = || {
        Error::MalformedField {
            field: name,
            value: String::from_utf8_lossy(field).into_owned(),
        }
    };

    let field = field
        .iter()
        .map(|byte| {
            match byte {
                b' ' => Ok('0'),
                b'0'..=b'9' | b'.' => Ok(char::from(*byte)),
                _ => Err(malformed()),
            }
        })
        .collect::<Result<String, Error>>()?;

    let degrees = field[..degree_digits]
        .parse::<u16>()
        .map_err(|_| malformed())?;
    let minutes = field[degree_digits..]
        .parse::<f64>()
        .map_err(|_| malformed())?;
    if minutes >= 60.0 {
        return Err(malformed());
    }

    Ok(f64::from(degrees) + minutes / 60.0)
}

/// Resolves an APRS timestamp against the current time. Unknown timestamp
/// kinds resolve to `now`.
fn decode_timestamp(digits: &str, kind: u8, now: DateTime<Utc>) -> Result<DateTime<Utc>, Error> {
    let malformed = || {
        Error::MalformedField {
            field: "timestamp",
            value: format!("{digits}{}", char::from(kind)),
        }
    };
    let number = |range: std::ops::Range<usize>| -> Result<u32, Error> {
        digits[range].parse().map_err(|_| malformed())
    };

    match kind {
        b'z' => {
            let (day, hour, minute) = (number(0..2)?, number(2..4)?, number(4..6)?);
            NaiveDate::from_ymd_opt(now.year(), now.month(), day)
                .zip(NaiveTime::from_hms_opt(hour, minute, 0))
                .map(|(date, time)| date.and_time(time).and_utc())
                .ok_or_else(malformed)
        }
        b'/' => {
            let (day, hour, minute) = (number(0..2)?, number(2..4)?, number(4..6)?);
            let local = now.with_timezone(&Local);
            NaiveDate::from_ymd_opt(local.year(), local.month(), day)
                .zip(NaiveTime::from_hms_opt(hour, minute, 0))
                .and_then(|(date, time)| date.and_time(time).and_local_timezone(Local).earliest())
                .map(|time| time.with_timezone(&Utc))
                .ok_or_else(malformed)
        }
        b'h' => {
            let (hour, minute, second) = (number(0..2)?, number(2..4)?, number(4..6)?);
            NaiveTime::from_hms_opt(hour, minute, second)
                .map(|time| now.date_naive().and_time(time).and_utc())
                .ok_or_else(malformed)
        }
        _ => Ok(now),
    }
}
