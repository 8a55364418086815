use std::f64::consts::PI;

use chrono::{
    DateTime,
    Utc,
};

const EARTH_RADIUS_KM: f64 = 6371.0;
const MILES_PER_KM: f64 = 0.621371;

/// A position fix, as read from the GPS or decoded from an APRS packet.
///
/// Altitude is in feet, speed in miles per hour, heading in degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
    pub altitude: f64,
    pub speed: f64,
    pub heading: u16,
    pub radio_range: f64,
    pub message_capable: bool,
    pub time: DateTime<Utc>,
}

impl Point {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            time: Utc::now(),
            ..Default::default()
        }
    }

    /// Whether this point carries an actual fix. GPS receivers without a fix
    /// report zero coordinates.
    pub fn has_fix(&self) -> bool {
        self.lat != 0.0 && self.lon != 0.0
    }

    /// Great-circle (haversine) distance to another point, in miles.
    pub fn distance_to(&self, other: &Point) -> f64 {
        let phi1 = self.lat.to_radians();
        let phi2 = other.lat.to_radians();
        let delta_phi = (other.lat - self.lat).to_radians();
        let delta_lambda = (other.lon - self.lon).to_radians();

        let a = (delta_phi / 2.0).sin().powi(2)
            + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_KM * c * MILES_PER_KM
    }

    /// Initial bearing towards another point, in degrees `[0, 360)`.
    pub fn bearing_to(&self, other: &Point) -> f64 {
        let phi1 = self.lat.to_radians();
        let phi2 = other.lat.to_radians();
        let delta_lambda = (other.lon - self.lon).to_radians();

        let y = delta_lambda.sin() * phi2.cos();
        let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();
        let theta = y.atan2(x);

        (theta * 180.0 / PI + 360.0) % 360.0
    }
}

/// Splits an absolute coordinate into whole degrees and hundredths of minutes,
/// rounding so that minutes never read `60.00`.
fn degrees_and_minutes(value: f64) -> (u32, u32) {
    let hundredths = (value.abs() * 6000.0).round() as u32;
    (hundredths / 6000, hundredths % 6000)
}

/// Formats a latitude as APRS `DDMM.mmH`.
pub fn format_latitude_ddm(lat: f64) -> String {
    let (degrees, hundredths) = degrees_and_minutes(lat);
    let hemisphere = if lat < 0.0 { 'S' } else { 'N' };
    format!(
        "{degrees:02}{:02}.{:02}{hemisphere}",
        hundredths / 100,
        hundredths % 100
    )
}

/// Formats a longitude as APRS `DDDMM.mmH`.
pub fn format_longitude_ddm(lon: f64) -> String {
    let (degrees, hundredths) = degrees_and_minutes(lon);
    let hemisphere = if lon < 0.0 { 'W' } else { 'E' };
    format!(
        "{degrees:03}{:02}.{:02}{hemisphere}",
        hundredths / 100,
        hundredths % 100
    )
}
