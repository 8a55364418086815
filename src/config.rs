//! Command line and environment configuration.

use std::time::Duration;

use balloon_aprs::Symbol;
use balloon_types::Address;

use crate::{
    Error,
    beacon::Beacon,
    link::{
        TcpDialer,
        Transport,
    },
};

#[derive(Clone, Debug, clap::Args)]
pub struct TncArgs {
    /// KISS-over-TCP address of the TNC, e.g. `localhost:8001`.
    #[clap(long, env = "BALLOON_TNC")]
    pub tnc: Option<String>,

    /// Serial device of the TNC, e.g. `/dev/ttyUSB0`.
    #[clap(long, env = "BALLOON_TNC_SERIAL")]
    pub tnc_serial: Option<String>,

    /// Reconnect if nothing was received from a TCP TNC for this long.
    #[clap(long, env = "BALLOON_TNC_READ_TIMEOUT", value_parser = humantime::parse_duration, default_value = "10m")]
    pub tnc_read_timeout: Duration,
}

impl TncArgs {
    pub fn transport(&self) -> Result<Transport, Error> {
        match (&self.tnc, &self.tnc_serial) {
            (Some(address), None) => {
                Ok(Transport::Tcp(
                    TcpDialer::new(address).with_read_timeout(self.tnc_read_timeout),
                ))
            }
            #[cfg(feature = "serial")]
            (None, Some(path)) => {
                Ok(Transport::Serial(crate::link::SerialDialer::new(path)))
            }
            #[cfg(not(feature = "serial"))]
            (None, Some(_)) => Err(Error::Config("built without serial port support".to_owned())),
            (Some(_), Some(_)) => {
                Err(Error::Config(
                    "--tnc and --tnc-serial are mutually exclusive".to_owned(),
                ))
            }
            (None, None) => Err(Error::Config("either --tnc or --tnc-serial is required".to_owned())),
        }
    }
}

#[derive(Clone, Debug, clap::Args)]
pub struct FlightArgs {
    #[clap(flatten)]
    pub tnc: TncArgs,

    /// gpsd address, e.g. `localhost:2947`.
    #[clap(long, env = "BALLOON_GPS")]
    pub gps: String,

    /// Reconnect if gpsd sent nothing for this long.
    #[clap(long, env = "BALLOON_GPS_READ_TIMEOUT", value_parser = humantime::parse_duration, default_value = "15s")]
    pub gps_read_timeout: Duration,

    /// Callsign the balloon transmits as, e.g. `N0CALL-11`.
    #[clap(long, env = "BALLOON_CALLSIGN")]
    pub callsign: Address,

    /// Station allowed to command the balloon. Status messages are sent here.
    #[clap(long, env = "BALLOON_OWNER")]
    pub owner: Address,

    /// Seconds between position beacons.
    #[clap(long, env = "BALLOON_BEACON_INTERVAL", default_value_t = 60)]
    pub beacon_interval: u64,

    #[clap(long, env = "BALLOON_SYMBOL_TABLE", default_value_t = '/')]
    pub symbol_table: char,

    #[clap(long, env = "BALLOON_SYMBOL_CODE", default_value_t = 'O')]
    pub symbol_code: char,

    /// Appended to every position beacon.
    #[clap(long, env = "BALLOON_COMMENT", default_value = "")]
    pub comment: String,
}

/// Validated flight configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub tnc: Transport,
    pub gps: TcpDialer,
    pub callsign: Address,
    pub owner: Address,
    pub beacon: Beacon,
}

impl TryFrom<FlightArgs> for Config {
    type Error = Error;

    fn try_from(args: FlightArgs) -> Result<Self, Error> {
        let tnc = args.tnc.transport()?;

        if args.beacon_interval == 0 {
            return Err(Error::Config("beacon interval must be positive".to_owned()));
        }
        if args.gps_read_timeout.is_zero() {
            return Err(Error::Config("gps read timeout must be positive".to_owned()));
        }
        if !matches!(args.symbol_table, '/' | '\\') && !args.symbol_table.is_ascii_alphanumeric() {
            return Err(Error::Config(format!(
                "invalid symbol table: {:?}",
                args.symbol_table
            )));
        }
        if !args.symbol_code.is_ascii_graphic() {
            return Err(Error::Config(format!(
                "invalid symbol code: {:?}",
                args.symbol_code
            )));
        }
        if args.callsign == args.owner {
            return Err(Error::Config(
                "callsign and owner must be different stations".to_owned(),
            ));
        }

        Ok(Self {
            tnc,
            gps: TcpDialer::new(args.gps).with_read_timeout(args.gps_read_timeout),
            callsign: args.callsign,
            owner: args.owner,
            beacon: Beacon {
                interval: Duration::from_secs(args.beacon_interval),
                symbol: Symbol {
                    table: args.symbol_table,
                    code: args.symbol_code,
                },
                comment: args.comment,
            },
        })
    }
}

impl Config {
    /// Defaults for everything but the stations involved.
    #[cfg(test)]
    pub fn new(tnc: Transport, gps: TcpDialer, callsign: Address, owner: Address) -> Self {
        Self {
            tnc,
            gps: gps.with_read_timeout(crate::gps::DEFAULT_READ_TIMEOUT),
            callsign,
            owner,
            beacon: Beacon {
                interval: crate::beacon::DEFAULT_INTERVAL,
                symbol: Symbol::BALLOON,
                comment: String::new(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clap::Parser;

    use crate::{
        Error,
        config::{
            Config,
            FlightArgs,
        },
        link::{
            Dial,
            Transport,
        },
    };

    #[derive(Debug, Parser)]
    struct Args {
        #[clap(flatten)]
        flight: FlightArgs,
    }

    fn parse(args: &[&str]) -> Result<Config, Error> {
        let args = Args::try_parse_from(std::iter::once("balloond").chain(args.iter().copied()))
            .map_err(|error| Error::Config(error.to_string()))?;
        Config::try_from(args.flight)
    }

    #[test]
    fn it_applies_defaults() {
        let config = parse(&[
            "--tnc",
            "localhost:8001",
            "--gps",
            "localhost:2947",
            "--callsign",
            "n0call-11",
            "--owner",
            "N0CALL",
        ])
        .unwrap();

        assert!(matches!(config.tnc, Transport::Tcp(_)));
        assert_eq!(config.callsign.to_string(), "N0CALL-11");
        assert_eq!(config.owner.to_string(), "N0CALL");
        assert_eq!(config.beacon.interval, Duration::from_secs(60));
        assert_eq!(config.beacon.symbol.table, '/');
        assert_eq!(config.beacon.symbol.code, 'O');
        assert_eq!(config.beacon.comment, "");
        assert_eq!(config.tnc.to_string(), "tcp://localhost:8001");
    }

    #[test]
    fn it_parses_durations() {
        let config = parse(&[
            "--tnc",
            "localhost:8001",
            "--tnc-read-timeout",
            "5m 30s",
            "--gps",
            "localhost:2947",
            "--gps-read-timeout",
            "1m",
            "--callsign",
            "N0CALL-11",
            "--owner",
            "N0CALL",
        ])
        .unwrap();

        assert_eq!(config.tnc.read_timeout(), Some(Duration::from_secs(330)));
        assert_eq!(config.gps.read_timeout(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn it_requires_exactly_one_tnc() {
        let both = parse(&[
            "--tnc",
            "localhost:8001",
            "--tnc-serial",
            "/dev/ttyUSB0",
            "--gps",
            "localhost:2947",
            "--callsign",
            "N0CALL-11",
            "--owner",
            "N0CALL",
        ]);
        assert!(matches!(both, Err(Error::Config(_))));

        let neither = parse(&[
            "--gps",
            "localhost:2947",
            "--callsign",
            "N0CALL-11",
            "--owner",
            "N0CALL",
        ]);
        assert!(matches!(neither, Err(Error::Config(_))));
    }

    #[test]
    fn it_rejects_invalid_values() {
        let callsign = parse(&[
            "--tnc",
            "localhost:8001",
            "--gps",
            "localhost:2947",
            "--callsign",
            "TOOLONGCALL",
            "--owner",
            "N0CALL",
        ]);
        assert!(matches!(callsign, Err(Error::Config(_))));

        let interval = parse(&[
            "--tnc",
            "localhost:8001",
            "--gps",
            "localhost:2947",
            "--callsign",
            "N0CALL-11",
            "--owner",
            "N0CALL",
            "--beacon-interval",
            "0",
        ]);
        assert!(matches!(interval, Err(Error::Config(_))));
    }
}
