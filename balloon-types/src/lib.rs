mod point;

use std::{
    fmt::{
        Debug,
        Display,
    },
    str::FromStr,
};

pub use crate::point::{
    Point,
    format_latitude_ddm,
    format_longitude_ddm,
};

/// An amateur-radio station address: a callsign of up to 6 characters and a
/// secondary station identifier (SSID) in `0..=15`.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Address {
    pub callsign: String,
    pub ssid: u8,
}

impl Address {
    pub const MAX_CALLSIGN_LENGTH: usize = 6;
    pub const MAX_SSID: u8 = 15;

    pub fn new(callsign: impl Into<String>, ssid: u8) -> Result<Self, AddressError> {
        let callsign = callsign.into();

        if callsign.is_empty()
            || callsign.len() > Self::MAX_CALLSIGN_LENGTH
            || !callsign.bytes().all(|byte| byte.is_ascii_alphanumeric())
        {
            return Err(AddressError::InvalidCallsign { value: callsign });
        }
        if ssid > Self::MAX_SSID {
            return Err(AddressError::InvalidSsid {
                value: ssid.to_string(),
            });
        }

        Ok(Self {
            callsign: callsign.to_ascii_uppercase(),
            ssid,
        })
    }

    /// Creates an address without validating the callsign or SSID.
    ///
    /// Used for addresses decoded off the wire, which are taken as they come.
    pub fn new_unchecked(callsign: impl Into<String>, ssid: u8) -> Self {
        Self {
            callsign: callsign.into(),
            ssid,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.callsign.is_empty()
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.ssid == 0 {
            write!(f, "{}", self.callsign)
        }
        else {
            write!(f, "{}-{}", self.callsign, self.ssid)
        }
    }
}

impl Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('-') {
            Some((callsign, ssid)) => {
                let ssid = ssid.parse::<u8>().map_err(|_| {
                    AddressError::InvalidSsid {
                        value: ssid.to_owned(),
                    }
                })?;
                Self::new(callsign, ssid)
            }
            None => Self::new(s, 0),
        }
    }
}

#[derive(Clone, Debug, thiserror::Error)]
pub enum AddressError {
    #[error("Invalid callsign: {value}")]
    InvalidCallsign { value: String },
    #[error("Invalid SSID: {value}")]
    InvalidSsid { value: String },
}

#[cfg(test)]
mod tests {
    use crate::{
        Address,
        AddressError,
    };

    #[test]
    fn it_parses_callsign_with_ssid() {
        let address: Address = "nw5w-7".parse().unwrap();
        assert_eq!(address.callsign, "NW5W");
        assert_eq!(address.ssid, 7);
        assert_eq!(address.to_string(), "NW5W-7");
    }

    #[test]
    fn it_omits_zero_ssid() {
        let address: Address = "KF7ABC".parse().unwrap();
        assert_eq!(address.ssid, 0);
        assert_eq!(address.to_string(), "KF7ABC");
    }

    #[test]
    fn it_rejects_bad_addresses() {
        assert!(matches!(
            "TOOLONGCALL".parse::<Address>(),
            Err(AddressError::InvalidCallsign { .. })
        ));
        assert!(matches!(
            "NW5W-16".parse::<Address>(),
            Err(AddressError::InvalidSsid { .. })
        ));
        assert!(matches!(
            "NW5W-x".parse::<Address>(),
            Err(AddressError::InvalidSsid { .. })
        ));
        assert!(matches!(
            "".parse::<Address>(),
            Err(AddressError::InvalidCallsign { .. })
        ));
    }
}
