use std::{
    fmt::Display,
    str::FromStr,
};

use balloon_types::Address;

use crate::Error;

/// An AX.25 UI packet.
///
/// `original_body` keeps the body as received. APRS decoders consume `body`
/// piece by piece.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Packet {
    pub source: Address,
    pub destination: Address,
    pub path: Vec<Address>,
    pub body: String,
    pub original_body: String,
}

impl Packet {
    pub fn new(
        source: Address,
        destination: Address,
        path: Vec<Address>,
        body: impl Into<String>,
    ) -> Self {
        let body = body.into();
        Self {
            source,
            destination,
            path,
            original_body: body.clone(),
            body,
        }
    }
}

/// TNC2 monitor format: `SOURCE>DEST,PATH1,PATH2:body`
impl Display for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}>{}", self.source, self.destination)?;
        for digipeater in &self.path {
            write!(f, ",{digipeater}")?;
        }
        write!(f, ":{}", self.body)
    }
}

impl FromStr for Packet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || {
            Error::InvalidTnc2 {
                input: s.to_owned(),
            }
        };

        let (header, body) = s.split_once(':').ok_or_else(err)?;
        let (source, addresses) = header.split_once('>').ok_or_else(err)?;
        let mut addresses = addresses.split(',');

        let source = parse_tnc2_address(source).ok_or_else(err)?;
        let destination = addresses
            .next()
            .and_then(parse_tnc2_address)
            .ok_or_else(err)?;
        let path = addresses
            .map(parse_tnc2_address)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(err)?;

        Ok(Self::new(source, destination, path, body))
    }
}

/// Addresses seen on APRS-IS aren't always valid AX.25 addresses (e.g. `qAR`,
/// `TCPIP*`), so they are only split into callsign and SSID.
fn parse_tnc2_address(s: &str) -> Option<Address> {
    // a trailing `*` marks a digipeater that has repeated the packet
    let s = s.trim_end_matches('*');
    if s.is_empty() {
        return None;
    }

    match s.split_once('-') {
        Some((callsign, ssid)) => {
            Some(Address::new_unchecked(callsign, ssid.parse().ok()?))
        }
        None => Some(Address::new_unchecked(s, 0)),
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        Address,
        Error,
        Packet,
    };

    #[test]
    fn it_parses_tnc2() {
        let packet: Packet = "NW5W-7>APRS,WIDE1-1,qAR,KF7XYZ-2*:!4712.67N/12229.39WO"
            .parse()
            .unwrap();

        assert_eq!(packet.source, Address::new("NW5W", 7).unwrap());
        assert_eq!(packet.destination, Address::new("APRS", 0).unwrap());
        assert_eq!(packet.path.len(), 3);
        assert_eq!(packet.path[1].callsign, "qAR");
        assert_eq!(packet.path[2].to_string(), "KF7XYZ-2");
        assert_eq!(packet.body, "!4712.67N/12229.39WO");
        assert_eq!(packet.original_body, packet.body);
    }

    #[test]
    fn it_keeps_colons_in_the_body() {
        let packet: Packet = "N0CALL>APZBLN::NW5W-7   :hello{1".parse().unwrap();
        assert!(packet.path.is_empty());
        assert_eq!(packet.body, ":NW5W-7   :hello{1");
        assert_eq!(packet.to_string(), "N0CALL>APZBLN::NW5W-7   :hello{1");
    }

    #[test]
    fn it_rejects_garbage() {
        assert!(matches!(
            "no header here".parse::<Packet>(),
            Err(Error::InvalidTnc2 { .. })
        ));
        assert!(matches!(
            "N0CALL-x>APRS:hi".parse::<Packet>(),
            Err(Error::InvalidTnc2 { .. })
        ));
    }
}
