//! Bit-packing of callsigns and SSIDs into the 7-byte AX.25 address field.

use balloon_types::Address;

pub const ADDRESS_LENGTH: usize = 7;

/// SSID byte mask with the command/response bit and both reserved bits set.
pub const SET_SSID_MASK: u8 = 0x70 << 1;

/// SSID byte mask with only the reserved bits set.
pub const CLEAR_SSID_MASK: u8 = 0x30 << 1;

/// SSID byte mask for the final digipeater: reserved bits and the
/// address-extension bit. Existing TNCs expect exactly this value.
pub const LAST_DIGIPEATER_MASK: u8 = 0x61;

/// Encodes an address: callsign characters shifted left by one and
/// space-padded to 6 bytes, followed by `mask | ssid << 1`.
pub fn encode_address(address: &Address, mask: u8) -> [u8; ADDRESS_LENGTH] {
    let mut encoded = [b' ' << 1; ADDRESS_LENGTH];

    for (slot, byte) in encoded
        .iter_mut()
        .zip(address.callsign.bytes().take(Address::MAX_CALLSIGN_LENGTH))
    {
        *slot = byte << 1;
    }

    encoded[6] = mask | ((address.ssid & 0x0f) << 1);
    encoded
}

pub fn decode_address(encoded: &[u8; ADDRESS_LENGTH]) -> Address {
    let callsign = encoded[..6]
        .iter()
        .map(|byte| char::from(byte >> 1))
        .collect::<String>();

    Address::new_unchecked(callsign.trim(), (encoded[6] >> 1) & 0x0f)
}

#[cfg(test)]
mod tests {
    use balloon_types::Address;

    use crate::address::{
        CLEAR_SSID_MASK,
        LAST_DIGIPEATER_MASK,
        SET_SSID_MASK,
        decode_address,
        encode_address,
    };

    #[test]
    fn it_round_trips_every_mask_and_ssid() {
        for callsign in ["N", "NW5W", "KF7ABC"] {
            for ssid in 0..=15 {
                let address = Address::new(callsign, ssid).unwrap();
                for mask in [SET_SSID_MASK, CLEAR_SSID_MASK, LAST_DIGIPEATER_MASK] {
                    assert_eq!(decode_address(&encode_address(&address, mask)), address);
                }
            }
        }
    }

    #[test]
    fn it_encodes_the_expected_bytes() {
        let address = Address::new("NW5W", 7).unwrap();
        assert_eq!(
            encode_address(&address, CLEAR_SSID_MASK | 1),
            [b'N' << 1, b'W' << 1, b'5' << 1, b'W' << 1, 0x40, 0x40, 0x6f]
        );
    }
}
