//! APRS messages: `:RECIPIENT:text{id`, plus `ack` and `rej` replies.

use balloon_types::Address;

use crate::Error;

const ADDRESSEE_END: usize = 10;
const MAX_ID_LENGTH: usize = 5;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    pub sender: Address,
    pub recipient: Address,
    pub id: String,
    pub text: String,
    pub ack: bool,
    pub rej: bool,
}

impl Message {
    pub fn new(recipient: Address, text: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            recipient,
            text: text.into(),
            id: id.into(),
            ..Default::default()
        }
    }
}

pub fn encode_message(message: &Message) -> Result<String, Error> {
    if message.recipient.is_empty() {
        return Err(Error::NoRecipient);
    }

    let mut encoded = format!(":{:<9}:{}", message.recipient.to_string(), message.text);
    if !message.id.is_empty() {
        encoded.push('{');
        encoded.push_str(&message.id);
    }
    Ok(encoded)
}

/// Encodes an acknowledgement of `message`, addressed to its sender.
pub fn encode_message_ack(message: &Message) -> Result<String, Error> {
    encode_reply(message, "ack")
}

/// Encodes a rejection of `message`, addressed to its sender.
pub fn encode_message_rej(message: &Message) -> Result<String, Error> {
    encode_reply(message, "rej")
}

fn encode_reply(message: &Message, kind: &str) -> Result<String, Error> {
    if message.sender.is_empty() {
        return Err(Error::NoRecipient);
    }
    if message.id.is_empty() {
        return Err(Error::NoMessageId);
    }
    Ok(format!(
        ":{:<9}:{kind}{}",
        message.sender.to_string(),
        message.id
    ))
}

/// Decodes a message. The sender isn't part of the text and is left empty.
pub fn decode_message(s: &str) -> Result<(Message, &str), Error> {
    let bytes = s.as_bytes();
    if bytes.len() <= ADDRESSEE_END {
        return Err(Error::MessageTooShort {
            length: bytes.len(),
        });
    }
    if bytes[0] != b':' || bytes[ADDRESSEE_END] != b':' {
        return Err(Error::InvalidMessageFraming);
    }

    let mut message = Message {
        recipient: decode_recipient(s[1..ADDRESSEE_END].trim())?,
        ..Default::default()
    };

    let rest = &s[ADDRESSEE_END + 1..];
    if let Some((ack, id)) = decode_reply(rest) {
        message.ack = ack;
        message.rej = !ack;
        message.id = id.to_owned();
    }
    else if let Some((text, id)) = split_message_id(rest) {
        message.text = text.to_owned();
        message.id = id.to_owned();
    }
    else {
        message.text = rest.to_owned();
    }

    Ok((message, &s[s.len()..]))
}

fn decode_recipient(s: &str) -> Result<Address, Error> {
    match s.split_once('-') {
        Some((callsign, ssid)) => {
            let ssid = ssid.parse().map_err(|_| {
                Error::MalformedField {
                    field: "recipient",
                    value: s.to_owned(),
                }
            })?;
            Ok(Address::new_unchecked(callsign, ssid))
        }
        None => Ok(Address::new_unchecked(s, 0)),
    }
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// `ack<id>` or `rej<id>`, case-insensitive. Returns whether it is an ack.
fn decode_reply(s: &str) -> Option<(bool, &str)> {
    let kind = s.get(..3)?;
    let id = &s[3..];
    if id.is_empty() || id.len() > MAX_ID_LENGTH || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }

    if kind.eq_ignore_ascii_case("ack") {
        Some((true, id))
    }
    else if kind.eq_ignore_ascii_case("rej") {
        Some((false, id))
    }
    else {
        None
    }
}

/// Splits `text{id` (or `text{id}`) at the last `{` followed by an ID.
fn split_message_id(s: &str) -> Option<(&str, &str)> {
    s.rmatch_indices('{').find_map(|(index, _)| {
        if index == 0 {
            return None;
        }

        let after = &s[index + 1..];
        let length = after
            .char_indices()
            .take(MAX_ID_LENGTH)
            .take_while(|(_, c)| is_id_char(*c))
            .count();
        (length > 0).then(|| (&s[..index], &after[..length]))
    })
}
