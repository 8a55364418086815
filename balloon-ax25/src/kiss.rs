//! KISS framing of AX.25 UI packets.
//!
//! A frame on the wire:
//!
//! ```plain
//! C0 00 <dest:7> <source:7> [<digipeater:7>; 0..=8] 03 F0 <body> C0
//! ```

use std::{
    pin::Pin,
    task::{
        Context,
        Poll,
    },
};

use balloon_types::Address;
use bytes::{
    Buf,
    BufMut,
    Bytes,
    BytesMut,
};
use futures_util::Stream;
use pin_project_lite::pin_project;
use tokio::io::{
    AsyncRead,
    ReadBuf,
};

use crate::{
    Error,
    Packet,
    address::{
        ADDRESS_LENGTH,
        CLEAR_SSID_MASK,
        LAST_DIGIPEATER_MASK,
        SET_SSID_MASK,
        decode_address,
        encode_address,
    },
};

pub const FEND: u8 = 0xc0;
pub const FESC: u8 = 0xdb;
pub const TFEND: u8 = 0xdc;
pub const TFESC: u8 = 0xdd;

const DATA_FRAME: u8 = 0x00;
const CONTROL_UI: u8 = 0x03;
const PROTOCOL_NO_LAYER_3: u8 = 0xf0;

/// Destination used when a packet doesn't specify one.
pub const DEFAULT_DESTINATION: &str = "APZBLN";

pub const MAX_PATH_LENGTH: usize = 8;

/// Frames shorter than this are line noise and dropped silently.
const MIN_FRAME_LENGTH: usize = 1 + 2 * ADDRESS_LENGTH;
const MAX_FRAME_LENGTH: usize = 2048;
const RECEIVE_BUFFER_SIZE: usize = 1024;

/// Whether a frame is sent as an AX.25 command or response. This only affects
/// the command/response bits in the destination and source SSID bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameKind {
    #[default]
    Command,
    Response,
}

/// Encodes a packet into a complete KISS frame, including both `FEND`
/// delimiters.
pub fn encode(packet: &Packet, kind: FrameKind) -> Result<Bytes, Error> {
    if packet.source.callsign.len() < 4 {
        return Err(Error::InvalidSource {
            value: packet.source.to_string(),
        });
    }
    if packet.body.is_empty() {
        return Err(Error::EmptyBody);
    }
    if packet.path.len() > MAX_PATH_LENGTH {
        return Err(Error::PathTooLong {
            length: packet.path.len(),
        });
    }

    let (mut source_mask, destination_mask) = match kind {
        FrameKind::Command => (CLEAR_SSID_MASK, SET_SSID_MASK),
        FrameKind::Response => (SET_SSID_MASK, CLEAR_SSID_MASK),
    };
    if packet.path.is_empty() {
        // the source is the last address
        source_mask |= 1;
    }

    let default_destination;
    let destination = if packet.destination.is_empty() {
        default_destination = Address::new_unchecked(DEFAULT_DESTINATION, 0);
        &default_destination
    }
    else {
        &packet.destination
    };

    let mut frame = BytesMut::with_capacity(
        3 + (2 + packet.path.len()) * ADDRESS_LENGTH + packet.body.len(),
    );
    frame.put_u8(DATA_FRAME);
    frame.put_slice(&encode_address(destination, destination_mask));
    frame.put_slice(&encode_address(&packet.source, source_mask));
    for (i, digipeater) in packet.path.iter().enumerate() {
        let mask = if i + 1 == packet.path.len() {
            LAST_DIGIPEATER_MASK
        }
        else {
            SET_SSID_MASK
        };
        frame.put_slice(&encode_address(digipeater, mask));
    }
    frame.put_u8(CONTROL_UI);
    frame.put_u8(PROTOCOL_NO_LAYER_3);
    frame.put_slice(packet.body.as_bytes());

    let mut output = BytesMut::with_capacity(frame.len() + 8);
    output.put_u8(FEND);
    escape_into(&frame, &mut output);
    output.put_u8(FEND);

    Ok(output.freeze())
}

fn escape_into(data: &[u8], output: &mut BytesMut) {
    for &byte in data {
        match byte {
            FEND => output.put_slice(&[FESC, TFEND]),
            FESC => output.put_slice(&[FESC, TFESC]),
            _ => output.put_u8(byte),
        }
    }
}

/// Decodes the (unescaped) contents of one frame, i.e. everything between two
/// `FEND`s.
pub fn decode_frame(frame: &[u8]) -> Result<Packet, Error> {
    if frame.len() < MIN_FRAME_LENGTH {
        return Err(Error::TruncatedFrame);
    }

    fn read_address<B: Buf>(buffer: &mut B) -> Address {
        let mut data = [0; ADDRESS_LENGTH];
        buffer.copy_to_slice(&mut data[..]);
        decode_address(&data)
    }

    // skip KISS command byte
    let mut buffer = &frame[1..];
    let destination = read_address(&mut buffer);
    let source = read_address(&mut buffer);

    let mut path = vec![];
    while buffer.remaining() > ADDRESS_LENGTH && buffer[0] != CONTROL_UI {
        path.push(read_address(&mut buffer));
    }

    if buffer.remaining() < 2 || buffer[0] != CONTROL_UI || buffer[1] != PROTOCOL_NO_LAYER_3 {
        return Err(Error::TruncatedFrame);
    }
    buffer.advance(2);

    Ok(Packet::new(
        source,
        destination,
        path,
        String::from_utf8_lossy(buffer),
    ))
}

pin_project! {
    /// Reads KISS frames from a byte stream and decodes them into packets.
    ///
    /// A frame that fails to decode is yielded as an error, and reading can
    /// continue with the next frame. I/O errors should be treated as fatal.
    #[derive(Debug)]
    pub struct Reader<R> {
        #[pin]
        reader: R,
        receive_buffer: ReceiveBuffer,
        decoder: FrameDecoder,
    }
}

impl<R> Reader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            receive_buffer: Default::default(),
            decoder: Default::default(),
        }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: AsyncRead> Stream for Reader<R> {
    type Item = Result<Packet, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let this = self.as_mut().project();

            if this.receive_buffer.has_data() {
                if let Some(result) = this.decoder.decode_next(this.receive_buffer) {
                    return Poll::Ready(Some(result));
                }
            }
            else {
                this.receive_buffer.reset();

                let mut read_buf = ReadBuf::new(&mut this.receive_buffer.buffer);
                match this.reader.poll_read(cx, &mut read_buf) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Err(error)) => return Poll::Ready(Some(Err(error.into()))),
                    Poll::Ready(Ok(())) => {
                        let num_bytes_read = read_buf.filled().len();

                        // EOF
                        if num_bytes_read == 0 {
                            return Poll::Ready(None);
                        }

                        this.receive_buffer.num_bytes = num_bytes_read;
                    }
                }
            }
        }
    }
}

#[derive(Debug)]
struct ReceiveBuffer {
    buffer: [u8; RECEIVE_BUFFER_SIZE],
    read_pos: usize,
    num_bytes: usize,
}

impl Default for ReceiveBuffer {
    fn default() -> Self {
        Self {
            buffer: [0; RECEIVE_BUFFER_SIZE],
            read_pos: 0,
            num_bytes: 0,
        }
    }
}

impl ReceiveBuffer {
    fn has_data(&self) -> bool {
        self.read_pos < self.num_bytes
    }

    fn reset(&mut self) {
        self.read_pos = 0;
        self.num_bytes = 0;
    }

    fn next_byte(&mut self) -> Option<u8> {
        self.has_data().then(|| {
            let byte = self.buffer[self.read_pos];
            self.read_pos += 1;
            byte
        })
    }
}

#[derive(Debug, Default)]
struct FrameDecoder {
    frame: Vec<u8>,
    escape: bool,
    error: Option<Error>,
}

impl FrameDecoder {
    /// Consumes bytes until a frame is complete. Returns `None` once the receive
    /// buffer is drained; partial frames are kept for the next call.
    fn decode_next(&mut self, receive_buffer: &mut ReceiveBuffer) -> Option<Result<Packet, Error>> {
        while let Some(byte) = receive_buffer.next_byte() {
            if byte == FEND {
                let frame = std::mem::take(&mut self.frame);
                self.escape = false;

                if let Some(error) = self.error.take() {
                    return Some(Err(error));
                }
                if frame.len() >= MIN_FRAME_LENGTH {
                    return Some(decode_frame(&frame));
                }
                if !frame.is_empty() {
                    tracing::trace!(length = frame.len(), "dropping short frame");
                }
            }
            else if self.error.is_some() {
                // skip until end of frame
            }
            else if self.escape {
                self.escape = false;
                match byte {
                    TFEND => self.push_byte(FEND),
                    TFESC => self.push_byte(FESC),
                    _ => self.error = Some(Error::InvalidEscape { byte }),
                }
            }
            else if byte == FESC {
                self.escape = true;
            }
            else {
                self.push_byte(byte);
            }
        }

        None
    }

    fn push_byte(&mut self, byte: u8) {
        if self.frame.len() < MAX_FRAME_LENGTH {
            self.frame.push(byte);
        }
        else {
            self.frame.clear();
            self.error = Some(Error::FrameTooLong {
                max: MAX_FRAME_LENGTH,
            });
        }
    }
}
