//! Length-prefixed framing for the stdio channel.
//!
//! Each frame is a 4-byte little-endian length followed by that many bytes of
//! UTF-8 JSON. A bad length prefix desynchronizes the stream for good, so the
//! decoder clears its buffer and fails; a bad payload only loses its own frame.

use bytes::{Buf, BufMut, BytesMut};
use serde_json::Value;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use super::messages::{KNOWN_TAGS, PeerMessage};

pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;
const LENGTH_PREFIX_SIZE: usize = 4;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid frame length {length} (allowed 1..={max})")]
    InvalidFrameLength { length: u32, max: usize },
    #[error("outgoing message of {size} bytes does not fit in a frame (max {max})")]
    MessageTooLarge { size: usize, max: usize },
    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One decoded frame. Only a bad length prefix is an error; everything else is
/// surfaced here so the channel can report it and keep reading.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Message(PeerMessage),
    Malformed { error: String },
    Unknown { tag: Option<String> },
}

#[derive(Debug, Clone)]
pub struct PeerCodec {
    max_message_size: usize,
}

impl PeerCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_message_size(MAX_MESSAGE_SIZE)
    }

    #[must_use]
    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self { max_message_size }
    }
}

impl Default for PeerCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for PeerCodec {
    type Item = InboundFrame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let declared = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
        let length = declared as usize;
        if length == 0 || length > self.max_message_size {
            src.clear();
            return Err(CodecError::InvalidFrameLength {
                length: declared,
                max: self.max_message_size,
            });
        }

        let frame_size = LENGTH_PREFIX_SIZE + length;
        if src.len() < frame_size {
            src.reserve(frame_size - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_SIZE);
        let payload = src.split_to(length);
        Ok(Some(parse_payload(&payload)))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                if !buf.is_empty() {
                    debug!("dropping {} trailing bytes at end of stream", buf.len());
                    buf.clear();
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<PeerMessage> for PeerCodec {
    type Error = CodecError;

    fn encode(&mut self, item: PeerMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = serde_json::to_vec(&item)?;
        if payload.is_empty() || payload.len() > self.max_message_size {
            return Err(CodecError::MessageTooLarge {
                size: payload.len(),
                max: self.max_message_size,
            });
        }
        let length = u32::try_from(payload.len()).map_err(|_| CodecError::MessageTooLarge {
            size: payload.len(),
            max: self.max_message_size,
        })?;

        dst.reserve(LENGTH_PREFIX_SIZE + payload.len());
        dst.put_u32_le(length);
        dst.extend_from_slice(&payload);
        Ok(())
    }
}

/// Encodes a single message into a standalone frame.
pub fn encode_frame(message: &PeerMessage) -> Result<Vec<u8>, CodecError> {
    let mut buf = BytesMut::new();
    PeerCodec::new().encode(message.clone(), &mut buf)?;
    Ok(buf.to_vec())
}

fn parse_payload(payload: &[u8]) -> InboundFrame {
    let value = match serde_json::from_slice::<Value>(payload) {
        Ok(value) => value,
        Err(error) => {
            return InboundFrame::Malformed {
                error: error.to_string(),
            };
        }
    };

    let tag = value.get("type").and_then(Value::as_str).map(str::to_owned);
    match tag.as_deref() {
        Some(tag) if KNOWN_TAGS.contains(&tag) => {}
        _ => return InboundFrame::Unknown { tag },
    }

    match serde_json::from_value::<PeerMessage>(value) {
        Ok(message) => InboundFrame::Message(message),
        Err(error) => InboundFrame::Malformed {
            error: error.to_string(),
        },
    }
}
