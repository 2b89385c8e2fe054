//! Frame envelope decoding and re-encoding

use bytes::Bytes;

use crate::{Result, TokenSwapError};

use super::payload::HttpPayload;
use super::MIN_META_FIELDS;

/// Event type carried in the first byte of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Request read from the traffic source
    Request,
    /// Response recorded alongside the original request
    OriginalResponse,
    /// Response returned by the replay target
    ReplayedResponse,
}

impl EventType {
    /// Map a tag byte to an event type
    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'1' => Some(Self::Request),
            b'2' => Some(Self::OriginalResponse),
            b'3' => Some(Self::ReplayedResponse),
            _ => None,
        }
    }

    /// Tag byte for this event type
    #[must_use]
    pub fn tag(self) -> u8 {
        match self {
            Self::Request => b'1',
            Self::OriginalResponse => b'2',
            Self::ReplayedResponse => b'3',
        }
    }
}

/// One decoded frame
#[derive(Debug, Clone)]
pub struct Frame {
    event_type: EventType,
    correlation_id: String,
    meta_fields: Vec<String>,
    /// First line exactly as received, tag byte included
    meta_header: Bytes,
    payload: HttpPayload,
}

impl Frame {
    /// Decode one hex-encoded input line.
    ///
    /// # Errors
    ///
    /// Returns `MalformedFrame` if the line is not valid hex or the decoded
    /// bytes are not a frame
    pub fn decode_hex_line(line: &[u8]) -> Result<Self> {
        let line = line.trim_ascii();
        if line.is_empty() {
            return Err(TokenSwapError::MalformedFrame("empty line".to_string()));
        }

        let raw = hex::decode(line)
            .map_err(|e| TokenSwapError::MalformedFrame(format!("invalid hex: {e}")))?;
        Self::decode(&raw)
    }

    /// Decode raw frame bytes
    ///
    /// # Errors
    ///
    /// Returns `MalformedFrame` for empty input, an unknown tag, a missing
    /// meta header terminator, or too few meta fields
    pub fn decode(raw: &[u8]) -> Result<Self> {
        let Some(&tag) = raw.first() else {
            return Err(TokenSwapError::MalformedFrame("empty frame".to_string()));
        };

        let event_type = EventType::from_tag(tag).ok_or_else(|| {
            TokenSwapError::MalformedFrame(format!("unknown event tag {tag:#04x}"))
        })?;

        let newline = raw.iter().position(|&b| b == b'\n').ok_or_else(|| {
            TokenSwapError::MalformedFrame("missing meta header terminator".to_string())
        })?;

        let meta_header = &raw[..newline];
        let meta_fields: Vec<String> = meta_header
            .split(|&b| b == b' ')
            .map(|field| String::from_utf8_lossy(field).into_owned())
            .collect();

        if meta_fields.len() < MIN_META_FIELDS || meta_fields[1].is_empty() {
            return Err(TokenSwapError::MalformedFrame(format!(
                "expected at least {MIN_META_FIELDS} meta fields, got {}",
                meta_fields.len()
            )));
        }

        Ok(Self {
            event_type,
            correlation_id: meta_fields[1].clone(),
            meta_fields,
            meta_header: Bytes::copy_from_slice(meta_header),
            payload: HttpPayload::new(raw[newline + 1..].to_vec()),
        })
    }

    /// Event type
    #[must_use]
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Correlation id shared by a request and its responses
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// All meta header fields; index 0 echoes the tag
    #[must_use]
    pub fn meta_fields(&self) -> &[String] {
        &self.meta_fields
    }

    /// HTTP payload
    #[must_use]
    pub fn payload(&self) -> &HttpPayload {
        &self.payload
    }

    /// Mutable HTTP payload
    pub fn payload_mut(&mut self) -> &mut HttpPayload {
        &mut self.payload
    }

    /// Raw frame bytes: meta header, newline, payload
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let payload = self.payload.as_bytes();
        let mut raw = Vec::with_capacity(self.meta_header.len() + 1 + payload.len());
        raw.extend_from_slice(&self.meta_header);
        raw.push(b'\n');
        raw.extend_from_slice(payload);
        raw
    }

    /// Hex-encode the frame and terminate it with a newline
    #[must_use]
    pub fn encode_hex_line(&self) -> Vec<u8> {
        let mut line = hex::encode(self.to_bytes()).into_bytes();
        line.push(b'\n');
        line
    }
}
