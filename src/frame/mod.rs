//! Replay wire protocol
//!
//! One frame per line, hex encoded. Decoded, a frame is
//! `<tag> <correlation-id> [fields..]\n<http payload>` where the tag byte is
//! `1` (request), `2` (original response) or `3` (replayed response).

mod envelope;
mod payload;

pub use envelope::{EventType, Frame};
pub use payload::HttpPayload;

/// Minimum number of space-separated fields in the meta header
pub const MIN_META_FIELDS: usize = 2;
