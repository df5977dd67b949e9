//! Error types for packet decoding.

use thiserror::Error;

/// Errors produced while decoding an inbound frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not a JSON object of a known packet shape.
    #[error("malformed packet: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The frame exceeded the maximum accepted size.
    #[error("packet too large: {0} bytes")]
    TooLarge(usize),
}
