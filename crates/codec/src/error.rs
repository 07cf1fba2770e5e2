//! Codec error types.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    /// Input ended inside a field or frame.
    #[error("unexpected end of input while decoding {0}")]
    Truncated(&'static str),

    #[error("varint exceeds 64 bits")]
    VarintOverflow,

    #[error("unsupported wire type {wire_type} for field {field}")]
    UnsupportedWireType { field: u32, wire_type: u8 },

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("stream i/o failed: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        CodecError::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

pub type CodecResult<T> = std::result::Result<T, CodecError>;
