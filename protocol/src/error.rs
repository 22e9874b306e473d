//! Decode and encode failures for the session wire format
//!
//! Every variant describes malformed or out-of-contract input. None of them
//! indicate a broken connection: the receive loop logs them and keeps going.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("buffer too short: need {needed} bytes, got {actual}")]
    TooShort { needed: usize, actual: usize },

    #[error("magic number mismatch: expected {expected:#x}, found {found:#x}")]
    BadMagic { expected: u32, found: u32 },

    #[error("undefined message type tag: {0}")]
    InvalidType(i32),

    #[error("undefined player state tag: {0}")]
    InvalidState(i32),

    #[error("truncated payload: declared {expected} bytes, {available} available")]
    TruncatedPayload { expected: usize, available: usize },

    #[error("payload of {len} bytes exceeds the {max}-byte limit")]
    PayloadTooLarge { len: usize, max: usize },
}

/// Type alias for Results using CodecError
pub type Result<T> = std::result::Result<T, CodecError>;
