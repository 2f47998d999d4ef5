//! # Codec Errors
//!
//! Every failure is recoverable: the caller logs and drops the input.

use thiserror::Error;

/// Errors produced while encoding or decoding wire messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Zero-length input.
    #[error("Empty input")]
    EmptyInput,

    /// First byte does not name a known message kind.
    #[error("Unknown command id: {0}")]
    UnknownCommand(u8),

    /// Length mismatch or a field value outside its declared range.
    #[error("Malformed {kind} message: {reason}")]
    MalformedMessage {
        /// Message kind being decoded
        kind: &'static str,
        /// What was wrong with the input
        reason: String,
    },

    /// A value handed to `encode` does not fit its field.
    #[error("Field {field} out of range: {reason}")]
    FieldOutOfRange {
        /// Offending field name
        field: &'static str,
        /// Why the value was rejected
        reason: String,
    },
}
