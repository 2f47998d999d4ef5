//! # Dispatch Errors
//!
//! Nothing here is fatal: the dispatcher logs the error, drops the message
//! and reports `false` to the transport.

use thiserror::Error;
use xc_01_wire_codec::DecodeError;
use xc_02_cross_swap::SwapError;
use xc_03_storage::StorageError;
use xc_04_wal::WalError;

/// Errors raised while handling one inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Kind has no inbound handler.
    #[error("No handler for message kind {0}")]
    UnknownMessageKind(&'static str),

    /// Signature missing, malformed or not recoverable.
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// A collaborator call did not finish within the configured timeout.
    #[error("Collaborator {0} timed out")]
    CollaboratorTimeout(&'static str),

    /// A collaborator call returned an error.
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// Well-formed and signed, but not acceptable from this sender or in
    /// this state.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Swap row cannot move to the requested status.
    #[error("Invalid swap transition: {from} -> {to}")]
    InvalidSwapTransition {
        /// Current status
        from: String,
        /// Attempted status
        to: String,
    },

    /// Storage or write-ahead log failure.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// An outbound message could not be encoded.
    #[error("Encoding error: {0}")]
    Codec(#[from] DecodeError),
}

impl From<SwapError> for DispatchError {
    fn from(err: SwapError) -> Self {
        match err {
            SwapError::InvalidSwapTransition { from, to } => {
                DispatchError::InvalidSwapTransition { from, to }
            }
            other => DispatchError::Collaborator(other.to_string()),
        }
    }
}

impl From<WalError> for DispatchError {
    fn from(err: WalError) -> Self {
        match err {
            WalError::Storage(e) => DispatchError::Storage(e),
            other => DispatchError::Storage(StorageError::CorruptStorage(other.to_string())),
        }
    }
}

impl DispatchError {
    /// Short label for the dropped-messages counter.
    pub fn reason(&self) -> &'static str {
        match self {
            DispatchError::UnknownMessageKind(_) => "unhandled",
            DispatchError::InvalidSignature(_) => "signature",
            DispatchError::CollaboratorTimeout(_) => "timeout",
            DispatchError::Collaborator(_) => "collaborator",
            DispatchError::Rejected(_) => "rejected",
            DispatchError::InvalidSwapTransition { .. } => "transition",
            DispatchError::Storage(_) => "storage",
            DispatchError::Codec(_) => "codec",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_transition_maps_to_own_variant() {
        let err: DispatchError = SwapError::InvalidSwapTransition {
            from: "Synced".into(),
            to: "Accepted".into(),
        }
        .into();
        assert_eq!(
            err,
            DispatchError::InvalidSwapTransition {
                from: "Synced".into(),
                to: "Accepted".into(),
            }
        );
        assert_eq!(err.reason(), "transition");
    }

    #[test]
    fn test_wal_storage_error_is_unwrapped() {
        let err: DispatchError = WalError::Storage(StorageError::NotFound("x".into())).into();
        assert_eq!(err, DispatchError::Storage(StorageError::NotFound("x".into())));
    }
}
