//! # Ports Layer
//!
//! Capabilities the dispatcher borrows from the node.

pub mod outbound;

pub use outbound::{MessageSigner, RecordingTransport, SentMessage, Transport};
