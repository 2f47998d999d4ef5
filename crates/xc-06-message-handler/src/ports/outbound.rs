//! # Outbound Ports
//!
//! Signing and sending are owned by the node; the dispatcher only sees
//! these traits. Both calls are awaited under the collaborator timeout.

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{Address, Signature};
use xc_01_wire_codec::Message;

use crate::domain::DispatchError;

/// Node key - outbound port.
#[async_trait]
pub trait MessageSigner: Send + Sync {
    /// Address messages signed by this signer recover to.
    fn address(&self) -> Address;

    /// Sign the payload bytes of an encoded message.
    async fn sign(&self, payload: &[u8]) -> Result<Signature, DispatchError>;
}

/// Peer transport - outbound port.
///
/// Fire-and-forget: `Ok` means the message was queued, not delivered.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_async(
        &self,
        recipient: Address,
        queue: &str,
        message: Message,
    ) -> Result<(), DispatchError>;
}

// =============================================================================
// Mock Implementations for Testing
// =============================================================================

/// One queued outbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMessage {
    pub recipient: Address,
    pub queue: String,
    pub message: Message,
}

/// Keeps every message it is asked to send.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentMessage>>,
    /// Never complete a send; for timeout tests.
    pub stall: bool,
}

impl RecordingTransport {
    pub fn stalled() -> Self {
        Self {
            stall: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    /// Drain everything sent so far.
    pub fn take(&self) -> Vec<SentMessage> {
        std::mem::take(&mut *self.sent.lock())
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_async(
        &self,
        recipient: Address,
        queue: &str,
        message: Message,
    ) -> Result<(), DispatchError> {
        if self.stall {
            std::future::pending::<()>().await;
        }
        self.sent.lock().push(SentMessage {
            recipient,
            queue: queue.to_string(),
            message,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xc_01_wire_codec::Ping;

    #[tokio::test]
    async fn test_recording_transport_keeps_order() {
        let transport = RecordingTransport::default();
        for nonce in 0..3 {
            let ping = Message::Ping(Ping {
                nonce,
                signature: Signature::EMPTY,
            });
            transport.send_async([1u8; 20], "global", ping).await.unwrap();
        }
        let sent = transport.take();
        assert_eq!(sent.len(), 3);
        assert!(matches!(&sent[2].message, Message::Ping(p) if p.nonce == 2));
        assert!(transport.sent().is_empty());
    }
}
