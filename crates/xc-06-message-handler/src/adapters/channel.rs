//! # Channel Transport
//!
//! In-process transport: encodes each message and pushes it onto an
//! unbounded tokio channel. Whoever owns the receiver does the actual I/O
//! (or, in tests, hands the bytes to another node).

use async_trait::async_trait;
use shared_types::Address;
use tokio::sync::mpsc;
use tracing::trace;
use xc_01_wire_codec::{encode, Message};

use crate::domain::DispatchError;
use crate::ports::Transport;

/// One encoded outbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub recipient: Address,
    pub queue: String,
    pub payload: Vec<u8>,
}

#[derive(Clone)]
pub struct ChannelTransport {
    outbound: mpsc::UnboundedSender<Envelope>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (outbound, receiver) = mpsc::unbounded_channel();
        (Self { outbound }, receiver)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send_async(
        &self,
        recipient: Address,
        queue: &str,
        message: Message,
    ) -> Result<(), DispatchError> {
        let payload = encode(&message)?;
        trace!(kind = message.kind(), bytes = payload.len(), queue, "Queueing message");
        self.outbound
            .send(Envelope {
                recipient,
                queue: queue.to_string(),
                payload,
            })
            .map_err(|_| DispatchError::Collaborator("transport receiver dropped".into()))
    }
}
