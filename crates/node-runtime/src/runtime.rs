//! # Node Runtime
//!
//! Recovery, wiring and shutdown around one [`NodeContext`].
//!
//! ## Startup Sequence
//!
//! 1. Open storage over the chosen key-value backend
//! 2. Restore the write-ahead log (snapshot + replay)
//! 3. Build the node context with its collaborators
//! 4. Re-send replayed messages that were never acknowledged
//! 5. Finish swaps stopped between SECRET_READY and their parked request
//! 6. Start dispatching inbound traffic

use std::sync::Arc;

use shared_types::{address_hex, Secret};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use xc_03_storage::{KeyValueStore, Storage, StorageError};
use xc_04_wal::{WalError, WriteAheadLog};
use xc_01_wire_codec::CrossTransaction;
use xc_05_transfer::TransferStateMachine;
use xc_06_message_handler::{
    dispatcher, resolve_secret, resume_parked_swaps, start_swap, DispatchError, Envelope,
    MessageSigner, NodeContext, Transport,
};

use crate::adapters::DetachedSwapLeg;
use crate::config::NodeConfig;

/// Errors that stop the node from starting.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Recovery failed: {0}")]
    Wal(#[from] WalError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Inbound traffic for the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Raw wire bytes from a peer.
    Message(Vec<u8>),
    /// The off-chain leg delivered a swap secret.
    SecretReady(Secret),
    /// A new block was observed.
    Block(u64),
    /// The local user asks this node to initiate a swap.
    StartSwap(Box<CrossTransaction>),
}

/// A recovered node ready to dispatch.
pub struct NodeRuntime<KV: KeyValueStore> {
    ctx: Arc<NodeContext<KV>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<KV: KeyValueStore + 'static> NodeRuntime<KV> {
    /// Recover the node from `kv` and wire it to `signer` and `transport`.
    pub async fn start(
        config: &NodeConfig,
        kv: KV,
        signer: Arc<dyn MessageSigner>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, RuntimeError> {
        let storage = Arc::new(Storage::open(kv)?);
        let address = signer.address();
        info!(
            address = %address_hex(&address),
            storage_version = storage.get_version()?,
            "Starting node"
        );

        let machine = TransferStateMachine::new(address, config.chain_id);
        let (wal, replayed) = WriteAheadLog::restore(machine, Arc::clone(&storage))?;
        let wal = wal.with_snapshot_interval(config.snapshot_interval);

        let swap_leg = Arc::new(DetachedSwapLeg);
        let ctx = NodeContext::new(wal, signer, transport, swap_leg.clone(), swap_leg)
            .with_collaborator_timeout(config.collaborator_timeout);

        let open_swaps = storage
            .get_all_crosstransactions()?
            .iter()
            .filter(|row| !row.status.is_terminal())
            .count();
        if storage.get_payment_node_credentials()?.is_none() {
            debug!("No payment node credentials stored");
        }

        let resent = ctx.resend_pending(&replayed).await;
        let resumed_swaps = resume_parked_swaps(&ctx).await?;
        info!(
            state_change_id = ?ctx.last_state_change_id(),
            replayed_events = replayed.len(),
            resent,
            open_swaps,
            resumed_swaps,
            "Node recovered"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Ok(Self {
            ctx: Arc::new(ctx),
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub fn context(&self) -> &Arc<NodeContext<KV>> {
        &self.ctx
    }

    /// Handle one inbound item; `true` if it was applied.
    pub async fn handle(&self, inbound: Inbound) -> bool {
        handle_inbound(&self.ctx, inbound).await
    }

    /// Dispatch everything arriving on `inbound` until shutdown.
    pub fn spawn_inbound(&self, mut inbound: mpsc::UnboundedReceiver<Inbound>) -> JoinHandle<()> {
        let ctx = Arc::clone(&self.ctx);
        let mut shutdown = self.shutdown_rx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    item = inbound.recv() => match item {
                        Some(item) => {
                            handle_inbound(&ctx, item).await;
                        }
                        None => break,
                    },
                    _ = shutdown.changed() => {
                        info!("Inbound dispatch stopped");
                        break;
                    }
                }
            }
        })
    }

    /// Hand queued outbound envelopes to `deliver` until shutdown.
    pub fn spawn_outbound<F>(
        &self,
        mut outbound: mpsc::UnboundedReceiver<Envelope>,
        deliver: F,
    ) -> JoinHandle<()>
    where
        F: Fn(Envelope) + Send + 'static,
    {
        let mut shutdown = self.shutdown_rx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    envelope = outbound.recv() => match envelope {
                        Some(envelope) => deliver(envelope),
                        None => break,
                    },
                    _ = shutdown.changed() => break,
                }
            }
        })
    }

    /// Stop the dispatch tasks and write a final snapshot.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown...");
        if let Err(e) = self.shutdown_tx.send(true) {
            warn!(error = %e, "No task was listening for shutdown");
        }
        match self.ctx.snapshot() {
            Ok(true) => info!(state_change_id = ?self.ctx.last_state_change_id(), "Snapshot written"),
            Ok(false) => debug!("Nothing to snapshot"),
            Err(e) => error!(error = %e, "Final snapshot failed"),
        }
        info!("Shutdown complete");
    }
}

async fn handle_inbound<KV: KeyValueStore>(ctx: &NodeContext<KV>, inbound: Inbound) -> bool {
    match inbound {
        Inbound::Message(bytes) => dispatcher::receive(ctx, &bytes).await,
        Inbound::SecretReady(secret) => match resolve_secret(ctx, secret).await {
            Ok(identifier) => {
                info!(identifier = %format!("{:#x}", identifier), "Swap secret applied");
                true
            }
            Err(e) => {
                warn!(error = %e, "Swap secret not applied");
                false
            }
        },
        Inbound::Block(block_number) => match ctx.new_block(block_number).await {
            Ok(()) => true,
            Err(e) => {
                error!(block_number, error = %e, "Block not recorded");
                false
            }
        },
        Inbound::StartSwap(request) => {
            let identifier = request.identifier;
            match start_swap(ctx, *request).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(
                        identifier = %format!("{:#x}", identifier),
                        error = %e,
                        "Swap not started"
                    );
                    false
                }
            }
        }
    }
}
