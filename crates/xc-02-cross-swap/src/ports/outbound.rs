//! # Outbound Ports
//!
//! The on-chain and off-chain legs of a swap live outside this node; the
//! message handler reaches them only through these traits.

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::U256;
use xc_01_wire_codec::{CrossTransaction, LockedTransfer};

use crate::domain::SwapError;

/// Swap-leg driver - outbound port.
#[async_trait]
pub trait SwapLeg: Send + Sync {
    /// Start the on-chain leg of a locally originated swap.
    async fn start_crosstransaction(&self, request: &CrossTransaction) -> Result<(), SwapError>;

    /// Send the locked transfer that funds an accepted swap.
    async fn start_send_crosstransfer(&self, identifier: U256) -> Result<(), SwapError>;

    /// A locked transfer for swap `identifier` arrived with this node as target.
    async fn cross_handle_received_locked_transfer(
        &self,
        transfer: &LockedTransfer,
        identifier: U256,
    ) -> Result<(), SwapError>;
}

/// Off-chain payment node - outbound port.
#[async_trait]
pub trait PaymentRequester: Send + Sync {
    /// Pay the invoice carried by a cross locked transfer.
    async fn send_payment_request(&self, payment_string: &str) -> Result<(), SwapError>;
}

// =============================================================================
// Mock Implementations for Testing
// =============================================================================

/// One recorded collaborator call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SwapLegCall {
    StartCrosstransaction(U256),
    StartSendCrosstransfer(U256),
    ReceivedLockedTransfer { identifier: U256, secrethash: [u8; 32] },
    PaymentRequest(String),
}

/// Records every call; optionally fails them all.
#[derive(Default)]
pub struct MockSwapLeg {
    /// Calls in arrival order.
    pub calls: Mutex<Vec<SwapLegCall>>,
    /// Should fail?
    pub should_fail: bool,
}

impl MockSwapLeg {
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<SwapLegCall> {
        self.calls.lock().clone()
    }

    fn record(&self, call: SwapLegCall) -> Result<(), SwapError> {
        if self.should_fail {
            return Err(SwapError::Collaborator("Mock failure".to_string()));
        }
        self.calls.lock().push(call);
        Ok(())
    }
}

#[async_trait]
impl SwapLeg for MockSwapLeg {
    async fn start_crosstransaction(&self, request: &CrossTransaction) -> Result<(), SwapError> {
        self.record(SwapLegCall::StartCrosstransaction(request.identifier))
    }

    async fn start_send_crosstransfer(&self, identifier: U256) -> Result<(), SwapError> {
        self.record(SwapLegCall::StartSendCrosstransfer(identifier))
    }

    async fn cross_handle_received_locked_transfer(
        &self,
        transfer: &LockedTransfer,
        identifier: U256,
    ) -> Result<(), SwapError> {
        self.record(SwapLegCall::ReceivedLockedTransfer {
            identifier,
            secrethash: transfer.lock.secrethash,
        })
    }
}

#[async_trait]
impl PaymentRequester for MockSwapLeg {
    async fn send_payment_request(&self, payment_string: &str) -> Result<(), SwapError> {
        self.record(SwapLegCall::PaymentRequest(payment_string.to_string()))
    }
}
