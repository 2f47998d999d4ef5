//! # Swap Flows
//!
//! Two nodes negotiate and settle a swap over channel transports:
//!
//! 1. A originates the swap, B records it and accepts
//! 2. A funds it with a locked transfer carrying the invoice
//! 3. B asks for the secret; A parks the request until the secret is ready
//! 4. A reveals, both sides unlock and exchange the sync-ack

#[cfg(test)]
mod tests {
    use shared_types::{secrethash, Address, Secret, Signature, U256};
    use xc_01_wire_codec::{AcceptCode, AcceptCross, CrossTransaction, CrossType, Message};
    use xc_02_cross_swap::{SwapLegCall, SwapStatus};
    use xc_06_message_handler::{on_message, resolve_secret, send_crosstransfer, start_swap};

    use crate::harness::{Delivery, Network, TOKEN_NETWORK};

    const CHANNEL: Address = [0xc1; 20];
    const SECRET: Secret = [0x42; 32];
    const INVOICE: &str = "lnbc300n1pswapinvoice";

    fn swap_id() -> U256 {
        U256::from(0xabcdef_u64)
    }

    fn local_swap(initiator: Address, target: Address) -> CrossTransaction {
        CrossTransaction {
            message_identifier: 1,
            initiator_address: initiator,
            target_address: target,
            token_network_identifier: TOKEN_NETWORK,
            send_eth_amount: U256::from(30),
            send_btc_amount: U256::from(120_000),
            receive_btc_address: "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx".into(),
            cross_type: CrossType::LocalOrigin,
            identifier: swap_id(),
            signature: Signature::EMPTY,
        }
    }

    fn kinds(deliveries: &[Delivery]) -> Vec<&'static str> {
        deliveries.iter().map(|d| d.kind).collect()
    }

    /// A originates, B accepts; returns after the network is quiet.
    async fn negotiate(net: &mut Network) {
        let (a, b) = (net.node(0).address(), net.node(1).address());
        start_swap(&net.node(0).ctx, local_swap(a, b)).await.unwrap();

        let deliveries = net.run_until_quiet().await;
        assert_eq!(kinds(&deliveries), vec!["cross_transaction", "accept_cross"]);
        assert!(deliveries.iter().all(|d| d.handled));
    }

    // =========================================================================
    // NEGOTIATION
    // =========================================================================

    #[tokio::test]
    async fn test_swap_negotiation_between_two_nodes() {
        let mut net = Network::new(2);
        negotiate(&mut net).await;

        let (a, b) = (net.node(0), net.node(1));
        assert_eq!(b.swap(swap_id()).status, SwapStatus::AcceptSent);
        assert_eq!(a.swap(swap_id()).status, SwapStatus::Accepted);
        assert_eq!(
            a.swap_leg.calls(),
            vec![
                SwapLegCall::StartCrosstransaction(swap_id()),
                SwapLegCall::StartSendCrosstransfer(swap_id()),
            ]
        );
        assert!(b.swap_leg.calls().is_empty());
    }

    #[tokio::test]
    async fn test_sync_ack_closes_without_locked_transfer() {
        let mut net = Network::new(2);
        let (a, b) = (net.node(0).address(), net.node(1).address());
        start_swap(&net.node(0).ctx, local_swap(a, b)).await.unwrap();

        let mut ack = Message::AcceptCross(AcceptCross {
            message_identifier: 5,
            initiator_address: a,
            target_address: b,
            identifier: swap_id(),
            accept: AcceptCode::SyncAck,
            signature: Signature::EMPTY,
        });
        net.node(1).signer.sign_message(&mut ack).unwrap();
        assert!(on_message(&net.node(0).ctx, ack).await);

        assert_eq!(net.node(0).swap(swap_id()).status, SwapStatus::Synced);
        assert_eq!(
            net.node(0).swap_leg.calls(),
            vec![SwapLegCall::StartCrosstransaction(swap_id())]
        );
        // Only the forwarded swap-initiate went out; no locked transfer.
        let deliveries = net.run_until_quiet().await;
        assert_eq!(kinds(&deliveries), vec!["cross_transaction", "accept_cross"]);
        // A is already synced, so B's accept is refused.
        assert!(!deliveries[1].handled);
    }

    // =========================================================================
    // SETTLEMENT
    // =========================================================================

    #[tokio::test]
    async fn test_full_swap_settles_channel_and_rows() {
        let mut net = Network::new(2);
        net.open_channel(0, 1, CHANNEL, 100).await;
        negotiate(&mut net).await;

        // The swap leg driver funds the accepted swap.
        send_crosstransfer(
            &net.node(0).ctx,
            swap_id(),
            SECRET,
            INVOICE.to_string(),
            U256::from(1_000),
        )
        .await
        .unwrap();

        let deliveries = net.run_until_quiet().await;
        assert_eq!(
            kinds(&deliveries),
            vec!["cross_locked_transfer", "processed", "cross_secret_request"]
        );
        assert!(deliveries.iter().all(|d| d.handled));

        let (a, b) = (net.node(0), net.node(1));
        let b_row = b.swap(swap_id());
        assert_eq!(b_row.status, SwapStatus::Locked);
        assert_eq!(b_row.hash_r, Some(secrethash(&SECRET)));
        assert_eq!(
            b.swap_leg.calls(),
            vec![
                SwapLegCall::ReceivedLockedTransfer {
                    identifier: swap_id(),
                    secrethash: secrethash(&SECRET),
                },
                SwapLegCall::PaymentRequest(INVOICE.into()),
            ]
        );
        let a_row = a.swap(swap_id());
        assert_eq!(a_row.status, SwapStatus::SecretRequestPending);
        let parked = a_row.state_change_id.unwrap();

        // The off-chain leg pays out and hands A the secret.
        assert_eq!(resolve_secret(&a.ctx, SECRET).await.unwrap(), swap_id());
        let a_row = a.swap(swap_id());
        assert_eq!(a_row.status, SwapStatus::Synced);
        assert_eq!(a_row.r, Some(SECRET));
        assert_ne!(a_row.state_change_id, Some(parked));
        assert_eq!(a_row.state_change_id, a.ctx.last_state_change_id());

        let deliveries = net.run_until_quiet().await;
        assert!(deliveries.iter().all(|d| d.handled), "{:?}", deliveries);
        assert!(kinds(&deliveries).contains(&"secret"));
        assert_eq!(net.node(1).swap(swap_id()).status, SwapStatus::Synced);

        // B's side of the channel now holds the 30 tokens.
        let b_state = net.node(1).ctx.chain_state();
        let channel = b_state.channel(&CHANNEL).unwrap();
        assert_eq!(channel.partner_state.transferred_amount(), U256::from(30));
        assert!(channel.partner_state.pending_locks.is_empty());
    }

    #[tokio::test]
    async fn test_secret_ready_before_request_settles_immediately() {
        let mut net = Network::new(2);
        net.open_channel(0, 1, CHANNEL, 100).await;
        negotiate(&mut net).await;
        send_crosstransfer(
            &net.node(0).ctx,
            swap_id(),
            SECRET,
            INVOICE.to_string(),
            U256::from(1_000),
        )
        .await
        .unwrap();

        // Secret arrives before B's request is delivered.
        resolve_secret(&net.node(0).ctx, SECRET).await.unwrap();
        assert_eq!(net.node(0).swap(swap_id()).status, SwapStatus::SecretReady);

        let deliveries = net.run_until_quiet().await;
        assert!(deliveries.iter().all(|d| d.handled), "{:?}", deliveries);
        assert_eq!(net.node(0).swap(swap_id()).status, SwapStatus::Synced);
        assert_eq!(net.node(1).swap(swap_id()).status, SwapStatus::Synced);
    }

    #[tokio::test]
    async fn test_swap_without_route_sends_nothing() {
        let mut net = Network::new(2);
        negotiate(&mut net).await;

        let events = send_crosstransfer(
            &net.node(0).ctx,
            swap_id(),
            SECRET,
            INVOICE.to_string(),
            U256::from(1_000),
        )
        .await
        .unwrap();
        assert!(events
            .iter()
            .all(|e| !matches!(e, xc_05_transfer::Event::SendLockedTransfer { .. })));
        assert!(net.run_until_quiet().await.is_empty());
        assert_eq!(net.node(0).swap(swap_id()).status, SwapStatus::Accepted);
    }
}
