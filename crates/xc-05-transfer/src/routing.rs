//! Next-hop selection over the node's own channels.

use shared_types::{Address, U256};
use tracing::debug;

use crate::domain::{ChainState, RouteState};
use crate::views::list_channels_for_network;

/// Candidate next hops for sending `amount` toward `to_address`.
///
/// Only open channels with enough distributable balance qualify, and the
/// node we received the payment from is never routed back to. A direct
/// channel to the target comes first; the rest follow by capacity,
/// largest first.
pub fn get_best_routes(
    chain_state: &ChainState,
    token_network: &Address,
    from_address: &Address,
    to_address: &Address,
    amount: U256,
    previous_address: Option<&Address>,
) -> Vec<RouteState> {
    let mut candidates: Vec<(bool, U256, RouteState)> = list_channels_for_network(chain_state, token_network)
        .filter(|channel| channel.is_open())
        .filter(|channel| Some(&channel.partner()) != previous_address)
        .filter(|channel| &channel.partner() != from_address)
        .filter_map(|channel| {
            let capacity = channel.our_distributable();
            (capacity >= amount).then(|| {
                (
                    &channel.partner() == to_address,
                    capacity,
                    RouteState {
                        node_address: channel.partner(),
                        channel_identifier: channel.identifier,
                    },
                )
            })
        })
        .collect();

    candidates.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
    debug!(count = candidates.len(), %amount, "Routes computed");
    candidates.into_iter().map(|(_, _, route)| route).collect()
}
