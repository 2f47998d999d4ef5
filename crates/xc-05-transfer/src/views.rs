//! Read-only queries over [`ChainState`].

use shared_types::{Address, SecretHash};

use crate::domain::{ChainState, ChannelState, TransferRole};

/// Role this node plays in the payment locked under `secrethash`, if any.
pub fn get_transfer_role(chain_state: &ChainState, secrethash: &SecretHash) -> Option<TransferRole> {
    chain_state.payment(secrethash).map(|task| task.role)
}

pub fn get_channelstate_by_identifier<'a>(
    chain_state: &'a ChainState,
    channel_identifier: &Address,
) -> Option<&'a ChannelState> {
    chain_state.channel(channel_identifier)
}

/// The open channel with `partner` in `token_network`.
pub fn get_channelstate_by_partner<'a>(
    chain_state: &'a ChainState,
    token_network: &Address,
    partner: &Address,
) -> Option<&'a ChannelState> {
    chain_state.channels.iter().find(|channel| {
        &channel.token_network_identifier == token_network
            && &channel.partner() == partner
            && channel.is_open()
    })
}

pub fn list_channels_for_network<'a>(
    chain_state: &'a ChainState,
    token_network: &'a Address,
) -> impl Iterator<Item = &'a ChannelState> + 'a {
    chain_state
        .channels
        .iter()
        .filter(move |channel| &channel.token_network_identifier == token_network)
}
