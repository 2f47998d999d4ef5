//! # Operator Console
//!
//! Line-oriented input on stdin, one item per line:
//!
//! ```text
//! block 1200                 # a new block was observed
//! secret 0x<64 hex chars>    # the off-chain leg delivered a swap secret
//! swap 0d000000...           # start a swap: encoded swap-initiate, hex
//! 0d000000...                # raw wire message from a peer, hex
//! ```

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use xc_01_wire_codec::{decode, Message};

use crate::runtime::Inbound;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsoleError {
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Invalid block number: {0}")]
    InvalidBlock(String),

    #[error("Secret must be 32 bytes, got {0}")]
    InvalidSecret(usize),

    #[error("Invalid swap request: {0}")]
    InvalidSwap(String),
}

/// Parse one console line; blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<Inbound>, ConsoleError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    if let Some(number) = line.strip_prefix("block ") {
        let block_number = number
            .trim()
            .parse()
            .map_err(|_| ConsoleError::InvalidBlock(number.trim().to_string()))?;
        return Ok(Some(Inbound::Block(block_number)));
    }
    if let Some(secret) = line.strip_prefix("secret ") {
        let bytes = decode_hex(secret)?;
        let secret: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| ConsoleError::InvalidSecret(b.len()))?;
        return Ok(Some(Inbound::SecretReady(secret)));
    }
    if let Some(request) = line.strip_prefix("swap ") {
        let message = decode(&decode_hex(request)?)
            .map_err(|e| ConsoleError::InvalidSwap(e.to_string()))?;
        let Message::CrossTransaction(request) = message else {
            return Err(ConsoleError::InvalidSwap(format!(
                "expected a swap-initiate, got {}",
                message.kind()
            )));
        };
        return Ok(Some(Inbound::StartSwap(Box::new(request))));
    }
    Ok(Some(Inbound::Message(decode_hex(line)?)))
}

fn decode_hex(value: &str) -> Result<Vec<u8>, ConsoleError> {
    let value = value.trim();
    hex::decode(value.strip_prefix("0x").unwrap_or(value))
        .map_err(|e| ConsoleError::InvalidHex(e.to_string()))
}

/// Forward parsed lines from `reader` to `inbound` until EOF.
pub async fn read_lines<R>(reader: R, inbound: mpsc::UnboundedSender<Inbound>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_line(&line) {
                Ok(Some(item)) => {
                    if inbound.send(item).is_err() {
                        debug!("Inbound channel closed");
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Ignoring console line"),
            },
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Console read failed");
                return;
            }
        }
    }
}
