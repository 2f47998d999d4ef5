//! # Cross-Channel Node
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging and metrics
//! 2. Load and validate configuration
//! 3. Lock the data directory and open the storage backend
//! 4. Recover the node (snapshot + replay, resend unacknowledged messages)
//! 5. Dispatch console input until Ctrl+C, then snapshot and exit
//!
//! No peer transport is built in: outbound frames are printed to stdout as
//! `<recipient> <queue> <hex payload>` for an external relay, and inbound
//! frames are read from stdin as hex.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use shared_types::address_hex;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{info, warn};

use node_runtime::{read_lines, NodeConfig, NodeRuntime, StorageBackend};
use xc_03_storage::{DatabaseLock, FileBackedKVStore, InMemoryKVStore, KeyValueStore};
use xc_06_message_handler::{ChannelTransport, Secp256k1Signer};
use xc_telemetry::{init_telemetry, TelemetryConfig};

#[tokio::main]
async fn main() -> Result<()> {
    init_telemetry(&TelemetryConfig::from_env()).context("Failed to initialize telemetry")?;

    let config = NodeConfig::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    info!(?config, "Configuration loaded");

    let signer = match &config.private_key {
        Some(key) => Secp256k1Signer::from_bytes(key).context("Invalid XC_PRIVATE_KEY")?,
        None => {
            warn!("XC_PRIVATE_KEY not set; using an ephemeral key");
            Secp256k1Signer::random()
        }
    };

    if !config.storage_backend.is_persistent() {
        return run(&config, InMemoryKVStore::new(), signer).await;
    }

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Failed to create {}", config.data_dir.display()))?;
    let _lock = DatabaseLock::acquire(&config.data_dir).context("Data directory is in use")?;

    match config.storage_backend {
        StorageBackend::File => {
            let kv = FileBackedKVStore::open(config.storage_file())
                .context("Failed to open storage file")?;
            run(&config, kv, signer).await
        }
        #[cfg(feature = "rocksdb")]
        StorageBackend::RocksDb => {
            let rocks = xc_03_storage::RocksDbConfig {
                path: config.rocksdb_dir().display().to_string(),
                ..Default::default()
            };
            let kv = xc_03_storage::RocksDbStore::open(rocks).context("Failed to open RocksDB")?;
            run(&config, kv, signer).await
        }
        other => bail!("Storage backend {} is not available", other.as_str()),
    }
}

async fn run<KV: KeyValueStore + 'static>(
    config: &NodeConfig,
    kv: KV,
    signer: Secp256k1Signer,
) -> Result<()> {
    let (transport, outbound) = ChannelTransport::new();
    let runtime = NodeRuntime::start(config, kv, Arc::new(signer), Arc::new(transport))
        .await
        .context("Node recovery failed")?;

    let outbound_task = runtime.spawn_outbound(outbound, |envelope| {
        println!(
            "{} {} {}",
            address_hex(&envelope.recipient),
            envelope.queue,
            hex::encode(&envelope.payload)
        );
    });

    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let inbound_task = runtime.spawn_inbound(inbound_rx);
    let console = tokio::spawn(read_lines(BufReader::new(tokio::io::stdin()), inbound_tx));

    info!(
        address = %address_hex(&runtime.context().address()),
        "Node is running. Press Ctrl+C to stop."
    );
    tokio::signal::ctrl_c().await?;

    console.abort();
    runtime.shutdown().await;
    let _ = tokio::join!(inbound_task, outbound_task);
    Ok(())
}
