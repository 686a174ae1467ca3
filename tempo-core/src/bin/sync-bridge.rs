//! Tempo Sync - Bridge Process
//!
//! Ties the local clock to subscribers on a local WebSocket and, in WAN mode,
//! to a room on the sync plane.
//!
//! Usage:
//!   cargo run --bin sync-bridge
//!   SYNC_BRIDGE_PORT=4000 SYNC_RELAY_URL=ws://relay:8787/sync cargo run --bin sync-bridge

use tempo_core::bridge::{self, CoordinatorHandle};
use tempo_core::clock::select_engine;
use tempo_core::config::BridgeConfig;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tempo_core=info".parse()?)
                .add_directive("sync_bridge=info".parse()?)
                .add_directive("tungstenite=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = BridgeConfig::from_env()?;
    let addr = config.bind_addr()?;

    // No native peer-clock integration is linked into this build
    let engine = select_engine(None);
    info!("Clock: {}", engine.kind().as_str());

    let (handle, coordinator) = CoordinatorHandle::spawn(engine, config);
    let listener = TcpListener::bind(addr).await?;

    tokio::select! {
        result = bridge::serve(listener, handle.clone()) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    handle.shutdown();
    let _ = coordinator.await;
    Ok(())
}
