//! Sync Plane - standalone server
//!
//! Usage:
//!   cargo run --release -p sync-plane
//!   cargo run --release -p sync-plane -- --no-dashboard  # Plain logging mode

use parking_lot::RwLock;
use std::sync::Arc;
use sync_plane::network::{self, PlaneConfig};
use sync_plane::{dashboard, Metrics};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args: Vec<String> = std::env::args().collect();
    let use_dashboard = !args.contains(&"--no-dashboard".to_string());

    let config = PlaneConfig::from_env()?;

    // Shared metrics state
    let metrics = Arc::new(RwLock::new(Metrics::new()));

    if use_dashboard {
        dashboard::run(config, metrics).await
    } else {
        network::run_with_logging(config, metrics).await
    }
}
