//! Sync Bridge
//!
//! The bridge process ties the local clock to its subscribers and, in
//! `LINK_WAN` mode, to a room on the sync plane.

mod backoff;
mod coordinator;
mod relay;
mod server;

use thiserror::Error;

use crate::sync::ValidationError;

pub use backoff::{ReconnectTimer, RECONNECT_DELAY};
pub use coordinator::{Coordinator, CoordinatorHandle, Input, MIN_PUSH_INTERVAL, RELAY_PING_INTERVAL, TICK_INTERVAL};
pub use relay::{RelayEvent, RelayLink};
pub use server::{router, serve, HealthReport};

/// Errors surfaced by the bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid message: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("LINK_WAN requires a relay endpoint")]
    MissingRelayEndpoint,

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("coordinator is not running")]
    CoordinatorGone,

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("subscriber socket error: {0}")]
    Subscriber(#[from] axum::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
