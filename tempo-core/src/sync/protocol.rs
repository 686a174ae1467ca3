//! Sync Protocol Messages
//!
//! Two JSON protocols share these types, both discriminated by a `type` field:
//! the relay protocol spoken on the sync plane's `/sync` socket, and the local
//! protocol between a bridge and its subscribers (UI, DAW plugins).

use serde::{Deserialize, Serialize};
use serde_json::Number;
use thiserror::Error;

use super::state::{ClockState, Role, SyncMode, TransportState};
use crate::clock::LinkKind;

/// Reasons a clock payload is refused
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("tempo must be a finite number > 0")]
    Tempo,

    #[error("invalid transport: {0}")]
    Transport(String),

    #[error("invalid mode: {0}")]
    Mode(String),

    #[error("quantum must be a finite number > 0")]
    Quantum,

    #[error("room must not be empty")]
    EmptyRoom,
}

// === Relay protocol (bridge <-> sync plane) ===

/// Messages a connection sends to the sync plane
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Join a room, optionally claiming the master role
    Join {
        room: String,
        role: Role,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        master_key: Option<String>,
    },

    /// Clock state pushed by the room master
    State(StateUpdate),

    /// Latency probe
    Ping { sent_at: Number },
}

/// Unvalidated clock state as received from the wire.
///
/// Fields are kept loose so that a bad value produces a precise
/// validation error instead of a generic parse failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempo: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<f64>,
}

impl StateUpdate {
    /// Build an update from a local clock snapshot
    pub fn from_clock(clock: &ClockState, transport: TransportState, mode: SyncMode) -> Self {
        Self {
            tempo: Some(clock.tempo),
            transport: Some(transport.as_str().to_string()),
            mode: Some(mode.as_str().to_string()),
            quantum: Some(clock.quantum as f64),
            beat: Some(clock.beat),
            phase: Some(clock.phase),
        }
    }

    /// Validate and stamp with the server time `at`
    pub fn validate(self, at: u64) -> Result<BroadcastState, ValidationError> {
        let tempo = match self.tempo {
            Some(t) if t.is_finite() && t > 0.0 => t,
            _ => return Err(ValidationError::Tempo),
        };

        let transport = self
            .transport
            .as_deref()
            .unwrap_or("")
            .parse::<TransportState>()?;

        let mode = self.mode.as_deref().map(str::parse::<SyncMode>).transpose()?;

        if let Some(q) = self.quantum {
            if !q.is_finite() || q <= 0.0 {
                return Err(ValidationError::Quantum);
            }
        }

        Ok(BroadcastState {
            tempo,
            transport,
            mode,
            quantum: self.quantum,
            beat: self.beat,
            phase: self.phase,
            at,
        })
    }
}

/// Validated master state as fanned out to a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastState {
    pub tempo: f64,
    pub transport: TransportState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<SyncMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<f64>,
    /// Server timestamp (ms since epoch)
    pub at: u64,
}

/// Messages the sync plane sends to a connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Joined {
        room: String,
        role: Role,
        is_master: bool,
    },
    State(BroadcastState),
    Pong {
        sent_at: Number,
        server_at: u64,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

// === Local bridge protocol (subscribers <-> bridge) ===

/// Commands accepted on the bridge's local socket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum BridgeCommand {
    Configure {
        room: String,
        role: Role,
        mode: SyncMode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        relay_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        master_key: Option<String>,
    },
    Set {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tempo: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        quantum: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transport: Option<TransportState>,
    },
    Ping {
        sent_at: Number,
    },
}

/// Connection state of the outbound relay socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayStatus {
    /// Not in WAN mode
    Disabled,
    Connecting,
    /// Joined the room on the sync plane
    Connected,
    /// Waiting for the backoff timer
    Reconnecting,
}

/// Bridge configuration and health as seen by subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStatus {
    pub mode: SyncMode,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    pub link: LinkKind,
    pub relay: RelayStatus,
    pub is_master: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

/// Tick payload pushed to local subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickState {
    pub tempo: f64,
    pub beat: f64,
    pub phase: f64,
    pub quantum: u32,
    pub num_peers: u32,
    pub transport: TransportState,
    pub mode: SyncMode,
    pub role: Role,
}

impl TickState {
    pub fn new(clock: ClockState, transport: TransportState, mode: SyncMode, role: Role) -> Self {
        Self {
            tempo: clock.tempo,
            beat: clock.beat,
            phase: clock.phase,
            quantum: clock.quantum,
            num_peers: clock.num_peers,
            transport,
            mode,
            role,
        }
    }
}

/// Events emitted on the bridge's local socket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum BridgeEvent {
    Status(BridgeStatus),
    State(TickState),
    Pong { sent_at: Number, server_at: u64 },
    Error { message: String },
}

impl BridgeEvent {
    pub fn error(message: impl Into<String>) -> Self {
        BridgeEvent::Error {
            message: message.into(),
        }
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn current_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
