//! Shared Clock State

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::protocol::{BroadcastState, ValidationError};

/// Transport state of the shared clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    Stopped,
    Playing,
    Paused,
}

impl TransportState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportState::Stopped => "stopped",
            TransportState::Playing => "playing",
            TransportState::Paused => "paused",
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, TransportState::Playing)
    }
}

impl Default for TransportState {
    fn default() -> Self {
        TransportState::Stopped
    }
}

impl FromStr for TransportState {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stopped" => Ok(TransportState::Stopped),
            "playing" => Ok(TransportState::Playing),
            "paused" => Ok(TransportState::Paused),
            other => Err(ValidationError::Transport(other.to_string())),
        }
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the bridge sources its clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    #[serde(rename = "LINK_LAN")]
    LinkLan,
    #[serde(rename = "LINK_WAN")]
    LinkWan,
    #[serde(rename = "MIDI")]
    Midi,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::LinkLan => "LINK_LAN",
            SyncMode::LinkWan => "LINK_WAN",
            SyncMode::Midi => "MIDI",
        }
    }
}

impl Default for SyncMode {
    fn default() -> Self {
        SyncMode::LinkLan
    }
}

impl FromStr for SyncMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LINK_LAN" => Ok(SyncMode::LinkLan),
            "LINK_WAN" => Ok(SyncMode::LinkWan),
            "MIDI" => Ok(SyncMode::Midi),
            other => Err(ValidationError::Mode(other.to_string())),
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a participant in a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Master,
    Peer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Master => "master",
            Role::Peer => "peer",
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Peer
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the musical clock. Recomputed on every tick, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockState {
    /// Beats per minute, always > 0
    pub tempo: f64,
    /// Continuous beat position
    pub beat: f64,
    /// `beat` modulo `quantum`
    pub phase: f64,
    /// Beats per loop, >= 1
    pub quantum: u32,
    /// Peers sharing this clock, including ourselves
    pub num_peers: u32,
}

/// Last clock state relayed by the WAN master, as cached by a peer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelayedWanState {
    pub tempo: f64,
    pub beat: f64,
    pub phase: f64,
    pub quantum: u32,
    pub transport: TransportState,
    /// Local instant the snapshot is considered valid at
    pub received_at: Instant,
}

impl RelayedWanState {
    /// Build a cache entry from a validated relay broadcast.
    ///
    /// Missing fields are filled from `fallback_quantum`; beat defaults to 0
    /// and phase to `beat mod quantum`.
    pub fn from_broadcast(state: &BroadcastState, fallback_quantum: u32, received_at: Instant) -> Self {
        let quantum = state
            .quantum
            .map(|q| q.round().max(1.0) as u32)
            .unwrap_or(fallback_quantum.max(1));
        let beat = state.beat.filter(|b| b.is_finite()).unwrap_or(0.0);
        let phase = state
            .phase
            .filter(|p| p.is_finite())
            .unwrap_or_else(|| beat.rem_euclid(quantum as f64));

        Self {
            tempo: state.tempo,
            beat,
            phase,
            quantum,
            transport: state.transport,
            received_at,
        }
    }
}
