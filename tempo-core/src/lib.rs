//! Tempo Sync - Core Library
//!
//! Keeps a shared musical clock (tempo, beat, phase, quantum, transport)
//! consistent across independent clients. Provides the clock engines, the
//! WAN extrapolation used between relay broadcasts, the wire protocol, and
//! the sync bridge that ties a local clock to a room on the sync plane.

pub mod bridge;
pub mod clock;
pub mod config;
pub mod latency;
pub mod sync;
pub mod wan;

// Re-exports for convenience
pub use clock::{select_engine, ClockEngine, LinkKind, VirtualClock};
pub use sync::{ClockState, RelayedWanState, Role, SyncMode, TransportState};
