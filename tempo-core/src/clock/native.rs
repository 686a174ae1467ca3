//! Adapter over a host-provided peer clock
//!
//! Peer discovery and tempo consensus belong to the capability itself; this
//! adapter only maps it onto [`ClockEngine`] and layers transport state on top.

use std::time::Instant;

use super::{clamp_quantum, clamp_tempo, phase_of, ClockEngine, ClockError, LinkKind};
use crate::sync::{ClockState, TransportState};

/// A live session with a distributed peer clock
pub trait LinkSession: Send {
    /// Session tempo (BPM)
    fn tempo(&self) -> f64;

    /// Propose a new session tempo, effective at `at`
    fn set_tempo(&mut self, bpm: f64, at: Instant);

    /// Session beat at `at` for the given quantum
    fn beat_at(&self, at: Instant, quantum: f64) -> f64;

    /// Number of other peers in the session
    fn num_peers(&self) -> u32;
}

/// Opens native sessions. Implemented by the host integration.
pub trait LinkProvider {
    fn open(&self) -> Result<Box<dyn LinkSession>, ClockError>;
}

/// Clock backed by a [`LinkSession`].
///
/// While playing the beat follows the session timeline; otherwise it is held
/// at the last value observed before leaving `playing`.
pub struct NativeClock {
    session: Box<dyn LinkSession>,
    quantum: u32,
    transport: TransportState,
    held_beat: f64,
}

impl NativeClock {
    pub fn new(session: Box<dyn LinkSession>, quantum: u32) -> Self {
        Self {
            session,
            quantum: quantum.max(1),
            transport: TransportState::Stopped,
            held_beat: 0.0,
        }
    }

    fn beat_at(&self, now: Instant) -> f64 {
        if self.transport.is_playing() {
            self.session.beat_at(now, self.quantum as f64).max(0.0)
        } else {
            self.held_beat
        }
    }
}

impl ClockEngine for NativeClock {
    fn state_at(&self, now: Instant) -> ClockState {
        let beat = self.beat_at(now);
        ClockState {
            tempo: self.session.tempo(),
            beat,
            phase: phase_of(beat, self.quantum),
            quantum: self.quantum,
            num_peers: self.session.num_peers().saturating_add(1),
        }
    }

    fn transport(&self) -> TransportState {
        self.transport
    }

    fn set_tempo_at(&mut self, bpm: f64, now: Instant) {
        self.session.set_tempo(clamp_tempo(bpm), now);
    }

    fn set_quantum(&mut self, quantum: f64) {
        self.quantum = clamp_quantum(quantum);
    }

    fn set_transport_at(&mut self, next: TransportState, now: Instant) {
        if next == self.transport {
            return;
        }
        self.held_beat = self.beat_at(now);
        self.transport = next;
    }

    fn kind(&self) -> LinkKind {
        LinkKind::Native
    }
}
