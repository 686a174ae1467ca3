//! Virtual clock used when no native peer clock is present

use std::time::Instant;

use super::{clamp_quantum, clamp_tempo, phase_of, ClockEngine, LinkKind, DEFAULT_QUANTUM, DEFAULT_TEMPO};
use crate::sync::{ClockState, TransportState};

/// Self-contained beat timeline.
///
/// While playing, `beat(t) = base_beat + (t - start_at) * tempo / 60`;
/// otherwise the beat stays frozen at `base_beat`.
#[derive(Debug, Clone)]
pub struct VirtualClock {
    tempo: f64,
    quantum: u32,
    transport: TransportState,
    /// Beat at `start_at`
    base_beat: f64,
    start_at: Instant,
}

impl VirtualClock {
    pub fn new(tempo: f64, quantum: u32) -> Self {
        Self {
            tempo: clamp_tempo(tempo),
            quantum: quantum.max(1),
            transport: TransportState::Stopped,
            base_beat: 0.0,
            start_at: Instant::now(),
        }
    }

    fn beat_at(&self, now: Instant) -> f64 {
        if !self.transport.is_playing() {
            return self.base_beat;
        }
        let elapsed = now.saturating_duration_since(self.start_at).as_secs_f64();
        self.base_beat + elapsed * (self.tempo / 60.0)
    }

    /// Move the anchor to `now` without changing the beat
    fn reanchor(&mut self, now: Instant) {
        self.base_beat = self.beat_at(now);
        self.start_at = now;
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPO, DEFAULT_QUANTUM)
    }
}

impl ClockEngine for VirtualClock {
    fn state_at(&self, now: Instant) -> ClockState {
        let beat = self.beat_at(now);
        ClockState {
            tempo: self.tempo,
            beat,
            phase: phase_of(beat, self.quantum),
            quantum: self.quantum,
            num_peers: 1,
        }
    }

    fn transport(&self) -> TransportState {
        self.transport
    }

    fn set_tempo_at(&mut self, bpm: f64, now: Instant) {
        // Keep the beat continuous across the tempo change
        self.reanchor(now);
        self.tempo = clamp_tempo(bpm);
    }

    fn set_quantum(&mut self, quantum: f64) {
        self.quantum = clamp_quantum(quantum);
    }

    fn set_transport_at(&mut self, next: TransportState, now: Instant) {
        if next == self.transport {
            return;
        }
        self.reanchor(now);
        self.transport = next;
    }

    fn kind(&self) -> LinkKind {
        LinkKind::Fallback
    }
}
