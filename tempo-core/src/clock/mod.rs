//! Clock Engine
//!
//! Produces and mutates the shared musical clock. Two implementations sit
//! behind [`ClockEngine`]: a native adapter over a host-provided peer clock
//! ([`LinkSession`]) and a self-contained [`VirtualClock`] used whenever the
//! native capability is missing. The choice is made once at startup by
//! [`select_engine`].

mod native;
mod virtual_clock;

use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::sync::{ClockState, TransportState};

pub use native::{LinkProvider, LinkSession, NativeClock};
pub use virtual_clock::VirtualClock;

/// Lowest accepted tempo (BPM)
pub const MIN_TEMPO: f64 = 20.0;

/// Tempo used before anyone sets one
pub const DEFAULT_TEMPO: f64 = 120.0;

/// Quantum used before anyone sets one
pub const DEFAULT_QUANTUM: u32 = 4;

/// Errors raised while bringing up a clock
#[derive(Debug, Error)]
pub enum ClockError {
    #[error("native link capability unavailable: {0}")]
    NativeUnavailable(String),
}

/// Which implementation backs the clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Native,
    Fallback,
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::Native => "native",
            LinkKind::Fallback => "fallback",
        }
    }
}

/// Capability interface shared by both clock variants
pub trait ClockEngine: Send {
    /// Clock state as of `now`
    fn state_at(&self, now: Instant) -> ClockState;

    /// Current transport state
    fn transport(&self) -> TransportState;

    /// Set tempo, clamped to [`MIN_TEMPO`]
    fn set_tempo_at(&mut self, bpm: f64, now: Instant);

    /// Set quantum, rounded and clamped to >= 1
    fn set_quantum(&mut self, quantum: f64);

    /// Change transport; re-anchors the beat timeline. No-op if unchanged.
    fn set_transport_at(&mut self, next: TransportState, now: Instant);

    fn kind(&self) -> LinkKind;

    fn state(&self) -> ClockState {
        self.state_at(Instant::now())
    }

    fn set_tempo(&mut self, bpm: f64) {
        self.set_tempo_at(bpm, Instant::now());
    }

    fn set_transport(&mut self, next: TransportState) {
        self.set_transport_at(next, Instant::now());
    }

    /// Whether the native peer clock is in use
    fn is_available(&self) -> bool {
        self.kind() == LinkKind::Native
    }
}

/// Pick the clock implementation for this process.
///
/// Never fails: if the native capability is absent or refuses to open, the
/// virtual clock is returned instead.
pub fn select_engine(provider: Option<&dyn LinkProvider>) -> Box<dyn ClockEngine> {
    let Some(provider) = provider else {
        warn!("No native link capability present, using virtual clock");
        return Box::new(VirtualClock::default());
    };

    match provider.open() {
        Ok(session) => {
            info!("Native link capability initialized");
            Box::new(NativeClock::new(session, DEFAULT_QUANTUM))
        }
        Err(e) => {
            warn!("{}, falling back to virtual clock", e);
            Box::new(VirtualClock::default())
        }
    }
}

pub(crate) fn clamp_tempo(bpm: f64) -> f64 {
    // f64::max ignores NaN, so NaN lands on the floor as well
    bpm.max(MIN_TEMPO)
}

pub(crate) fn clamp_quantum(quantum: f64) -> u32 {
    quantum.round().max(1.0).min(u32::MAX as f64) as u32
}

pub(crate) fn phase_of(beat: f64, quantum: u32) -> f64 {
    beat.rem_euclid(quantum.max(1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Refusing;

    impl LinkProvider for Refusing {
        fn open(&self) -> Result<Box<dyn LinkSession>, ClockError> {
            Err(ClockError::NativeUnavailable("driver missing".into()))
        }
    }

    #[test]
    fn test_clamps() {
        assert_eq!(clamp_tempo(5.0), MIN_TEMPO);
        assert_eq!(clamp_tempo(f64::NAN), MIN_TEMPO);
        assert_eq!(clamp_tempo(133.0), 133.0);
        assert_eq!(clamp_quantum(0.2), 1);
        assert_eq!(clamp_quantum(-3.0), 1);
        assert_eq!(clamp_quantum(3.6), 4);
        assert_eq!(clamp_quantum(f64::NAN), 1);
    }

    #[test]
    fn test_select_without_provider_falls_back() {
        let engine = select_engine(None);
        assert_eq!(engine.kind(), LinkKind::Fallback);
        assert!(!engine.is_available());
        assert_eq!(engine.state().num_peers, 1);
    }

    #[test]
    fn test_select_with_refusing_provider_falls_back() {
        let engine = select_engine(Some(&Refusing));
        assert_eq!(engine.kind(), LinkKind::Fallback);
    }
}
