//! WAN state extrapolation
//!
//! A WAN peer only hears from the master every few hundred milliseconds, so
//! between broadcasts it dead-reckons from the last relayed snapshot using
//! the same tempo-to-beat relation as the virtual clock. Drift is bounded by
//! the broadcast interval plus one-way latency, and every new broadcast snaps
//! the cache back to the master's timeline.

use std::time::Instant;

use crate::sync::{ClockState, RelayedWanState};

/// Current clock state derived from a cached relay snapshot.
///
/// Inputs are expected to be validated upstream (tempo > 0, quantum >= 1).
pub fn extrapolate(cached: &RelayedWanState, now: Instant) -> ClockState {
    let quantum = cached.quantum.max(1);

    if !cached.transport.is_playing() {
        return ClockState {
            tempo: cached.tempo,
            beat: cached.beat,
            phase: cached.phase,
            quantum,
            num_peers: 1,
        };
    }

    let elapsed = now.saturating_duration_since(cached.received_at).as_secs_f64();
    let advanced = elapsed * (cached.tempo / 60.0);

    ClockState {
        tempo: cached.tempo,
        beat: cached.beat + advanced,
        phase: (cached.phase + advanced).rem_euclid(quantum as f64),
        quantum,
        num_peers: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::TransportState;
    use std::time::Duration;

    fn snapshot(transport: TransportState, received_at: Instant) -> RelayedWanState {
        RelayedWanState {
            tempo: 120.0,
            beat: 0.0,
            phase: 0.0,
            quantum: 4,
            transport,
            received_at,
        }
    }

    #[test]
    fn test_half_second_at_120_bpm() {
        let t = Instant::now();
        let state = extrapolate(&snapshot(TransportState::Playing, t), t + Duration::from_millis(500));
        assert!((state.beat - 1.0).abs() < 1e-9);
        assert!((state.phase - 1.0).abs() < 1e-9);
        assert_eq!(state.tempo, 120.0);
        assert_eq!(state.num_peers, 1);
    }

    #[test]
    fn test_phase_wraps_at_quantum() {
        let t = Instant::now();
        let mut cached = snapshot(TransportState::Playing, t);
        cached.beat = 14.0;
        cached.phase = 2.0;
        let state = extrapolate(&cached, t + Duration::from_millis(1_500));
        assert!((state.beat - 17.0).abs() < 1e-9);
        assert!((state.phase - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_not_playing_is_frozen() {
        let t = Instant::now();
        for transport in [TransportState::Paused, TransportState::Stopped] {
            let mut cached = snapshot(transport, t);
            cached.beat = 6.5;
            cached.phase = 2.5;
            let state = extrapolate(&cached, t + Duration::from_secs(90));
            assert_eq!(state.beat, 6.5);
            assert_eq!(state.phase, 2.5);
            assert_eq!(state.quantum, 4);
        }
    }

    #[test]
    fn test_clock_behind_snapshot_does_not_rewind() {
        let t = Instant::now() + Duration::from_secs(1);
        let state = extrapolate(&snapshot(TransportState::Playing, t), t - Duration::from_millis(200));
        assert_eq!(state.beat, 0.0);
    }
}
