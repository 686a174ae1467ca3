//! Latency tracking for the relay connection
//!
//! Measures round-trip time (RTT) to the sync plane using ping/pong messages
//! and provides estimated one-way latency for back-dating relayed snapshots.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Number of RTT samples to keep for averaging
const RTT_SAMPLE_COUNT: usize = 5;

/// Pings older than this are forgotten
const PENDING_PING_TTL: Duration = Duration::from_secs(10);

/// Tracks latency to the sync plane
#[derive(Debug, Default)]
pub struct LatencyTracker {
    /// Pending pings awaiting pong response, keyed by sentAt (ms)
    pending_pings: HashMap<u64, Instant>,
    /// Recent RTT samples
    samples: VecDeque<Duration>,
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all state (when the relay connection is replaced)
    pub fn clear(&mut self) {
        self.pending_pings.clear();
        self.samples.clear();
    }

    /// Record an outgoing ping. Returns the `sentAt` value to put on the wire.
    pub fn create_ping(&mut self, now: Instant, sent_at_ms: u64) -> u64 {
        self.pending_pings.insert(sent_at_ms, now);
        self.pending_pings
            .retain(|_, sent| now.saturating_duration_since(*sent) < PENDING_PING_TTL);
        sent_at_ms
    }

    /// Handle a pong. Returns the measured RTT if it matched a pending ping.
    pub fn handle_pong(&mut self, sent_at_ms: u64, now: Instant) -> Option<Duration> {
        let sent = self.pending_pings.remove(&sent_at_ms)?;
        let rtt = now.saturating_duration_since(sent);

        if self.samples.len() >= RTT_SAMPLE_COUNT {
            self.samples.pop_front();
        }
        self.samples.push_back(rtt);

        tracing::debug!(
            "Relay latency: RTT={}ms, avg={:?}ms",
            rtt.as_millis(),
            self.average_rtt().map(|d| d.as_millis())
        );

        Some(rtt)
    }

    /// Mean of the recent RTT samples
    pub fn average_rtt(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: Duration = self.samples.iter().sum();
        Some(sum / self.samples.len() as u32)
    }

    /// Estimated one-way latency (RTT / 2), if anything was measured
    pub fn one_way_latency(&self) -> Option<Duration> {
        self.average_rtt().map(|rtt| rtt / 2)
    }
}
