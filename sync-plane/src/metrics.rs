//! Metrics tracking for the sync plane

use chrono::{DateTime, Local};
use std::collections::VecDeque;

/// Maximum number of log entries to keep
const MAX_LOG_ENTRIES: usize = 100;

/// A log entry for the dashboard
#[derive(Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Connection,
    Room,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Connection => "CONN",
            LogLevel::Room => "ROOM",
        }
    }
}

/// Room membership as shown on the dashboard
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoomSummary {
    pub name: String,
    pub members: usize,
    pub has_master: bool,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum ServerStatus {
    Starting,
    Running,
    Error,
}

/// Server metrics
pub struct Metrics {
    /// Server start time
    pub start_time: DateTime<Local>,

    /// Address we listen on
    pub bind_addr: Option<String>,

    /// Whether a master key is configured (no key = nobody can write)
    pub master_key_configured: bool,

    /// Current number of connected clients
    pub connected_clients: usize,

    /// Total connections since start
    pub total_connections: u64,

    /// Peak simultaneous connections
    pub peak_connections: usize,

    /// Total room joins since start
    pub total_joins: u64,

    /// Joins that were granted the master role
    pub master_grants: u64,

    /// State messages fanned out to a room
    pub broadcasts: u64,

    /// Individual deliveries across all broadcasts
    pub deliveries: u64,

    /// Frames skipped because a member's outbox was full
    pub dropped_frames: u64,

    /// State writes refused for lack of authority
    pub rejected_writes: u64,

    /// Malformed or invalid messages
    pub protocol_errors: u64,

    /// Live rooms
    pub rooms: Vec<RoomSummary>,

    /// Log entries
    pub logs: VecDeque<LogEntry>,

    /// Server status
    pub status: ServerStatus,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            start_time: Local::now(),
            bind_addr: None,
            master_key_configured: false,
            connected_clients: 0,
            total_connections: 0,
            peak_connections: 0,
            total_joins: 0,
            master_grants: 0,
            broadcasts: 0,
            deliveries: 0,
            dropped_frames: 0,
            rejected_writes: 0,
            protocol_errors: 0,
            rooms: Vec::new(),
            logs: VecDeque::with_capacity(MAX_LOG_ENTRIES),
            status: ServerStatus::Starting,
        }
    }

    /// Add a log entry
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        if self.logs.len() >= MAX_LOG_ENTRIES {
            self.logs.pop_front();
        }
        self.logs.push_back(LogEntry {
            timestamp: Local::now(),
            level,
            message: message.into(),
        });
    }

    /// Record a new connection
    pub fn connection_opened(&mut self, addr: &str) {
        self.connected_clients += 1;
        self.total_connections += 1;
        if self.connected_clients > self.peak_connections {
            self.peak_connections = self.connected_clients;
        }
        self.log(LogLevel::Connection, format!("Connected: {}", addr));
    }

    /// Record a closed connection
    pub fn connection_closed(&mut self, addr: &str) {
        self.connected_clients = self.connected_clients.saturating_sub(1);
        self.log(LogLevel::Connection, format!("Disconnected: {}", addr));
    }

    /// Record a join
    pub fn joined(&mut self, room: &str, role: &str, is_master: bool) {
        self.total_joins += 1;
        if is_master {
            self.master_grants += 1;
        }
        let suffix = if is_master { " (master)" } else { "" };
        self.log(
            LogLevel::Room,
            format!("Join {} as {}{}", truncate_label(room), role, suffix),
        );
    }

    /// Record a fan-out of one state message
    pub fn broadcast(&mut self, delivered: usize, dropped: usize) {
        self.broadcasts += 1;
        self.deliveries += delivered as u64;
        self.dropped_frames += dropped as u64;
    }

    pub fn write_rejected(&mut self, room: Option<&str>) {
        self.rejected_writes += 1;
        let room = room.map(truncate_label).unwrap_or_else(|| "-".to_string());
        self.log(LogLevel::Warning, format!("Rejected write in {}", room));
    }

    pub fn protocol_error(&mut self) {
        self.protocol_errors += 1;
    }

    /// Replace the room list
    pub fn set_rooms(&mut self, rooms: Vec<RoomSummary>) {
        self.rooms = rooms;
    }

    /// Time since start, e.g. `42s`, `3m 07s`, `5h 12m`
    pub fn uptime(&self) -> String {
        let elapsed = Local::now().signed_duration_since(self.start_time);
        format_uptime(elapsed.num_seconds().max(0) as u64)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn format_uptime(secs: u64) -> String {
    match secs {
        0..=59 => format!("{secs}s"),
        60..=3599 => format!("{}m {:02}s", secs / 60, secs % 60),
        _ => format!("{}h {:02}m", secs / 3600, secs % 3600 / 60),
    }
}

/// Truncate a room name for display (show first and last few chars)
pub fn truncate_label(label: &str) -> String {
    let chars: Vec<char> = label.chars().collect();
    if chars.len() > 24 {
        let head: String = chars[..14].iter().collect();
        let tail: String = chars[chars.len() - 6..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        label.to_string()
    }
}
