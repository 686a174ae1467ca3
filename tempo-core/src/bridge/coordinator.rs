//! Sync Coordinator
//!
//! Owns the clock engine and the mode/role/room bindings. All state lives in a
//! single task; local connections and the relay socket talk to it over
//! channels, so nothing here needs a lock except the published status
//! snapshot.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde_json::Number;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use super::backoff::{ReconnectTimer, RECONNECT_DELAY};
use super::relay::{RelayEvent, RelayLink};
use super::BridgeError;
use crate::clock::{ClockEngine, LinkKind};
use crate::config::BridgeConfig;
use crate::latency::LatencyTracker;
use crate::sync::{
    current_time_ms, BridgeCommand, BridgeEvent, BridgeStatus, ClientMessage, RelayStatus,
    RelayedWanState, Role, ServerMessage, StateUpdate, SyncMode, TickState, TransportState,
    ValidationError,
};
use crate::wan;

/// Period of the subscriber tick
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Minimum spacing between state pushes to the relay
pub const MIN_PUSH_INTERVAL: Duration = Duration::from_millis(200);

/// How often a connected bridge probes relay latency
pub const RELAY_PING_INTERVAL: Duration = Duration::from_secs(5);

/// Capacity of the subscriber fan-out channel
const EVENT_CAPACITY: usize = 256;

/// Inputs processed by the coordinator task
#[derive(Debug)]
pub enum Input {
    /// A command from a local subscriber; replies go to `reply` only
    Command {
        command: BridgeCommand,
        reply: mpsc::UnboundedSender<BridgeEvent>,
    },
    Shutdown,
}

/// Cloneable handle to a running coordinator
#[derive(Clone)]
pub struct CoordinatorHandle {
    inputs: mpsc::UnboundedSender<Input>,
    events: broadcast::Sender<BridgeEvent>,
    status: Arc<RwLock<BridgeStatus>>,
}

impl CoordinatorHandle {
    /// Start a coordinator task around `engine`
    pub fn spawn(engine: Box<dyn ClockEngine>, config: BridgeConfig) -> (Self, JoinHandle<()>) {
        let coordinator = Coordinator::new(engine, config);
        let events = coordinator.events.clone();
        let status = Arc::clone(&coordinator.status);
        let (inputs, inputs_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(coordinator.run(inputs_rx));

        (Self { inputs, events, status }, task)
    }

    /// Forward a subscriber command
    pub fn submit(
        &self,
        command: BridgeCommand,
        reply: mpsc::UnboundedSender<BridgeEvent>,
    ) -> Result<(), BridgeError> {
        self.inputs
            .send(Input::Command { command, reply })
            .map_err(|_| BridgeError::CoordinatorGone)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    /// Latest published status
    pub fn status(&self) -> BridgeStatus {
        self.status.read().clone()
    }

    pub fn link(&self) -> LinkKind {
        self.status.read().link
    }

    pub fn shutdown(&self) {
        let _ = self.inputs.send(Input::Shutdown);
    }
}

pub struct Coordinator {
    engine: Box<dyn ClockEngine>,
    config: BridgeConfig,

    mode: SyncMode,
    role: Role,
    room: Option<String>,
    relay_url: Option<String>,
    master_key: Option<String>,

    /// Last relayed master state, for peers in WAN mode
    wan_cache: Option<RelayedWanState>,
    relay: Option<RelayLink>,
    relay_status: RelayStatus,
    /// Whether the sync plane granted us the master role
    is_master: bool,
    generation: u64,
    reconnect: ReconnectTimer,
    latency: LatencyTracker,
    last_push: Option<Instant>,

    events: broadcast::Sender<BridgeEvent>,
    status: Arc<RwLock<BridgeStatus>>,
    relay_tx: mpsc::UnboundedSender<RelayEvent>,
    relay_rx: Option<mpsc::UnboundedReceiver<RelayEvent>>,
}

impl Coordinator {
    pub fn new(engine: Box<dyn ClockEngine>, config: BridgeConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (relay_tx, relay_rx) = mpsc::unbounded_channel();
        let status = BridgeStatus {
            mode: SyncMode::default(),
            role: Role::default(),
            room: None,
            link: engine.kind(),
            relay: RelayStatus::Disabled,
            is_master: false,
            latency_ms: None,
        };

        Self {
            engine,
            config,
            mode: SyncMode::default(),
            role: Role::default(),
            room: None,
            relay_url: None,
            master_key: None,
            wan_cache: None,
            relay: None,
            relay_status: RelayStatus::Disabled,
            is_master: false,
            generation: 0,
            reconnect: ReconnectTimer::new(),
            latency: LatencyTracker::new(),
            last_push: None,
            events,
            status: Arc::new(RwLock::new(status)),
            relay_tx,
            relay_rx: Some(relay_rx),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> BridgeStatus {
        self.status.read().clone()
    }

    pub fn relay_status(&self) -> RelayStatus {
        self.relay_status
    }

    /// Generation of the current relay socket, if one is open
    pub fn relay_generation(&self) -> Option<u64> {
        self.relay.as_ref().map(RelayLink::generation)
    }

    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.reconnect.deadline()
    }

    pub fn wan_cache(&self) -> Option<&RelayedWanState> {
        self.wan_cache.as_ref()
    }

    pub fn engine(&self) -> &dyn ClockEngine {
        self.engine.as_ref()
    }

    /// Run the event loop until shutdown
    pub async fn run(mut self, mut inputs: mpsc::UnboundedReceiver<Input>) {
        let Some(mut relay_rx) = self.relay_rx.take() else {
            warn!("Coordinator already ran");
            return;
        };

        let mut tick = tokio::time::interval(TICK_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ping = tokio::time::interval(RELAY_PING_INTERVAL);
        ping.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Sync coordinator started (clock: {})", self.engine.kind().as_str());

        loop {
            let reconnect_at = self.reconnect.deadline();

            tokio::select! {
                _ = tick.tick() => {
                    self.tick(Instant::now());
                }

                _ = ping.tick() => {
                    self.ping_relay(Instant::now());
                }

                _ = sleep_until(reconnect_at) => {
                    self.reconnect_due(Instant::now());
                }

                Some(event) = relay_rx.recv() => {
                    self.handle_relay_event(event, Instant::now());
                }

                input = inputs.recv() => match input {
                    Some(Input::Command { command, reply }) => {
                        match self.handle_command(command, Instant::now()) {
                            Ok(Some(event)) => { let _ = reply.send(event); }
                            Ok(None) => {}
                            Err(e) => {
                                debug!("Command rejected: {}", e);
                                let _ = reply.send(BridgeEvent::error(e.to_string()));
                            }
                        }
                    }
                    Some(Input::Shutdown) | None => break,
                },
            }
        }

        self.reconnect.cancel();
        self.relay = None;
        info!("Sync coordinator stopped");
    }

    /// Apply a subscriber command. Returns a reply meant for the sender only.
    pub fn handle_command(
        &mut self,
        command: BridgeCommand,
        now: Instant,
    ) -> Result<Option<BridgeEvent>, BridgeError> {
        match command {
            BridgeCommand::Configure {
                room,
                role,
                mode,
                relay_url,
                master_key,
            } => {
                self.configure(room, role, mode, relay_url, master_key)?;
                Ok(None)
            }
            BridgeCommand::Set {
                tempo,
                quantum,
                transport,
            } => {
                self.set(tempo, quantum, transport, now);
                Ok(None)
            }
            BridgeCommand::Ping { sent_at } => Ok(Some(BridgeEvent::Pong {
                sent_at,
                server_at: current_time_ms(),
            })),
        }
    }

    /// Rebind room/role/mode. Opens the relay socket for `LINK_WAN`, closes
    /// it otherwise.
    pub fn configure(
        &mut self,
        room: String,
        role: Role,
        mode: SyncMode,
        relay_url: Option<String>,
        master_key: Option<String>,
    ) -> Result<(), BridgeError> {
        if room.is_empty() {
            return Err(ValidationError::EmptyRoom.into());
        }

        let relay_url = relay_url.or_else(|| self.config.relay_url.clone());
        if mode == SyncMode::LinkWan && relay_url.is_none() {
            return Err(BridgeError::MissingRelayEndpoint);
        }

        info!("Configure: room={} role={} mode={}", room, role, mode);

        self.room = Some(room);
        self.role = role;
        self.mode = mode;
        self.relay_url = relay_url;
        self.master_key = master_key.or_else(|| self.config.master_key.clone());

        self.reconnect.cancel();
        self.relay = None;
        self.is_master = false;
        self.wan_cache = None;
        self.last_push = None;
        self.latency.clear();

        if mode == SyncMode::LinkWan {
            self.open_relay();
        } else {
            self.relay_status = RelayStatus::Disabled;
        }

        self.publish_status();
        Ok(())
    }

    /// Local operator control; applied straight to the engine
    pub fn set(
        &mut self,
        tempo: Option<f64>,
        quantum: Option<f64>,
        transport: Option<TransportState>,
        now: Instant,
    ) {
        if let Some(tempo) = tempo {
            self.engine.set_tempo_at(tempo, now);
        }
        if let Some(quantum) = quantum {
            self.engine.set_quantum(quantum);
        }
        if let Some(transport) = transport {
            self.engine.set_transport_at(transport, now);
        }
        debug!("Set: tempo={:?} quantum={:?} transport={:?}", tempo, quantum, transport);
    }

    /// Compute the current state, fan it out locally and push it upstream
    /// when we are the WAN master.
    pub fn tick(&mut self, now: Instant) -> TickState {
        let (clock, transport) = match (&self.wan_cache, self.follows_relay()) {
            (Some(cached), true) => (wan::extrapolate(cached, now), cached.transport),
            _ => (self.engine.state_at(now), self.engine.transport()),
        };

        let tick = TickState::new(clock, transport, self.mode, self.role);
        let _ = self.events.send(BridgeEvent::State(tick.clone()));

        if self.pushes_to_relay() && self.push_due(now) {
            if let Some(link) = &self.relay {
                let update = StateUpdate::from_clock(&clock, transport, SyncMode::LinkWan);
                if link.send(ClientMessage::State(update)) {
                    self.last_push = Some(now);
                    trace!("Pushed state: tempo={} beat={:.3}", clock.tempo, clock.beat);
                }
            }
        }

        tick
    }

    /// Handle traffic and lifecycle events from the relay socket
    pub fn handle_relay_event(&mut self, event: RelayEvent, now: Instant) {
        if self.relay_generation() != Some(event.generation()) {
            trace!("Ignoring event from stale relay generation {}", event.generation());
            return;
        }

        match event {
            RelayEvent::Opened { .. } => {
                debug!("Relay socket open, waiting for join confirmation");
            }
            RelayEvent::Message { message, .. } => self.handle_relay_message(message, now),
            RelayEvent::Closed { reason, .. } => self.relay_lost(&reason, now),
        }
    }

    fn handle_relay_message(&mut self, message: ServerMessage, now: Instant) {
        match message {
            ServerMessage::Joined {
                room,
                role,
                is_master,
            } => {
                info!("Joined relay room {} as {} (master: {})", room, role, is_master);
                self.relay_status = RelayStatus::Connected;
                self.is_master = is_master;
                if self.role == Role::Master && !is_master {
                    warn!("Relay refused master role for room {}", room);
                    let _ = self.events.send(BridgeEvent::error(format!(
                        "relay refused master role for room {room}; check the master key"
                    )));
                }
                self.publish_status();
                // First latency sample right away rather than one ping interval later
                self.ping_relay(now);
            }

            ServerMessage::State(state) => {
                if self.role != Role::Peer || self.mode != SyncMode::LinkWan {
                    return;
                }

                self.engine.set_tempo_at(state.tempo, now);
                if let Some(quantum) = state.quantum {
                    self.engine.set_quantum(quantum);
                }
                self.engine.set_transport_at(state.transport, now);

                // Back-date by the one-way latency so extrapolation starts
                // from where the master actually is
                let received_at = self
                    .latency
                    .one_way_latency()
                    .and_then(|latency| now.checked_sub(latency))
                    .unwrap_or(now);
                let quantum = self.engine.state_at(now).quantum;
                self.wan_cache = Some(RelayedWanState::from_broadcast(&state, quantum, received_at));
                trace!("Relay state: tempo={} transport={}", state.tempo, state.transport);
            }

            ServerMessage::Pong { sent_at, .. } => {
                if let Some(sent_at) = sent_at.as_u64() {
                    if self.latency.handle_pong(sent_at, now).is_some() {
                        self.publish_status();
                    }
                }
            }

            ServerMessage::Error { message } => {
                warn!("Relay error: {}", message);
                let _ = self.events.send(BridgeEvent::error(format!("relay: {message}")));
            }
        }
    }

    /// The relay socket closed or failed; schedule exactly one reconnect
    fn relay_lost(&mut self, reason: &str, now: Instant) {
        self.relay = None;
        self.is_master = false;

        if self.mode != SyncMode::LinkWan {
            self.relay_status = RelayStatus::Disabled;
            self.publish_status();
            return;
        }

        if !self.reconnect.is_pending() {
            self.reconnect.schedule(now);
            warn!("Relay connection lost ({}), reconnecting in {:?}", reason, RECONNECT_DELAY);
        }
        self.relay_status = RelayStatus::Reconnecting;
        self.publish_status();
    }

    /// Called when the reconnect deadline passes
    pub fn reconnect_due(&mut self, now: Instant) {
        if !self.reconnect.fire(now) {
            return;
        }
        if self.mode == SyncMode::LinkWan && self.relay.is_none() {
            info!("Reconnecting to relay");
            self.open_relay();
            self.publish_status();
        }
    }

    /// Send a latency probe over the relay socket
    pub fn ping_relay(&mut self, now: Instant) {
        if self.relay_status != RelayStatus::Connected {
            return;
        }
        if let Some(link) = &self.relay {
            let sent_at = self.latency.create_ping(now, current_time_ms());
            link.send(ClientMessage::Ping {
                sent_at: Number::from(sent_at),
            });
        }
    }

    fn open_relay(&mut self) {
        let (Some(url), Some(room)) = (self.relay_url.clone(), self.room.clone()) else {
            return;
        };

        self.generation += 1;
        let join = ClientMessage::Join {
            room,
            role: self.role,
            master_key: self.master_key.clone(),
        };
        self.relay = Some(RelayLink::open(url, join, self.generation, self.relay_tx.clone()));
        self.relay_status = RelayStatus::Connecting;
        self.is_master = false;
    }

    fn follows_relay(&self) -> bool {
        self.mode == SyncMode::LinkWan && self.role == Role::Peer
    }

    fn pushes_to_relay(&self) -> bool {
        self.mode == SyncMode::LinkWan
            && self.role == Role::Master
            && self.is_master
            && self.relay_status == RelayStatus::Connected
    }

    fn push_due(&self, now: Instant) -> bool {
        self.last_push
            .map_or(true, |last| now.saturating_duration_since(last) >= MIN_PUSH_INTERVAL)
    }

    fn publish_status(&self) {
        let status = BridgeStatus {
            mode: self.mode,
            role: self.role,
            room: self.room.clone(),
            link: self.engine.kind(),
            relay: self.relay_status,
            is_master: self.is_master,
            latency_ms: self.latency.one_way_latency().map(|d| d.as_millis() as u64),
        };
        *self.status.write() = status.clone();
        let _ = self.events.send(BridgeEvent::Status(status));
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use crate::sync::BroadcastState;

    fn coordinator() -> Coordinator {
        let config = BridgeConfig {
            // Nothing listens here; connects fail fast
            relay_url: Some("ws://127.0.0.1:9/sync".to_string()),
            ..BridgeConfig::default()
        };
        Coordinator::new(Box::new(VirtualClock::default()), config)
    }

    fn broadcast(tempo: f64, transport: TransportState) -> BroadcastState {
        BroadcastState {
            tempo,
            transport,
            mode: Some(SyncMode::LinkWan),
            quantum: Some(4.0),
            beat: Some(0.0),
            phase: Some(0.0),
            at: 0,
        }
    }

    #[tokio::test]
    async fn test_lan_configure_has_no_relay() {
        let mut c = coordinator();
        c.configure("studio-1".into(), Role::Master, SyncMode::LinkLan, None, None)
            .unwrap();
        assert_eq!(c.relay_generation(), None);
        assert_eq!(c.relay_status(), RelayStatus::Disabled);
        assert_eq!(c.status().room.as_deref(), Some("studio-1"));
    }

    #[tokio::test]
    async fn test_wan_configure_opens_relay() {
        let mut c = coordinator();
        c.configure("studio-1".into(), Role::Peer, SyncMode::LinkWan, None, None)
            .unwrap();
        assert_eq!(c.relay_generation(), Some(1));
        assert_eq!(c.relay_status(), RelayStatus::Connecting);

        // Switching back to LAN closes it
        c.configure("studio-1".into(), Role::Peer, SyncMode::LinkLan, None, None)
            .unwrap();
        assert_eq!(c.relay_generation(), None);
    }

    #[tokio::test]
    async fn test_wan_without_endpoint_rejected() {
        let mut c = Coordinator::new(Box::new(VirtualClock::default()), BridgeConfig::default());
        let err = c
            .configure("r".into(), Role::Peer, SyncMode::LinkWan, None, None)
            .unwrap_err();
        assert!(matches!(err, BridgeError::MissingRelayEndpoint));
        assert_eq!(c.status().room, None);
    }

    #[tokio::test]
    async fn test_empty_room_rejected() {
        let mut c = coordinator();
        let err = c
            .configure(String::new(), Role::Peer, SyncMode::LinkLan, None, None)
            .unwrap_err();
        assert!(matches!(err, BridgeError::Invalid(ValidationError::EmptyRoom)));
    }

    #[tokio::test]
    async fn test_room_name_kept_verbatim() {
        let mut c = coordinator();
        c.configure(" studio-1".into(), Role::Peer, SyncMode::LinkLan, None, None)
            .unwrap();
        assert_eq!(c.status().room.as_deref(), Some(" studio-1"));
    }

    #[tokio::test]
    async fn test_close_schedules_single_reconnect() {
        let mut c = coordinator();
        let t0 = Instant::now();
        c.configure("studio-1".into(), Role::Peer, SyncMode::LinkWan, None, None)
            .unwrap();
        let generation = c.relay_generation().unwrap();

        c.handle_relay_event(
            RelayEvent::Closed { generation, reason: "reset".into() },
            t0,
        );
        let deadline = c.reconnect_deadline().expect("reconnect scheduled");
        assert!(deadline - t0 <= RECONNECT_DELAY);
        assert_eq!(c.relay_status(), RelayStatus::Reconnecting);
        assert_eq!(c.relay_generation(), None);

        // A second close before the timer fires changes nothing
        c.handle_relay_event(
            RelayEvent::Closed { generation, reason: "reset".into() },
            t0 + Duration::from_millis(500),
        );
        assert_eq!(c.reconnect_deadline(), Some(deadline));
        assert_eq!(c.relay_generation(), None);

        // Firing opens exactly one new socket
        c.reconnect_due(t0 + Duration::from_millis(1_000));
        assert_eq!(c.relay_generation(), None);
        c.reconnect_due(deadline);
        assert_eq!(c.relay_generation(), Some(generation + 1));
        assert_eq!(c.reconnect_deadline(), None);
        c.reconnect_due(deadline + Duration::from_secs(5));
        assert_eq!(c.relay_generation(), Some(generation + 1));
    }

    #[tokio::test]
    async fn test_reconfigure_cancels_pending_reconnect() {
        let mut c = coordinator();
        let t0 = Instant::now();
        c.configure("a".into(), Role::Peer, SyncMode::LinkWan, None, None).unwrap();
        let generation = c.relay_generation().unwrap();
        c.handle_relay_event(RelayEvent::Closed { generation, reason: "eof".into() }, t0);
        assert!(c.reconnect_deadline().is_some());

        c.configure("b".into(), Role::Peer, SyncMode::LinkWan, None, None).unwrap();
        assert_eq!(c.reconnect_deadline(), None);
        assert_eq!(c.relay_generation(), Some(generation + 1));
    }

    #[tokio::test]
    async fn test_peer_follows_relayed_state() {
        let mut c = coordinator();
        let t0 = Instant::now();
        c.configure("studio-1".into(), Role::Peer, SyncMode::LinkWan, None, None)
            .unwrap();
        let generation = c.relay_generation().unwrap();

        c.handle_relay_event(
            RelayEvent::Message {
                generation,
                message: ServerMessage::State(broadcast(120.0, TransportState::Playing)),
            },
            t0,
        );

        // Engine keeps the last shared tempo for later mode switches
        assert_eq!(c.engine().state_at(t0).tempo, 120.0);
        assert_eq!(c.engine().transport(), TransportState::Playing);

        let tick = c.tick(t0 + Duration::from_millis(500));
        assert!((tick.beat - 1.0).abs() < 1e-9);
        assert!((tick.phase - 1.0).abs() < 1e-9);
        assert_eq!(tick.transport, TransportState::Playing);
        assert_eq!(tick.mode, SyncMode::LinkWan);
        assert_eq!(tick.role, Role::Peer);
    }

    #[tokio::test]
    async fn test_stale_generation_ignored() {
        let mut c = coordinator();
        let t0 = Instant::now();
        c.configure("studio-1".into(), Role::Peer, SyncMode::LinkWan, None, None)
            .unwrap();
        let generation = c.relay_generation().unwrap();

        c.handle_relay_event(
            RelayEvent::Message {
                generation: generation + 7,
                message: ServerMessage::State(broadcast(99.0, TransportState::Playing)),
            },
            t0,
        );
        assert!(c.wan_cache().is_none());

        c.handle_relay_event(RelayEvent::Closed { generation: generation + 7, reason: "x".into() }, t0);
        assert!(c.reconnect_deadline().is_none());
    }

    #[tokio::test]
    async fn test_master_ignores_echo_and_refused_grant_reported() {
        let mut c = coordinator();
        let mut events = c.subscribe();
        let t0 = Instant::now();
        c.configure("studio-1".into(), Role::Master, SyncMode::LinkWan, None, None)
            .unwrap();
        let generation = c.relay_generation().unwrap();

        c.handle_relay_event(
            RelayEvent::Message {
                generation,
                message: ServerMessage::Joined {
                    room: "studio-1".into(),
                    role: Role::Master,
                    is_master: false,
                },
            },
            t0,
        );
        assert_eq!(c.relay_status(), RelayStatus::Connected);
        assert!(!c.status().is_master);

        let mut saw_error = false;
        while let Ok(event) = events.try_recv() {
            if let BridgeEvent::Error { message } = event {
                assert!(message.contains("master"));
                saw_error = true;
            }
        }
        assert!(saw_error);

        c.handle_relay_event(
            RelayEvent::Message {
                generation,
                message: ServerMessage::State(broadcast(60.0, TransportState::Playing)),
            },
            t0,
        );
        assert!(c.wan_cache().is_none());
        assert_eq!(c.engine().state_at(t0).tempo, 120.0);
    }

    #[tokio::test]
    async fn test_set_observed_on_next_tick() {
        let mut c = coordinator();
        let mut events = c.subscribe();
        let t0 = Instant::now();
        c.set(Some(90.0), Some(3.0), Some(TransportState::Playing), t0);

        let tick = c.tick(t0 + Duration::from_secs(2));
        assert_eq!(tick.tempo, 90.0);
        assert_eq!(tick.quantum, 3);
        assert!((tick.beat - 3.0).abs() < 1e-9);
        assert!((tick.phase - 0.0).abs() < 1e-9);

        match events.try_recv().unwrap() {
            BridgeEvent::State(state) => assert_eq!(state, tick),
            other => panic!("expected state, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ping_command_echoes() {
        let mut c = coordinator();
        let reply = c
            .handle_command(
                BridgeCommand::Ping { sent_at: Number::from(1234u64) },
                Instant::now(),
            )
            .unwrap();
        match reply {
            Some(BridgeEvent::Pong { sent_at, server_at }) => {
                assert_eq!(sent_at.as_u64(), Some(1234));
                assert!(server_at > 0);
            }
            other => panic!("expected pong, got {other:?}"),
        }
    }
}
