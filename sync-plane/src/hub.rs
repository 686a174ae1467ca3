//! Room hub
//!
//! Tracks which connection belongs to which room, who holds write authority
//! in each room, and fans validated master state out to every member.
//!
//! Each connection task owns its [`Subscriber`]; the hub only keeps the
//! per-room member outboxes. All sends are non-blocking pushes onto bounded
//! outboxes, so a broadcast completes while the room map lock is held and
//! messages from one room are delivered in the order the hub processed them.
//! A member whose outbox is full misses that frame.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tempo_core::sync::{current_time_ms, ClientMessage, Role, ServerMessage, StateUpdate, ValidationError};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

use crate::metrics::{Metrics, RoomSummary};

/// Connection identifier, unique for the hub's lifetime
pub type ConnId = u64;

/// Frames a member may have waiting before further frames are dropped
pub const OUTBOX_CAPACITY: usize = 32;

/// Errors reported back to the sending connection
#[derive(Debug, Error)]
pub enum PlaneError {
    #[error("invalid message: {0}")]
    Protocol(String),

    #[error("join a room first")]
    NotJoined,

    #[error("only the room master may publish state")]
    Unauthorized,

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Ephemeral per-connection state, created on connect and dropped on close
#[derive(Debug)]
pub struct Subscriber {
    id: ConnId,
    room: Option<String>,
    role: Role,
    outbox: mpsc::Sender<Message>,
}

impl Subscriber {
    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    pub fn role(&self) -> Role {
        self.role
    }
}

#[derive(Default)]
struct Room {
    members: HashMap<ConnId, mpsc::Sender<Message>>,
    /// The single connection allowed to publish
    master: Option<ConnId>,
}

pub struct RoomHub {
    rooms: RwLock<HashMap<String, Room>>,
    master_key: Option<String>,
    next_id: AtomicU64,
    metrics: Arc<RwLock<Metrics>>,
}

impl RoomHub {
    pub fn new(master_key: Option<String>, metrics: Arc<RwLock<Metrics>>) -> Self {
        metrics.write().master_key_configured = master_key.is_some();
        Self {
            rooms: RwLock::new(HashMap::new()),
            master_key,
            next_id: AtomicU64::new(1),
            metrics,
        }
    }

    /// Register a new connection whose outgoing messages go to `outbox`
    pub fn connect(&self, outbox: mpsc::Sender<Message>) -> Subscriber {
        Subscriber {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            room: None,
            role: Role::Peer,
            outbox,
        }
    }

    /// Handle one text frame. Returns the reply for the sender, if any.
    ///
    /// Never fails: every error becomes an `error` reply and the connection
    /// stays usable.
    pub fn handle_text(&self, sub: &mut Subscriber, text: &str) -> Option<ServerMessage> {
        let result = serde_json::from_str::<ClientMessage>(text)
            .map_err(|e| PlaneError::Protocol(e.to_string()))
            .and_then(|message| self.handle(sub, message));

        match result {
            Ok(reply) => reply,
            Err(e) => {
                match &e {
                    PlaneError::Unauthorized | PlaneError::NotJoined => {
                        self.metrics.write().write_rejected(sub.room());
                    }
                    _ => self.metrics.write().protocol_error(),
                }
                debug!("Connection {}: {}", sub.id, e);
                Some(ServerMessage::error(e.to_string()))
            }
        }
    }

    /// Dispatch a parsed message
    pub fn handle(
        &self,
        sub: &mut Subscriber,
        message: ClientMessage,
    ) -> Result<Option<ServerMessage>, PlaneError> {
        match message {
            ClientMessage::Join {
                room,
                role,
                master_key,
            } => self.join(sub, &room, role, master_key.as_deref()).map(Some),
            ClientMessage::State(update) => {
                self.publish(sub, update)?;
                Ok(None)
            }
            ClientMessage::Ping { sent_at } => Ok(Some(ServerMessage::Pong {
                sent_at,
                server_at: current_time_ms(),
            })),
        }
    }

    /// Join `room`, leaving any previous room first.
    ///
    /// A master join with the configured key takes write authority over from
    /// whoever held it in that room.
    pub fn join(
        &self,
        sub: &mut Subscriber,
        room: &str,
        role: Role,
        master_key: Option<&str>,
    ) -> Result<ServerMessage, PlaneError> {
        if room.is_empty() {
            return Err(ValidationError::EmptyRoom.into());
        }

        self.leave(sub);

        let is_master = role == Role::Master
            && matches!((self.master_key.as_deref(), master_key), (Some(secret), Some(key)) if secret == key);

        {
            let mut rooms = self.rooms.write();
            let entry = rooms.entry(room.to_string()).or_default();
            entry.members.insert(sub.id, sub.outbox.clone());

            if is_master {
                if let Some(previous) = entry.master.replace(sub.id) {
                    if let Some(outbox) = entry.members.get(&previous) {
                        let notice = ServerMessage::error("master role taken over by another connection");
                        if let Ok(text) = serde_json::to_string(&notice) {
                            let _ = outbox.try_send(Message::text(text));
                        }
                    }
                    info!("Room {}: master moved from {} to {}", room, previous, sub.id);
                }
            }
        }

        sub.room = Some(room.to_string());
        sub.role = role;

        if role == Role::Master && !is_master {
            warn!("Connection {} asked for master in {} without a valid key", sub.id, room);
        }
        info!("Connection {} joined {} as {} (master: {})", sub.id, room, role, is_master);

        let summaries = self.summaries();
        {
            let mut m = self.metrics.write();
            m.joined(room, role.as_str(), is_master);
            m.set_rooms(summaries);
        }

        Ok(ServerMessage::Joined {
            room: room.to_string(),
            role,
            is_master,
        })
    }

    /// Validate master state and fan it out to the sender's room.
    /// Returns the number of connections it was delivered to.
    pub fn publish(&self, sub: &Subscriber, update: StateUpdate) -> Result<usize, PlaneError> {
        let room = sub.room.as_deref().ok_or(PlaneError::NotJoined)?;

        let rooms = self.rooms.read();
        let Some(entry) = rooms.get(room) else {
            return Err(PlaneError::NotJoined);
        };
        if entry.master != Some(sub.id) {
            return Err(PlaneError::Unauthorized);
        }

        let state = update.validate(current_time_ms())?;
        let text = serde_json::to_string(&ServerMessage::State(state))
            .map_err(|e| PlaneError::Protocol(e.to_string()))?;
        let message = Message::text(text);

        let mut delivered = 0;
        let mut dropped = 0;
        for (id, outbox) in &entry.members {
            match outbox.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    dropped += 1;
                    trace!("Connection {} is not keeping up, frame dropped", id);
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
        drop(rooms);

        self.metrics.write().broadcast(delivered, dropped);
        Ok(delivered)
    }

    /// Remove the connection from its room; drop the room once empty
    pub fn leave(&self, sub: &mut Subscriber) {
        let Some(room) = sub.room.take() else {
            return;
        };

        {
            let mut rooms = self.rooms.write();
            if let Some(entry) = rooms.get_mut(&room) {
                entry.members.remove(&sub.id);
                if entry.master == Some(sub.id) {
                    entry.master = None;
                }
                if entry.members.is_empty() {
                    rooms.remove(&room);
                    debug!("Room {} is empty, dropped", room);
                }
            }
        }

        let summaries = self.summaries();
        self.metrics.write().set_rooms(summaries);
    }

    /// Whether the connection currently holds write authority in its room
    pub fn is_master(&self, sub: &Subscriber) -> bool {
        let Some(room) = sub.room.as_deref() else {
            return false;
        };
        self.rooms
            .read()
            .get(room)
            .is_some_and(|entry| entry.master == Some(sub.id))
    }

    /// Forget the connection entirely
    pub fn disconnect(&self, sub: &mut Subscriber) {
        self.leave(sub);
    }

    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }

    pub fn member_count(&self, room: &str) -> usize {
        self.rooms.read().get(room).map_or(0, |r| r.members.len())
    }

    /// Current rooms sorted by name
    pub fn summaries(&self) -> Vec<RoomSummary> {
        let rooms = self.rooms.read();
        let mut list: Vec<RoomSummary> = rooms
            .iter()
            .map(|(name, room)| RoomSummary {
                name: name.clone(),
                members: room.members.len(),
                has_master: room.master.is_some(),
            })
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }
}
