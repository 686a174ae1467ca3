//! Outbound connection to the sync plane

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::BridgeError;
use crate::sync::{ClientMessage, ServerMessage};

/// Events reported by a relay connection task.
///
/// Every event carries the generation of the link that produced it so the
/// coordinator can ignore stragglers from sockets it already replaced.
#[derive(Debug)]
pub enum RelayEvent {
    Opened { generation: u64 },
    Message { generation: u64, message: ServerMessage },
    Closed { generation: u64, reason: String },
}

impl RelayEvent {
    pub fn generation(&self) -> u64 {
        match self {
            RelayEvent::Opened { generation }
            | RelayEvent::Message { generation, .. }
            | RelayEvent::Closed { generation, .. } => *generation,
        }
    }
}

/// A single relay socket. Dropping the link aborts its task.
pub struct RelayLink {
    generation: u64,
    outgoing: mpsc::UnboundedSender<ClientMessage>,
    task: JoinHandle<()>,
}

impl RelayLink {
    /// Connect to `url`, send `join` and start forwarding traffic.
    ///
    /// Connection failures are reported as [`RelayEvent::Closed`], never
    /// returned.
    pub fn open(
        url: String,
        join: ClientMessage,
        generation: u64,
        events: mpsc::UnboundedSender<RelayEvent>,
    ) -> Self {
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            let reason = match drive(&url, join, generation, outgoing_rx, &events).await {
                Ok(()) => "closed".to_string(),
                Err(e) => e.to_string(),
            };
            let _ = events.send(RelayEvent::Closed { generation, reason });
        });

        Self {
            generation,
            outgoing,
            task,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue a message. Returns false if the socket task has ended.
    pub fn send(&self, message: ClientMessage) -> bool {
        self.outgoing.send(message).is_ok()
    }
}

impl Drop for RelayLink {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn drive(
    url: &str,
    join: ClientMessage,
    generation: u64,
    mut outgoing: mpsc::UnboundedReceiver<ClientMessage>,
    events: &mpsc::UnboundedSender<RelayEvent>,
) -> Result<(), BridgeError> {
    debug!("Connecting to relay {} (generation {})", url, generation);
    let (ws, _) = tokio_tungstenite::connect_async(url).await?;
    let (mut sink, mut stream) = ws.split();

    sink.send(Message::text(serde_json::to_string(&join)?)).await?;
    info!("Relay connected: {}", url);
    let _ = events.send(RelayEvent::Opened { generation });

    loop {
        tokio::select! {
            message = outgoing.recv() => match message {
                Some(message) => {
                    sink.send(Message::text(serde_json::to_string(&message)?)).await?;
                }
                None => {
                    let _ = sink.close().await;
                    return Ok(());
                }
            },

            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ServerMessage>(text.as_str()) {
                        Ok(message) => {
                            let _ = events.send(RelayEvent::Message { generation, message });
                        }
                        Err(e) => warn!("Ignoring unparsable relay message: {}", e),
                    }
                }
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
        }
    }
}
