//! WebSocket listener for the sync plane

use crate::hub::{RoomHub, Subscriber, OUTBOX_CAPACITY};
use crate::metrics::{LogLevel, Metrics, ServerStatus};
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempo_core::config::ConfigError;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};

/// Default bind host
pub const DEFAULT_PLANE_HOST: &str = "0.0.0.0";

/// Default bind port
pub const DEFAULT_PLANE_PORT: u16 = 8787;

/// Only WebSocket upgrades on this path are accepted
pub const SYNC_PATH: &str = "/sync";

/// Pause after an accept failure that is not specific to one connection
const ACCEPT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Events sent from network to dashboard
#[derive(Debug)]
pub enum NetworkEvent {
    Ready { addr: String },
    Failed(String),
}

/// Connection-level failures; these end only the affected connection
#[derive(Debug, Error)]
pub enum ServeError {
    #[error(transparent)]
    WebSocket(#[from] tungstenite::Error),

    #[error(transparent)]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaneConfig {
    pub host: String,
    pub port: u16,
    /// Shared secret a master must present on join
    pub master_key: Option<String>,
    pub path: String,
}

impl Default for PlaneConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_PLANE_HOST.to_string(),
            port: DEFAULT_PLANE_PORT,
            master_key: None,
            path: SYNC_PATH.to_string(),
        }
    }
}

impl PlaneConfig {
    /// Load from `SYNC_PLANE_HOST`, `SYNC_PLANE_PORT` and `SYNC_MASTER_KEY`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(host) = var("SYNC_PLANE_HOST") {
            config.host = host;
        }
        if let Some(port) = var("SYNC_PLANE_PORT") {
            config.port = port.parse().map_err(|_| ConfigError::Invalid {
                name: "SYNC_PLANE_PORT",
                value: port,
            })?;
        }
        config.master_key = var("SYNC_MASTER_KEY");

        Ok(config)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.host, self.port);
        raw.parse().map_err(|_| ConfigError::Invalid {
            name: "SYNC_PLANE_HOST",
            value: raw,
        })
    }
}

/// The embeddable sync plane: a room hub behind a WebSocket listener
pub struct SyncPlane {
    path: Arc<str>,
    hub: Arc<RoomHub>,
    metrics: Arc<RwLock<Metrics>>,
}

impl SyncPlane {
    pub fn new(config: &PlaneConfig, metrics: Arc<RwLock<Metrics>>) -> Self {
        if config.master_key.is_none() {
            warn!("No SYNC_MASTER_KEY configured: no connection will be granted master");
            metrics
                .write()
                .log(LogLevel::Warning, "No master key configured, rooms are read-only");
        }

        Self {
            path: Arc::from(config.path.as_str()),
            hub: Arc::new(RoomHub::new(config.master_key.clone(), Arc::clone(&metrics))),
            metrics,
        }
    }

    pub fn hub(&self) -> &Arc<RoomHub> {
        &self.hub
    }

    pub fn metrics(&self) -> &Arc<RwLock<Metrics>> {
        &self.metrics
    }

    /// Accept connections for as long as the task runs. Accept failures are
    /// logged and retried.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServeError> {
        let local = listener.local_addr()?;
        info!("Sync plane listening on ws://{}{}", local, self.path);

        {
            let mut m = self.metrics.write();
            m.bind_addr = Some(local.to_string());
            m.status = ServerStatus::Running;
            m.log(LogLevel::Info, format!("Listening on {}{}", local, self.path));
        }

        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) if is_connection_error(&e) => {
                    debug!("Accept aborted by peer: {}", e);
                    continue;
                }
                Err(e) => {
                    warn!("Accept failed: {}, retrying in {:?}", e, ACCEPT_RETRY_DELAY);
                    self.metrics
                        .write()
                        .log(LogLevel::Error, format!("Accept failed: {}", e));
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    continue;
                }
            };
            let path = Arc::clone(&self.path);
            let hub = Arc::clone(&self.hub);
            let metrics = Arc::clone(&self.metrics);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, path, hub, metrics).await {
                    debug!("Connection {} ended with error: {}", addr, e);
                }
            });
        }
    }
}

/// Failures that only concern the one connection being accepted
fn is_connection_error(e: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        e.kind(),
        ErrorKind::ConnectionRefused | ErrorKind::ConnectionAborted | ErrorKind::ConnectionReset
    )
}

/// Room membership that is released however the connection task ends
struct Membership {
    hub: Arc<RoomHub>,
    sub: Subscriber,
}

impl Drop for Membership {
    fn drop(&mut self) {
        self.hub.disconnect(&mut self.sub);
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    path: Arc<str>,
    hub: Arc<RoomHub>,
    metrics: Arc<RwLock<Metrics>>,
) -> Result<(), ServeError> {
    let check_path = |req: &Request, resp: Response| {
        if req.uri().path() == &*path {
            Ok(resp)
        } else {
            let mut err = ErrorResponse::new(Some("not found".to_string()));
            *err.status_mut() = StatusCode::NOT_FOUND;
            Err(err)
        }
    };

    let ws = match tokio_tungstenite::accept_hdr_async(stream, check_path).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!("Handshake with {} refused: {}", addr, e);
            return Ok(());
        }
    };
    let (mut sink, mut incoming) = ws.split();

    let peer = addr.to_string();
    info!("Client connected: {}", peer);
    metrics.write().connection_opened(&peer);

    let (outbox_tx, mut outbox_rx) = mpsc::channel::<Message>(OUTBOX_CAPACITY);
    let mut member = Membership {
        sub: hub.connect(outbox_tx),
        hub,
    };

    let result: Result<(), ServeError> = async {
        loop {
            tokio::select! {
                Some(message) = outbox_rx.recv() => {
                    sink.send(message).await?;
                }

                message = incoming.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = member.hub.handle_text(&mut member.sub, text.as_str()) {
                            sink.send(Message::text(serde_json::to_string(&reply)?)).await?;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(ServeError::from(e)),
                },
            }
        }
    }
    .await;

    drop(member);
    info!("Client disconnected: {}", peer);
    metrics.write().connection_closed(&peer);
    result
}

/// Run the network with dashboard integration
pub async fn run_with_dashboard(
    config: PlaneConfig,
    metrics: Arc<RwLock<Metrics>>,
    event_tx: mpsc::UnboundedSender<NetworkEvent>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("Sync plane starting...");

    let plane = SyncPlane::new(&config, Arc::clone(&metrics));
    let listener = match TcpListener::bind(config.bind_addr()?).await {
        Ok(listener) => listener,
        Err(e) => {
            let mut m = metrics.write();
            m.status = ServerStatus::Error;
            m.log(LogLevel::Error, format!("Bind failed: {}", e));
            let _ = event_tx.send(NetworkEvent::Failed(e.to_string()));
            return Err(e.into());
        }
    };

    let _ = event_tx.send(NetworkEvent::Ready {
        addr: listener.local_addr()?.to_string(),
    });

    if let Err(e) = plane.serve(listener).await {
        let mut m = metrics.write();
        m.status = ServerStatus::Error;
        m.log(LogLevel::Error, format!("Listener failed: {}", e));
        let _ = event_tx.send(NetworkEvent::Failed(e.to_string()));
        return Err(e.into());
    }
    Ok(())
}

/// Run with plain logging (no dashboard)
pub async fn run_with_logging(
    config: PlaneConfig,
    metrics: Arc<RwLock<Metrics>>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sync_plane=info".parse()?)
                .add_directive("tempo_core=info".parse()?),
        )
        .init();

    let (tx, _rx) = mpsc::unbounded_channel();
    tokio::select! {
        result = run_with_dashboard(config, metrics, tx) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = PlaneConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, PlaneConfig::default());
        assert_eq!(config.bind_addr().unwrap().to_string(), "0.0.0.0:8787");
        assert_eq!(config.path, "/sync");
    }

    #[test]
    fn test_config_overrides() {
        let config = PlaneConfig::from_lookup(lookup(&[
            ("SYNC_PLANE_HOST", "127.0.0.1"),
            ("SYNC_PLANE_PORT", "9000"),
            ("SYNC_MASTER_KEY", "s3cret"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr().unwrap().to_string(), "127.0.0.1:9000");
        assert_eq!(config.master_key.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_accept_errors_classified() {
        use std::io::{Error, ErrorKind};
        assert!(is_connection_error(&Error::from(ErrorKind::ConnectionAborted)));
        assert!(is_connection_error(&Error::from(ErrorKind::ConnectionReset)));
        // EMFILE and friends back off instead
        assert!(!is_connection_error(&Error::from_raw_os_error(24)));
        assert!(!is_connection_error(&Error::from(ErrorKind::OutOfMemory)));
    }

    #[test]
    fn test_config_bad_values() {
        assert!(PlaneConfig::from_lookup(lookup(&[("SYNC_PLANE_PORT", "99999")])).is_err());
        let config = PlaneConfig::from_lookup(lookup(&[("SYNC_PLANE_HOST", "not a host")])).unwrap();
        assert!(config.bind_addr().is_err());
    }
}
