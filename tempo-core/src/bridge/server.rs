//! Local listener for bridge subscribers
//!
//! One TCP port serves both the subscriber WebSocket on `/` and a plain HTTP
//! `GET /health` probe.

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::{Sink, SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::coordinator::CoordinatorHandle;
use super::BridgeError;
use crate::clock::LinkKind;
use crate::sync::{BridgeCommand, BridgeEvent};

/// Body of `GET /health`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub link: LinkKind,
}

impl HealthReport {
    pub fn ok(link: LinkKind) -> Self {
        Self { status: "ok", link }
    }
}

/// Routes for the bridge's local port
pub fn router(handle: CoordinatorHandle) -> Router {
    Router::new()
        .route("/", get(handle_websocket))
        .route("/health", get(handle_health))
        .fallback(handle_not_found)
        .with_state(handle)
}

/// Serve subscribers until the listener fails
pub async fn serve(listener: TcpListener, handle: CoordinatorHandle) -> Result<(), BridgeError> {
    info!("Sync bridge listening on {}", listener.local_addr()?);

    let app = router(handle).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app).await?;
    Ok(())
}

async fn handle_health(State(handle): State<CoordinatorHandle>) -> Json<HealthReport> {
    Json(HealthReport::ok(handle.link()))
}

async fn handle_not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": "not found"}))).into_response()
}

async fn handle_websocket(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(handle): State<CoordinatorHandle>,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        if let Err(e) = run_subscriber(socket, addr, handle).await {
            debug!("Subscriber {} ended with error: {}", addr, e);
        }
    })
}

/// Pump one subscriber: commands in, replies and broadcast events out
async fn run_subscriber(
    socket: WebSocket,
    addr: SocketAddr,
    handle: CoordinatorHandle,
) -> Result<(), BridgeError> {
    let (mut sink, mut incoming) = socket.split();
    info!("Subscriber connected: {}", addr);

    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<BridgeEvent>();
    let mut events = handle.subscribe();

    send_event(&mut sink, &BridgeEvent::Status(handle.status())).await?;

    loop {
        tokio::select! {
            message = incoming.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<BridgeCommand>(text.as_str()) {
                        Ok(command) => handle.submit(command, reply_tx.clone())?,
                        Err(e) => {
                            debug!("Bad command from {}: {}", addr, e);
                            send_event(&mut sink, &BridgeEvent::error(format!("invalid message: {e}"))).await?;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },

            Some(reply) = reply_rx.recv() => {
                send_event(&mut sink, &reply).await?;
            }

            event = events.recv() => match event {
                Ok(event) => send_event(&mut sink, &event).await?,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Subscriber {} lagged, skipped {} events", addr, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    info!("Subscriber disconnected: {}", addr);
    Ok(())
}

async fn send_event<S>(sink: &mut S, event: &BridgeEvent) -> Result<(), BridgeError>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let text = serde_json::to_string(event)?;
    sink.send(Message::Text(text.into())).await?;
    Ok(())
}
