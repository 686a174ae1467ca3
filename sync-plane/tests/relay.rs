//! Bridges relaying tempo through a live sync plane

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use sync_plane::{Metrics, PlaneConfig, SyncPlane};
use tempo_core::bridge::CoordinatorHandle;
use tempo_core::config::BridgeConfig;
use tempo_core::sync::{BridgeCommand, BridgeEvent, RelayStatus};
use tempo_core::{Role, SyncMode, TransportState, VirtualClock};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

const KEY: &str = "s3cret";
const WAIT: Duration = Duration::from_secs(5);

async fn start_plane() -> (SocketAddr, Arc<SyncPlane>) {
    let config = PlaneConfig {
        master_key: Some(KEY.to_string()),
        ..PlaneConfig::default()
    };
    let plane = Arc::new(SyncPlane::new(&config, Arc::new(RwLock::new(Metrics::new()))));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let serving = Arc::clone(&plane);
    tokio::spawn(async move { serving.serve(listener).await });
    (addr, plane)
}

struct Bridge {
    handle: CoordinatorHandle,
    events: broadcast::Receiver<BridgeEvent>,
    replies: mpsc::UnboundedReceiver<BridgeEvent>,
    reply_tx: mpsc::UnboundedSender<BridgeEvent>,
}

impl Bridge {
    fn start() -> Self {
        let (handle, _task) = CoordinatorHandle::spawn(Box::new(VirtualClock::default()), BridgeConfig::default());
        let events = handle.subscribe();
        let (reply_tx, replies) = mpsc::unbounded_channel();
        Self {
            handle,
            events,
            replies,
            reply_tx,
        }
    }

    fn submit(&self, command: BridgeCommand) {
        self.handle.submit(command, self.reply_tx.clone()).unwrap();
    }

    fn join_wan(&self, addr: SocketAddr, role: Role, key: Option<&str>) {
        self.submit(BridgeCommand::Configure {
            room: "studio-1".to_string(),
            role,
            mode: SyncMode::LinkWan,
            relay_url: Some(format!("ws://{addr}/sync")),
            master_key: key.map(str::to_string),
        });
    }

    /// Wait for a broadcast event matching `pred`
    async fn wait_for(&mut self, pred: impl Fn(&BridgeEvent) -> bool) -> BridgeEvent {
        timeout(WAIT, async {
            loop {
                match self.events.recv().await {
                    Ok(event) if pred(&event) => return event,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => panic!("coordinator stopped"),
                }
            }
        })
        .await
        .expect("timed out waiting for bridge event")
    }
}

#[tokio::test]
async fn test_master_tempo_reaches_remote_peer() {
    let (addr, plane) = start_plane().await;

    let mut master = Bridge::start();
    master.join_wan(addr, Role::Master, Some(KEY));
    master
        .wait_for(|e| matches!(e, BridgeEvent::Status(s) if s.is_master && s.relay == RelayStatus::Connected))
        .await;

    let mut peer = Bridge::start();
    peer.join_wan(addr, Role::Peer, None);
    peer.wait_for(|e| matches!(e, BridgeEvent::Status(s) if s.relay == RelayStatus::Connected))
        .await;

    master.submit(BridgeCommand::Set {
        tempo: Some(133.0),
        quantum: None,
        transport: Some(TransportState::Playing),
    });

    let event = peer
        .wait_for(|e| {
            matches!(e, BridgeEvent::State(s)
                if s.tempo == 133.0 && s.transport == TransportState::Playing)
        })
        .await;
    let BridgeEvent::State(first) = event else { unreachable!() };
    assert_eq!(first.mode, SyncMode::LinkWan);
    assert_eq!(first.role, Role::Peer);
    assert!(first.phase >= 0.0 && first.phase < first.quantum as f64);

    // Extrapolation keeps the peer's beat moving between broadcasts
    let event = peer
        .wait_for(|e| matches!(e, BridgeEvent::State(s) if s.beat > first.beat))
        .await;
    let BridgeEvent::State(later) = event else { unreachable!() };
    assert_eq!(later.tempo, 133.0);

    assert_eq!(plane.hub().member_count("studio-1"), 2);
    assert!(plane.metrics().read().broadcasts > 0);
}

#[tokio::test]
async fn test_master_without_key_is_told() {
    let (addr, plane) = start_plane().await;

    let mut master = Bridge::start();
    master.join_wan(addr, Role::Master, Some("wrong"));

    let event = master
        .wait_for(|e| matches!(e, BridgeEvent::Error { .. }))
        .await;
    let BridgeEvent::Error { message } = event else { unreachable!() };
    assert!(message.contains("master"));
    assert!(!master.handle.status().is_master);

    // Nothing refused-master bridges publish ever makes it to the room
    master.submit(BridgeCommand::Set {
        tempo: Some(99.0),
        quantum: None,
        transport: Some(TransportState::Playing),
    });
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(plane.metrics().read().broadcasts, 0);
}

#[tokio::test]
async fn test_local_ping_answered_while_relayed() {
    let (addr, _plane) = start_plane().await;

    let mut bridge = Bridge::start();
    bridge.join_wan(addr, Role::Peer, None);
    bridge
        .wait_for(|e| matches!(e, BridgeEvent::Status(s) if s.relay == RelayStatus::Connected))
        .await;

    bridge.submit(BridgeCommand::Ping {
        sent_at: serde_json::Number::from(42u64),
    });
    let reply = timeout(WAIT, bridge.replies.recv()).await.unwrap().unwrap();
    match reply {
        BridgeEvent::Pong { sent_at, .. } => assert_eq!(sent_at.as_u64(), Some(42)),
        other => panic!("expected pong, got {other:?}"),
    }
}

#[tokio::test]
async fn test_relay_pong_fills_latency() {
    let (addr, _plane) = start_plane().await;

    let mut bridge = Bridge::start();
    bridge.join_wan(addr, Role::Peer, None);

    let event = bridge
        .wait_for(|e| matches!(e, BridgeEvent::Status(s) if s.latency_ms.is_some()))
        .await;
    let BridgeEvent::Status(status) = event else { unreachable!() };
    assert_eq!(status.relay, RelayStatus::Connected);
    // Loopback round trips are well under a second
    assert!(status.latency_ms.unwrap() < 1000);
    assert_eq!(bridge.handle.status().latency_ms, status.latency_ms);
}
