//! Sync Plane
//!
//! Room-scoped broadcast hub for shared tempo state. Clients join a room,
//! the room master publishes state, and every member receives it. Embed
//! [`SyncPlane`] in another process or run the `sync-plane` binary.

pub mod dashboard;
pub mod hub;
pub mod metrics;
pub mod network;

pub use hub::{PlaneError, RoomHub, Subscriber};
pub use metrics::Metrics;
pub use network::{PlaneConfig, ServeError, SyncPlane};
