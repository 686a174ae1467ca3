//! Sync Model
//!
//! Clock state shared between peers and the JSON messages that carry it.

mod protocol;
mod state;

pub use protocol::*;
pub use state::*;
