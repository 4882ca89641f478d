//! Connection lifecycle, message routing and the event loop of the bridge.
//!
//! Provides:
//! - `ConnectionManager` - handshake, idle detection, reconnect, quit
//! - `Router` - local lines to frames, remote lines to reactions
//! - `Session` - the single-task readiness loop tying it together

pub mod error;
pub mod manager;
pub mod router;
pub mod session;
pub mod source;

pub use error::SessionError;
pub use manager::{ConnectionManager, ConnectionState, IDLE_TIMEOUT, QUIT_TIMEOUT};
pub use router::{Reaction, Router};
pub use session::{RESPAWN_BACKOFF, Session, WAIT_TIMEOUT};
pub use source::{INPUT_QUEUE, LocalSource};
