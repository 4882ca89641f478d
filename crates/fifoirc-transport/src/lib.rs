//! Wire codec and byte-stream transports for the fifoirc bridge.
//!
//! Provides:
//! - Protocol codec (`Frame` out, `IncomingEvent` in)
//! - `LineBuffer` - resumable per-source line framing
//! - `TcpConnector` - the remote connection
//! - `FifoPipe` - the local named pipe

pub mod fifo;
pub mod framer;
pub mod protocol;
pub mod tcp;

pub use fifo::FifoPipe;
pub use framer::LineBuffer;
pub use protocol::{Frame, IncomingEvent};
pub use tcp::TcpConnector;
