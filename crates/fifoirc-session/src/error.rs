//! Session errors.

use std::io;

use fifoirc_core::{ExecutorError, PipeError, TransportError};

/// Session error. Every variant ends the run with a failure status.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Pipe(#[from] PipeError),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    #[error("disconnection from {0}")]
    Disconnected(String),
    #[error("registering with {host}: {source}")]
    Handshake { host: String, source: io::Error },
}
