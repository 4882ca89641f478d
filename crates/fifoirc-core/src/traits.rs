//! Seams between the session and the outside world.
//!
//! The session never touches sockets, pipes or processes directly. It asks a
//! [`Connector`], a [`PipeOpener`] and a [`Spawner`] for byte streams and
//! owns whatever they hand back.

use std::{io, path::PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

/// Boxed read half of a byte stream.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed write half of a byte stream.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A readable and writable byte stream, split into halves.
pub struct Duplex {
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
}

impl Duplex {
    /// Wrap two independent halves.
    #[must_use]
    pub fn new(
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    /// Split a single bidirectional stream.
    #[must_use]
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(reader, writer)
    }
}

impl std::fmt::Debug for Duplex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Duplex").finish_non_exhaustive()
    }
}

/// Transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("resolving {host}: {source}")]
    Resolve { host: String, source: io::Error },
    #[error("resolving {0}: no usable address")]
    NoAddress(String),
    #[error("connecting to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        source: io::Error,
    },
}

/// Opens the connection to the remote server.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a fresh connection. Called again for every reconnect.
    async fn connect(&self, host: &str, port: u16) -> Result<Duplex, TransportError>;
}

/// Named pipe error.
#[derive(Debug, Error)]
pub enum PipeError {
    #[error("{}: exists and is not a fifo", .0.display())]
    NotAFifo(PathBuf),
    #[error("mkfifo {}: {source}", path.display())]
    Create { path: PathBuf, source: io::Error },
    #[error("chmod {}: {source}", path.display())]
    Permissions { path: PathBuf, source: io::Error },
    #[error("open {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },
}

/// Provides the local pipe as a readable stream.
#[async_trait]
pub trait PipeOpener: Send + Sync {
    /// Open (or re-open after end-of-stream) the pipe for reading.
    async fn open(&self) -> Result<BoxedReader, PipeError>;
}

/// Executor error.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),
    #[error("Executable not found: {0}")]
    ExecutableNotFound(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Command build error: {0}")]
    CommandBuild(String),
}

/// Runs the external program and hands back its stdin/stdout.
#[async_trait]
pub trait Spawner: Send {
    /// Start the program, replacing any instance started earlier.
    async fn spawn(&mut self) -> Result<Duplex, ExecutorError>;

    /// Stop the running instance, if any.
    async fn shutdown(&mut self);
}
