//! Core abstractions for the fifoirc bridge.
//!
//! This crate provides the fundamental building blocks:
//! - `BridgeConfig` - The static configuration record
//! - `Connector`, `PipeOpener`, `Spawner` - Seams for the remote connection,
//!   the local pipe and the external program

pub mod config;
pub mod traits;

pub use config::{BridgeConfig, ConfigError, Identity};
pub use traits::{
    BoxedReader, BoxedWriter, Connector, Duplex, ExecutorError, PipeError, PipeOpener, Spawner,
    TransportError,
};
