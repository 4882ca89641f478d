//! External program support for the fifoirc bridge.
//!
//! Provides:
//! - Command line parsing and executable lookup
//! - `ProgramSpawner` - runs the program as a duplex byte stream

pub mod command;
pub mod shell;
pub mod spawner;

pub use command::{CommandBuildError, CommandParts};
pub use shell::resolve_executable_path;
pub use spawner::ProgramSpawner;
