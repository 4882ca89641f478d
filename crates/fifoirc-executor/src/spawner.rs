//! Spawns the external program as a duplex byte stream.

use std::process::Stdio;

use async_trait::async_trait;
use command_group::{AsyncCommandGroup, AsyncGroupChild};
use fifoirc_core::{Duplex, ExecutorError, Spawner};
use tokio::process::Command;

use crate::command::{CommandBuildError, CommandParts};

/// Runs the configured program in its own process group with stdin and
/// stdout piped to the bridge. Stderr is inherited.
pub struct ProgramSpawner {
    command: CommandParts,
    child: Option<AsyncGroupChild>,
}

impl ProgramSpawner {
    /// Prepare a spawner for a shell-style command line.
    ///
    /// # Errors
    /// Returns error if the command line cannot be parsed.
    pub fn new(command_line: &str) -> Result<Self, ExecutorError> {
        let command = CommandParts::parse(command_line)
            .map_err(|e| ExecutorError::CommandBuild(e.to_string()))?;
        Ok(Self {
            command,
            child: None,
        })
    }

    /// Process id of the running instance, if any.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().and_then(AsyncGroupChild::id)
    }
}

impl std::fmt::Debug for ProgramSpawner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgramSpawner")
            .field("command", &self.command)
            .field("pid", &self.id())
            .finish()
    }
}

#[async_trait]
impl Spawner for ProgramSpawner {
    async fn spawn(&mut self) -> Result<Duplex, ExecutorError> {
        self.shutdown().await;

        let executable = self.command.resolve().await.map_err(|e| match e {
            CommandBuildError::NotFound(program) => ExecutorError::ExecutableNotFound(program),
            other => ExecutorError::CommandBuild(other.to_string()),
        })?;

        let mut child = Command::new(&executable)
            .args(&self.command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .group_spawn()
            .map_err(|e| ExecutorError::SpawnFailed(format!("{}: {e}", executable.display())))?;

        let stdin = child.inner().stdin.take();
        let stdout = child.inner().stdout.take();
        let (Some(stdin), Some(stdout)) = (stdin, stdout) else {
            if let Err(e) = child.start_kill() {
                tracing::debug!("Failed to kill half-spawned program: {e}");
            }
            return Err(ExecutorError::SpawnFailed(
                "program stdio was not captured".to_string(),
            ));
        };

        tracing::info!(
            program = %self.command,
            pid = ?child.id(),
            "Spawned program"
        );
        self.child = Some(child);
        Ok(Duplex::new(stdout, stdin))
    }

    async fn shutdown(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if let Err(e) = child.start_kill() {
            tracing::debug!("Program already gone: {e}");
        }
        match child.wait().await {
            Ok(status) => tracing::debug!(%status, "Program exited"),
            Err(e) => tracing::warn!("Failed to reap program: {e}"),
        }
    }
}
