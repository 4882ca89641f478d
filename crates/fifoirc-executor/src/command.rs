//! Command line parsing for the external program.

use std::path::PathBuf;

use thiserror::Error;

use crate::shell::resolve_executable_path;

/// Command build error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandBuildError {
    #[error("Base command cannot be parsed: {0}")]
    InvalidBase(String),
    #[error("Base command is empty after parsing")]
    EmptyCommand,
    #[error("Executable not found: {0}")]
    NotFound(String),
}

/// Parsed command parts (program + args).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandParts {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandParts {
    /// Create new command parts.
    #[must_use]
    pub const fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }

    /// Split a shell-style command line such as `bot --reply 'two words'`.
    ///
    /// # Errors
    /// Returns error if the line has unbalanced quotes or names no program.
    pub fn parse(command_line: &str) -> Result<Self, CommandBuildError> {
        let mut parts = shlex::split(command_line)
            .ok_or_else(|| CommandBuildError::InvalidBase(command_line.to_string()))?;
        if parts.is_empty() {
            return Err(CommandBuildError::EmptyCommand);
        }
        let program = parts.remove(0);
        Ok(Self::new(program, parts))
    }

    /// Resolve the program to an absolute path.
    ///
    /// # Errors
    /// Returns error if executable not found.
    pub async fn resolve(&self) -> Result<PathBuf, CommandBuildError> {
        resolve_executable_path(&self.program)
            .await
            .ok_or_else(|| CommandBuildError::NotFound(self.program.clone()))
    }
}

impl std::fmt::Display for CommandParts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined = shlex::try_join(
            std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str)),
        )
        .map_err(|_| std::fmt::Error)?;
        f.write_str(&joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_splits_quoted_args() {
        let parts = CommandParts::parse("bot --greeting 'hello there' -v").unwrap();
        assert_eq!(parts.program, "bot");
        assert_eq!(parts.args, vec!["--greeting", "hello there", "-v"]);
        assert_eq!(parts.to_string(), "bot --greeting 'hello there' -v");
    }

    #[test]
    fn test_parse_rejects_empty_and_unbalanced() {
        assert_eq!(CommandParts::parse("   "), Err(CommandBuildError::EmptyCommand));
        assert!(matches!(
            CommandParts::parse("bot 'unterminated"),
            Err(CommandBuildError::InvalidBase(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve() {
        let found = CommandParts::parse("sh -c true").unwrap().resolve().await.unwrap();
        assert!(found.is_absolute());

        let missing = CommandParts::parse("definitely-not-a-real-program-fifoirc")
            .unwrap()
            .resolve()
            .await;
        assert!(matches!(missing, Err(CommandBuildError::NotFound(_))));
    }
}
