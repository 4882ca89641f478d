//! Bridge configuration.

use std::path::PathBuf;

use thiserror::Error;

/// Server used when none is given.
pub const DEFAULT_SERVER: &str = "irc.freenode.net";

/// Port used when none is given.
pub const DEFAULT_PORT: u16 = 6667;

/// Channel joined when none is given.
pub const DEFAULT_CHANNEL: &str = "#maximilian";

/// File name of the pipe inside the home directory.
pub const DEFAULT_PIPE_NAME: &str = "irc-pipe";

/// Permission bits applied to the pipe (owner read/write/execute).
pub const DEFAULT_PIPE_MODE: u32 = 0o700;

/// Longest channel name accepted.
pub const MAX_CHANNEL_LEN: usize = 200;

/// Configuration error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no nickname specified")]
    MissingNickname,
    #[error("{0}: channels must be at most {MAX_CHANNEL_LEN} characters")]
    ChannelTooLong(String),
    #[error("invalid {field}: {value:?} contains whitespace or control characters")]
    InvalidToken { field: &'static str, value: String },
    #[error("invalid pipe mode {0:#o}")]
    InvalidMode(u32),
}

/// Remote identity presented during the connect handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Nickname registered with the server.
    pub nickname: String,
    /// Display name sent in the presence announcement.
    pub display_name: String,
    /// Secret forwarded once to the account service, if any.
    pub secret: Option<String>,
}

/// Static configuration consumed by the session at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Remote host name or address.
    pub host: String,
    /// Remote port.
    pub port: u16,
    /// Who we are on the remote side.
    pub identity: Identity,
    /// Channel (or nickname) that local lines are addressed to.
    pub channel: String,
    /// Re-run the connect handshake when the connection is lost.
    pub reconnect: bool,
    /// Shell-style command line for the external program.
    pub program: Option<String>,
    /// Path of the named pipe.
    pub pipe_path: PathBuf,
    /// Permission bits applied to the named pipe.
    pub pipe_mode: u32,
    /// Number of `-v` flags given.
    pub verbosity: u8,
}

impl BridgeConfig {
    /// Create a configuration with defaults for everything but the nickname.
    #[must_use]
    pub fn new(nickname: impl Into<String>) -> Self {
        let nickname = nickname.into();
        Self {
            host: DEFAULT_SERVER.to_string(),
            port: DEFAULT_PORT,
            identity: Identity {
                display_name: nickname.clone(),
                nickname,
                secret: None,
            },
            channel: DEFAULT_CHANNEL.to_string(),
            reconnect: false,
            program: None,
            pipe_path: default_pipe_path(),
            pipe_mode: DEFAULT_PIPE_MODE,
            verbosity: 0,
        }
    }

    /// Check the record before anything is opened.
    ///
    /// # Errors
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.identity.nickname.is_empty() {
            return Err(ConfigError::MissingNickname);
        }
        check_token("nickname", &self.identity.nickname)?;
        check_token("channel", &self.channel)?;
        if self.channel.len() > MAX_CHANNEL_LEN {
            return Err(ConfigError::ChannelTooLong(self.channel.clone()));
        }
        if self.pipe_mode & !0o7777 != 0 {
            return Err(ConfigError::InvalidMode(self.pipe_mode));
        }
        Ok(())
    }
}

/// `$HOME/irc-pipe`, or `/tmp/irc-pipe` when there is no home directory.
#[must_use]
pub fn default_pipe_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(DEFAULT_PIPE_NAME)
}

// Nicknames and channels end up as bare protocol parameters.
fn check_token(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() || value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ConfigError::InvalidToken {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::new("bot");
        assert_eq!(config.host, "irc.freenode.net");
        assert_eq!(config.port, 6667);
        assert_eq!(config.channel, "#maximilian");
        assert_eq!(config.identity.display_name, "bot");
        assert!(config.identity.secret.is_none());
        assert!(!config.reconnect);
        assert_eq!(config.pipe_mode, 0o700);
        assert!(config.pipe_path.ends_with("irc-pipe"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_channel_length_limit() {
        let mut config = BridgeConfig::new("bot");
        config.channel = format!("#{}", "a".repeat(199));
        assert!(config.validate().is_ok());

        config.channel.push('a');
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ChannelTooLong(_))
        ));
    }

    #[test]
    fn test_rejects_bad_tokens() {
        let mut config = BridgeConfig::new("");
        assert_eq!(config.validate(), Err(ConfigError::MissingNickname));

        config.identity.nickname = "two words".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidToken { field: "nickname", .. })
        ));

        config.identity.nickname = "bot".to_string();
        config.channel = "#chan\r\nQUIT".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidToken { field: "channel", .. })
        ));
    }

    #[test]
    fn test_rejects_mode_outside_permission_bits() {
        let mut config = BridgeConfig::new("bot");
        config.pipe_mode = 0o10_000;
        assert_eq!(config.validate(), Err(ConfigError::InvalidMode(0o10_000)));
    }
}
