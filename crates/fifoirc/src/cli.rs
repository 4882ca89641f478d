//! Command-line options.

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use fifoirc_core::{
    BridgeConfig,
    config::{DEFAULT_CHANNEL, DEFAULT_PORT, DEFAULT_SERVER, default_pipe_path},
};

/// Relay lines written to a named pipe (or printed by a program) into an IRC
/// channel.
#[derive(Parser, Debug)]
#[command(name = "fifoirc", version, about)]
pub struct Cli {
    /// Channel to join and send to.
    #[arg(short, long, default_value = DEFAULT_CHANNEL)]
    pub channel: String,

    /// Path of the named pipe [default: $HOME/irc-pipe].
    #[arg(short = 'f', long = "fifo", value_name = "PATH")]
    pub fifo: Option<PathBuf>,

    /// Display name announced to the server [default: the nickname].
    #[arg(short = 'F', long = "fullname", value_name = "NAME")]
    pub full_name: Option<String>,

    /// Nickname to register.
    #[arg(short, long)]
    pub nickname: String,

    /// Server port.
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Password sent to NickServ after registering.
    #[arg(short = 'P', long, env = "FIFOIRC_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Reconnect instead of exiting when the server goes away.
    #[arg(short, long)]
    pub reconnect: bool,

    /// Server host name.
    #[arg(short, long, default_value = DEFAULT_SERVER)]
    pub server: String,

    /// More output; repeat for wire-level logging.
    #[arg(short, action = ArgAction::Count)]
    pub verbose: u8,

    /// Program whose output is relayed and which receives channel messages.
    #[arg(short, long = "exec", value_name = "COMMAND")]
    pub exec: Option<String>,

    /// Permission bits of the named pipe, in octal.
    #[arg(short, long, value_name = "OCTAL", default_value = "700", value_parser = parse_mode)]
    pub mode: u32,
}

impl Cli {
    /// Turn the options into a bridge configuration.
    #[must_use]
    pub fn into_config(self) -> BridgeConfig {
        let mut config = BridgeConfig::new(self.nickname);
        if let Some(full_name) = self.full_name {
            config.identity.display_name = full_name;
        }
        config.identity.secret = self.password.filter(|p| !p.is_empty());
        config.host = self.server;
        config.port = self.port;
        config.channel = self.channel;
        config.reconnect = self.reconnect;
        config.program = self.exec;
        config.pipe_path = self.fifo.unwrap_or_else(default_pipe_path);
        config.pipe_mode = self.mode;
        config.verbosity = self.verbose;
        config
    }
}

fn parse_mode(value: &str) -> Result<u32, String> {
    let digits = value.strip_prefix("0o").unwrap_or(value);
    let mode = u32::from_str_radix(digits, 8).map_err(|e| format!("{value:?}: {e}"))?;
    if mode > 0o7777 {
        return Err(format!("{value:?}: more than 12 permission bits"));
    }
    Ok(mode)
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("fifoirc").chain(args.iter().copied()))
    }

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["-n", "bot"]).unwrap().into_config();
        assert_eq!(config.host, "irc.freenode.net");
        assert_eq!(config.port, 6667);
        assert_eq!(config.channel, "#maximilian");
        assert_eq!(config.identity.nickname, "bot");
        assert_eq!(config.identity.display_name, "bot");
        assert!(!config.reconnect);
        assert!(config.program.is_none());
        assert_eq!(config.pipe_path, default_pipe_path());
        assert_eq!(config.pipe_mode, 0o700);
        assert_eq!(config.verbosity, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_all_flags() {
        let config = parse(&[
            "-c", "#ops", "-f", "/tmp/x", "-F", "Relay Bot", "-n", "relay", "-p", "6697", "-P",
            "s3cret", "-r", "-s", "irc.example.net", "-vv", "-e", "bot --quiet", "-m", "0o640",
        ])
        .unwrap()
        .into_config();

        assert_eq!(config.channel, "#ops");
        assert_eq!(config.pipe_path, PathBuf::from("/tmp/x"));
        assert_eq!(config.identity.display_name, "Relay Bot");
        assert_eq!(config.identity.nickname, "relay");
        assert_eq!(config.port, 6697);
        assert_eq!(config.identity.secret.as_deref(), Some("s3cret"));
        assert!(config.reconnect);
        assert_eq!(config.host, "irc.example.net");
        assert_eq!(config.verbosity, 2);
        assert_eq!(config.program.as_deref(), Some("bot --quiet"));
        assert_eq!(config.pipe_mode, 0o640);
    }

    #[test]
    fn test_nickname_is_required() {
        let err = parse(&["-c", "#ops"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(parse_mode("600"), Ok(0o600));
        assert_eq!(parse_mode("0o755"), Ok(0o755));
        assert!(parse_mode("9").is_err());
        assert!(parse_mode("17777").is_err());
        assert!(parse(&["-n", "bot", "-m", "rw"]).is_err());
    }

    #[test]
    fn test_long_channel_fails_validation() {
        let channel = format!("#{}", "x".repeat(200));
        let config = parse(&["-n", "bot", "-c", &channel]).unwrap().into_config();
        assert!(config.validate().is_err());
    }
}
