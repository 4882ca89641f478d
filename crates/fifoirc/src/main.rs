//! fifoirc: relay a named pipe (and optionally a program) into an IRC channel.
//!
//! Run with: fifoirc -n mybot -c '#mychannel'
//!
//! Then `echo hello > ~/irc-pipe`.

mod cli;

use std::{future::Future, process::ExitCode};

use anyhow::{Context, Result};
use clap::Parser;
use fifoirc_core::BridgeConfig;
use fifoirc_executor::ProgramSpawner;
use fifoirc_session::{Session, SessionError};
use fifoirc_transport::{FifoPipe, TcpConnector};
use tokio::signal::unix::{SignalKind, signal};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Cli;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let config = Cli::parse().into_config();
    init_tracing(config.verbosity);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // The session logs its own fatal error on the way out.
            if e.downcast_ref::<SessionError>().is_none() {
                tracing::error!("{e:#}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(config: BridgeConfig) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let pipe = FifoPipe::new(&config.pipe_path, config.pipe_mode);
    pipe.prepare()
        .with_context(|| format!("Failed to prepare {}", config.pipe_path.display()))?;

    let mut session = Session::new(&config, TcpConnector::new()).with_pipe(pipe);
    if let Some(command_line) = &config.program {
        let spawner = ProgramSpawner::new(command_line).context("Invalid program command line")?;
        session = session.with_program(spawner);
    }

    let shutdown = shutdown_signal()?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        channel = %config.channel,
        pipe = %config.pipe_path.display(),
        "Starting bridge"
    );
    session.run(shutdown).await?;
    Ok(())
}

// RUST_LOG takes precedence over -v.
fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,fifoirc={level}")));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Install the handlers now; the returned future resolves on interrupt,
/// terminate or hangup.
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    let mut interrupt =
        signal(SignalKind::interrupt()).context("Failed to install interrupt handler")?;
    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install terminate handler")?;
    let mut hangup = signal(SignalKind::hangup()).context("Failed to install hangup handler")?;

    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => {}
            _ = terminate.recv() => {}
            _ = hangup.recv() => {}
        }
        tracing::info!("Received termination signal");
    })
}
