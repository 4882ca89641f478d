//! The bridge event loop.

use std::{future::Future, io, time::Duration};

use bytes::Bytes;
use fifoirc_core::{BridgeConfig, Connector, PipeOpener, Spawner};
use fifoirc_transport::protocol::{escape, strip_terminator};
use tokio::{
    sync::mpsc::error::TrySendError,
    time::{Instant, sleep},
};

use crate::{
    SessionError,
    manager::ConnectionManager,
    router::{Reaction, Router},
    source::{LocalSource, fill_source},
};

/// Longest the loop waits with no source ready before pinging the server.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(600);

/// A program that dies sooner than this after starting is respawned only
/// after waiting this long.
pub const RESPAWN_BACKOFF: Duration = Duration::from_secs(1);

/// Why the loop woke up.
enum Wake {
    Shutdown,
    Timeout,
    Remote(io::Result<usize>),
    Pipe(io::Result<usize>),
    Program(io::Result<usize>),
}

/// One bridge run: the remote connection, the router and the local sources.
pub struct Session<C>
where
    C: Connector,
{
    remote: ConnectionManager<C>,
    router: Router,
    pipe_opener: Option<Box<dyn PipeOpener>>,
    spawner: Option<Box<dyn Spawner>>,
    pipe: Option<LocalSource>,
    program: Option<LocalSource>,
    last_spawn: Option<Instant>,
}

impl<C> Session<C>
where
    C: Connector,
{
    /// Create a session that talks to the server through `connector`.
    #[must_use]
    pub fn new(config: &BridgeConfig, connector: C) -> Self {
        Self {
            remote: ConnectionManager::new(config, connector),
            router: Router::new(config.channel.clone(), false),
            pipe_opener: None,
            spawner: None,
            pipe: None,
            program: None,
            last_spawn: None,
        }
    }

    /// Read local lines from a named pipe.
    #[must_use]
    pub fn with_pipe(mut self, opener: impl PipeOpener + 'static) -> Self {
        self.pipe_opener = Some(Box::new(opener));
        self
    }

    /// Bridge an external program: its output goes to the channel and
    /// messages seen on the server are written to its input.
    #[must_use]
    pub fn with_program(mut self, spawner: impl Spawner + 'static) -> Self {
        self.spawner = Some(Box::new(spawner));
        self.router = Router::new(self.router.target(), true);
        self
    }

    /// Run until `shutdown` resolves or a fatal error occurs.
    ///
    /// On shutdown the server is sent `QUIT` and the program is stopped.
    ///
    /// # Errors
    /// Returns the fatal error that ended the run.
    pub async fn run<F>(mut self, shutdown: F) -> Result<(), SessionError>
    where
        F: Future<Output = ()>,
    {
        let result = self.serve(shutdown).await;
        match &result {
            Ok(()) => tracing::info!("Shutting down"),
            Err(e) => tracing::error!("{e}"),
        }

        self.remote.quit().await;
        if let Some(spawner) = self.spawner.as_mut() {
            spawner.shutdown().await;
        }
        result
    }

    // Startup and every dispatch are abandoned as soon as `shutdown` resolves.
    async fn serve<F>(&mut self, shutdown: F) -> Result<(), SessionError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        tokio::select! {
            () = shutdown.as_mut() => return Ok(()),
            started = self.start() => started?,
        }

        loop {
            let wake = tokio::select! {
                () = shutdown.as_mut() => Wake::Shutdown,
                read = self.remote.fill() => Wake::Remote(read),
                read = fill_source(self.pipe.as_mut()) => Wake::Pipe(read),
                read = fill_source(self.program.as_mut()) => Wake::Program(read),
                () = sleep(WAIT_TIMEOUT) => Wake::Timeout,
            };
            if matches!(wake, Wake::Shutdown) {
                return Ok(());
            }

            tokio::select! {
                () = shutdown.as_mut() => return Ok(()),
                handled = self.dispatch(wake) => handled?,
            }
        }
    }

    async fn start(&mut self) -> Result<(), SessionError> {
        self.open_pipe().await?;
        self.spawn_program().await?;
        self.remote.connect().await
    }

    async fn dispatch(&mut self, wake: Wake) -> Result<(), SessionError> {
        match wake {
            Wake::Shutdown => {}
            Wake::Timeout => {
                self.remote.check_idle().await?;
                self.remote.keepalive().await?;
            }
            Wake::Remote(Ok(0)) => {
                tracing::warn!(host = %self.remote.host(), "Server closed the connection");
                self.remote.on_disconnect().await?;
            }
            Wake::Remote(Ok(_)) => self.drain_remote().await?,
            Wake::Remote(Err(e)) => {
                tracing::warn!(host = %self.remote.host(), "Read from server failed: {e}");
                self.remote.on_disconnect().await?;
            }
            Wake::Pipe(Ok(n)) => {
                self.drain_pipe(n == 0).await?;
                if n == 0 {
                    tracing::info!("Pipe writer closed, reopening");
                    self.open_pipe().await?;
                }
            }
            Wake::Pipe(Err(e)) => {
                tracing::info!("Read from pipe failed, reopening: {e}");
                self.open_pipe().await?;
            }
            Wake::Program(Ok(n)) => {
                self.drain_program(n == 0).await?;
                if n == 0 {
                    tracing::info!("Program closed its output, respawning");
                    self.respawn_program().await?;
                }
            }
            Wake::Program(Err(e)) => {
                tracing::info!("Read from program failed, respawning: {e}");
                self.respawn_program().await?;
            }
        }
        Ok(())
    }

    async fn drain_remote(&mut self) -> Result<(), SessionError> {
        while let Some(line) = self.remote.next_line() {
            tracing::debug!(target: "fifoirc::wire", "< {}", escape(strip_terminator(&line)));
            for reaction in self.router.incoming(&line) {
                match reaction {
                    Reaction::Reply(frame) => self.remote.send(&frame).await?,
                    Reaction::Forward(data) => self.forward(data).await?,
                }
            }
        }
        Ok(())
    }

    async fn drain_pipe(&mut self, eof: bool) -> Result<(), SessionError> {
        let lines = Self::take_lines(self.pipe.as_mut(), eof);
        self.relay(lines).await
    }

    async fn drain_program(&mut self, eof: bool) -> Result<(), SessionError> {
        let lines = Self::take_lines(self.program.as_mut(), eof);
        self.relay(lines).await
    }

    fn take_lines(source: Option<&mut LocalSource>, eof: bool) -> Vec<Bytes> {
        let Some(source) = source else {
            return Vec::new();
        };
        let mut lines = Vec::new();
        while let Some(line) = source.next_line() {
            lines.push(line);
        }
        if eof {
            lines.extend(source.finish());
        }
        lines
    }

    async fn relay(&mut self, lines: Vec<Bytes>) -> Result<(), SessionError> {
        for line in lines {
            if let Some(frame) = self.router.outgoing(&line) {
                self.remote.send(&frame).await?;
            }
        }
        Ok(())
    }

    async fn forward(&mut self, data: Vec<u8>) -> Result<(), SessionError> {
        let Some(program) = self.program.as_ref() else {
            return Ok(());
        };
        match program.try_write(Bytes::from(data)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Program is not reading its input, dropping a message");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::info!("Program input closed, respawning");
                self.respawn_program().await?;
            }
        }
        Ok(())
    }

    async fn open_pipe(&mut self) -> Result<(), SessionError> {
        self.pipe = None;
        if let Some(opener) = self.pipe_opener.as_ref() {
            let reader = opener.open().await?;
            self.pipe = Some(LocalSource::reader(reader));
        }
        Ok(())
    }

    async fn spawn_program(&mut self) -> Result<(), SessionError> {
        self.program = None;
        if let Some(spawner) = self.spawner.as_mut() {
            let duplex = spawner.spawn().await?;
            self.program = Some(LocalSource::duplex(duplex));
            self.last_spawn = Some(Instant::now());
        }
        Ok(())
    }

    async fn respawn_program(&mut self) -> Result<(), SessionError> {
        self.program = None;
        if self
            .last_spawn
            .is_some_and(|spawned| spawned.elapsed() < RESPAWN_BACKOFF)
        {
            tracing::warn!(
                "Program exited right after starting, respawning in {}s",
                RESPAWN_BACKOFF.as_secs()
            );
            sleep(RESPAWN_BACKOFF).await;
        }
        self.spawn_program().await
    }
}

impl<C> std::fmt::Debug for Session<C>
where
    C: Connector,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.remote.state())
            .field("router", &self.router)
            .field("pipe", &self.pipe)
            .field("program", &self.program)
            .finish_non_exhaustive()
    }
}
