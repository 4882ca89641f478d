//! Remote connection lifecycle.

use std::{io, time::Duration};

use bytes::Bytes;
use fifoirc_core::{BoxedReader, BoxedWriter, BridgeConfig, Connector, Duplex, Identity};
use fifoirc_transport::{Frame, LineBuffer, protocol::escape};
use tokio::{io::AsyncWriteExt, time::Instant};

use crate::SessionError;

/// Silence on the remote connection after which the peer is considered dead.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// How long `QUIT` may take to reach a server that has stopped reading.
pub const QUIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport.
    Disconnected,
    /// Transport being opened.
    Connecting,
    /// Transport open and registration sent.
    Connected,
}

struct Link {
    reader: BoxedReader,
    writer: BoxedWriter,
    lines: LineBuffer,
}

/// Owns the remote connection: handshake, idle detection, reconnect, quit.
pub struct ConnectionManager<C>
where
    C: Connector,
{
    connector: C,
    host: String,
    port: u16,
    identity: Identity,
    channel: String,
    reconnect: bool,
    state: ConnectionState,
    link: Option<Link>,
    last_recv: Instant,
}

impl<C> ConnectionManager<C>
where
    C: Connector,
{
    /// Create a manager in the disconnected state.
    #[must_use]
    pub fn new(config: &BridgeConfig, connector: C) -> Self {
        Self {
            connector,
            host: config.host.clone(),
            port: config.port,
            identity: config.identity.clone(),
            channel: config.channel.clone(),
            reconnect: config.reconnect,
            state: ConnectionState::Disconnected,
            link: None,
            last_recv: Instant::now(),
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Remote host name.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Open the transport and register.
    ///
    /// Sends, in order: nickname, user/presence with the display name, the
    /// identification secret when one is configured, and the channel join.
    ///
    /// # Errors
    /// Returns error if the transport cannot be opened or registration
    /// cannot be written.
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        self.link = None;
        self.state = ConnectionState::Connecting;
        tracing::info!(host = %self.host, port = self.port, "Connecting");

        let Duplex { reader, writer } = match self.connector.connect(&self.host, self.port).await {
            Ok(duplex) => duplex,
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                return Err(e.into());
            }
        };
        self.link = Some(Link {
            reader,
            writer,
            lines: LineBuffer::default(),
        });

        let mut handshake = vec![
            Frame::nick(&self.identity.nickname),
            Frame::user(
                &self.identity.nickname,
                &self.host,
                &self.identity.display_name,
            ),
        ];
        if let Some(secret) = &self.identity.secret {
            handshake.push(Frame::identify(&self.identity.nickname, secret));
        }
        handshake.push(Frame::join(&self.channel));

        for frame in &handshake {
            if let Err(source) = self.write(frame).await {
                self.link = None;
                self.state = ConnectionState::Disconnected;
                return Err(SessionError::Handshake {
                    host: self.host.clone(),
                    source,
                });
            }
        }

        self.state = ConnectionState::Connected;
        self.last_recv = Instant::now();
        Ok(())
    }

    /// Send a frame. A write failure counts as a lost connection and runs the
    /// disconnect policy.
    ///
    /// # Errors
    /// Returns error if the connection was lost and cannot be re-established.
    pub async fn send(&mut self, frame: &Frame) -> Result<(), SessionError> {
        if let Err(e) = self.write(frame).await {
            tracing::warn!(host = %self.host, "Write to server failed: {e}");
            return self.on_disconnect().await;
        }
        Ok(())
    }

    /// Send the keepalive ping.
    ///
    /// # Errors
    /// See [`ConnectionManager::send`].
    pub async fn keepalive(&mut self) -> Result<(), SessionError> {
        let ping = Frame::ping(&self.host);
        self.send(&ping).await
    }

    /// Read whatever the server has sent. Zero means the server closed the
    /// connection. Pends forever while disconnected.
    ///
    /// # Errors
    /// Returns the transport's read error.
    pub async fn fill(&mut self) -> io::Result<usize> {
        match self.link.as_mut() {
            Some(link) => link.lines.fill(&mut link.reader).await,
            None => std::future::pending().await,
        }
    }

    /// Next complete line from the server. Resets the idle timer.
    pub fn next_line(&mut self) -> Option<Bytes> {
        let line = self.link.as_mut()?.lines.next_line()?;
        self.last_recv = Instant::now();
        Some(line)
    }

    /// Whole seconds since the last line from the server.
    #[must_use]
    pub fn idle_secs(&self) -> u64 {
        self.last_recv.elapsed().as_secs()
    }

    /// Run the disconnect policy if the server has been silent too long.
    ///
    /// Returns whether the policy ran.
    ///
    /// # Errors
    /// Returns error if the connection cannot be re-established.
    pub async fn check_idle(&mut self) -> Result<bool, SessionError> {
        let idle = self.idle_secs();
        if idle <= IDLE_TIMEOUT.as_secs() {
            return Ok(false);
        }
        tracing::warn!(host = %self.host, elapsed_secs = idle, "Ping timeout: {idle} seconds");
        self.on_disconnect().await?;
        Ok(true)
    }

    /// The connection is gone: reconnect if configured, otherwise fail.
    ///
    /// # Errors
    /// Returns [`SessionError::Disconnected`] when reconnecting is disabled,
    /// or the connect error when it fails.
    pub async fn on_disconnect(&mut self) -> Result<(), SessionError> {
        self.link = None;
        self.state = ConnectionState::Disconnected;

        if !self.reconnect {
            return Err(SessionError::Disconnected(self.host.clone()));
        }
        tracing::warn!(host = %self.host, "Disconnection, reconnecting");
        self.connect().await
    }

    /// Say goodbye without waiting for an answer. Gives up after
    /// [`QUIT_TIMEOUT`] when the server is not draining the connection.
    pub async fn quit(&mut self) {
        if self.link.is_some() {
            let goodbye = async {
                if let Err(e) = self.write(&Frame::quit()).await {
                    tracing::debug!("Failed to send QUIT: {e}");
                }
                if let Some(link) = self.link.as_mut() {
                    if let Err(e) = link.writer.shutdown().await {
                        tracing::debug!("Failed to close connection: {e}");
                    }
                }
            };
            if tokio::time::timeout(QUIT_TIMEOUT, goodbye).await.is_err() {
                tracing::warn!(host = %self.host, "Server is not reading, dropping the connection");
            }
            self.link = None;
        }
        self.state = ConnectionState::Disconnected;
    }

    async fn write(&mut self, frame: &Frame) -> io::Result<()> {
        let link = self
            .link
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        tracing::debug!(target: "fifoirc::wire", "> {}", escape(frame.line()));
        link.writer.write_all(frame.as_bytes()).await?;
        link.writer.flush().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use fifoirc_core::TransportError;
    use tokio::io::AsyncReadExt;
    use tokio_test::io::Builder;

    use super::*;

    /// Hands out scripted mock streams, one per connect.
    struct ScriptedConnector {
        scripts: std::sync::Mutex<Vec<tokio_test::io::Mock>>,
        connects: Arc<AtomicUsize>,
    }

    impl ScriptedConnector {
        fn new(mut scripts: Vec<tokio_test::io::Mock>) -> (Self, Arc<AtomicUsize>) {
            scripts.reverse();
            let connects = Arc::new(AtomicUsize::new(0));
            let connector = Self {
                scripts: std::sync::Mutex::new(scripts),
                connects: Arc::clone(&connects),
            };
            (connector, connects)
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(&self, host: &str, port: u16) -> Result<Duplex, TransportError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            match self.scripts.lock().unwrap().pop() {
                Some(mock) => Ok(Duplex::from_stream(mock)),
                None => Err(TransportError::Connect {
                    host: host.to_string(),
                    port,
                    source: io::Error::from(io::ErrorKind::ConnectionRefused),
                }),
            }
        }
    }

    fn config() -> BridgeConfig {
        let mut config = BridgeConfig::new("bot");
        config.host = "irc.example.net".to_string();
        config.channel = "#test".to_string();
        config.identity.display_name = "Bridge Bot".to_string();
        config
    }

    fn handshake(script: &mut Builder) -> &mut Builder {
        script
            .write(b"NICK bot\r\n")
            .write(b"USER bot localhost irc.example.net :Bridge Bot\r\n")
            .write(b"JOIN #test\r\n")
    }

    #[tokio::test]
    async fn test_connect_sends_handshake() {
        let mock = handshake(&mut Builder::new()).build();
        let (connector, _) = ScriptedConnector::new(vec![mock]);
        let mut manager = ConnectionManager::new(&config(), connector);

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        manager.connect().await.unwrap();
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_connect_identifies_when_secret_configured() {
        let mock = Builder::new()
            .write(b"NICK bot\r\n")
            .write(b"USER bot localhost irc.example.net :Bridge Bot\r\n")
            .write(b"PRIVMSG NickServ :identify bot hunter2\r\n")
            .write(b"JOIN #test\r\n")
            .build();
        let (connector, _) = ScriptedConnector::new(vec![mock]);
        let mut config = config();
        config.identity.secret = Some("hunter2".to_string());
        let mut manager = ConnectionManager::new(&config, connector);

        manager.connect().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_failure_is_an_error() {
        let (connector, _) = ScriptedConnector::new(vec![]);
        let mut manager = ConnectionManager::new(&config(), connector);

        let err = manager.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::Transport(_)));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lines_reset_idle_timer() {
        let mock = handshake(&mut Builder::new())
            .wait(Duration::from_secs(300))
            .read(b"PING :a\r\n")
            .build();
        let (connector, _) = ScriptedConnector::new(vec![mock]);
        let mut manager = ConnectionManager::new(&config(), connector);
        manager.connect().await.unwrap();

        let before = manager.last_recv;
        manager.fill().await.unwrap();
        assert!(manager.next_line().is_some());
        assert!(manager.last_recv > before);
        assert_eq!(manager.idle_secs(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_check_without_reconnect_fails() {
        let mock = handshake(&mut Builder::new()).build();
        let (connector, _) = ScriptedConnector::new(vec![mock]);
        let mut manager = ConnectionManager::new(&config(), connector);
        manager.connect().await.unwrap();

        tokio::time::advance(IDLE_TIMEOUT).await;
        assert!(!manager.check_idle().await.unwrap());

        tokio::time::advance(Duration::from_secs(1)).await;
        let err = manager.check_idle().await.unwrap_err();
        assert!(matches!(err, SessionError::Disconnected(host) if host == "irc.example.net"));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_check_reconnects_once() {
        let first = handshake(&mut Builder::new()).build();
        let second = handshake(&mut Builder::new()).build();
        let (connector, connects) = ScriptedConnector::new(vec![first, second]);
        let mut config = config();
        config.reconnect = true;
        let mut manager = ConnectionManager::new(&config, connector);
        manager.connect().await.unwrap();

        tokio::time::advance(IDLE_TIMEOUT * 2).await;
        assert!(manager.check_idle().await.unwrap());
        assert_eq!(connects.load(Ordering::SeqCst), 2);
        assert_eq!(manager.state(), ConnectionState::Connected);

        // The fresh connection restarted the timer.
        assert!(!manager.check_idle().await.unwrap());
        assert_eq!(connects.load(Ordering::SeqCst), 2);
    }

    /// Hands out one prepared stream, then refuses.
    struct OneShot(std::sync::Mutex<Option<tokio::io::DuplexStream>>);

    impl OneShot {
        fn new(stream: tokio::io::DuplexStream) -> Self {
            Self(std::sync::Mutex::new(Some(stream)))
        }
    }

    #[async_trait]
    impl Connector for OneShot {
        async fn connect(&self, host: &str, port: u16) -> Result<Duplex, TransportError> {
            self.0
                .lock()
                .unwrap()
                .take()
                .map(Duplex::from_stream)
                .ok_or_else(|| TransportError::Connect {
                    host: host.to_string(),
                    port,
                    source: io::Error::from(io::ErrorKind::ConnectionRefused),
                })
        }
    }

    #[tokio::test]
    async fn test_handshake_write_failure_is_an_error() {
        let (client, server) = tokio::io::duplex(64);
        drop(server);

        let mut manager = ConnectionManager::new(&config(), OneShot::new(client));
        let err = manager.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::Handshake { .. }));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_write_failure_runs_disconnect_policy() {
        let (client, server) = tokio::io::duplex(1024);
        let mut manager = ConnectionManager::new(&config(), OneShot::new(client));
        manager.connect().await.unwrap();
        drop(server);

        let err = manager.send(&Frame::privmsg("#test", b"lost")).await.unwrap_err();
        assert!(matches!(err, SessionError::Disconnected(_)));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_write_failure_reconnects_when_enabled() {
        let (client, server) = tokio::io::duplex(1024);
        let mut config = config();
        config.reconnect = true;
        let mut manager = ConnectionManager::new(&config, OneShot::new(client));
        manager.connect().await.unwrap();
        drop(server);

        // The one stream is used up, so the reconnect itself fails.
        let err = manager.send(&Frame::privmsg("#test", b"lost")).await.unwrap_err();
        assert!(matches!(err, SessionError::Transport(TransportError::Connect { .. })));
    }

    #[tokio::test]
    async fn test_quit_sends_quit() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut manager = ConnectionManager::new(&config(), OneShot::new(client));
        manager.connect().await.unwrap();
        manager.quit().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        drop(manager);

        let mut wire = String::new();
        server.read_to_string(&mut wire).await.unwrap();
        assert_eq!(
            wire,
            "NICK bot\r\nUSER bot localhost irc.example.net :Bridge Bot\r\nJOIN #test\r\nQUIT\r\n"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_quit_gives_up_on_a_stalled_server() {
        let (client, _server) = tokio::io::duplex(64);
        let mut manager = ConnectionManager::new(&config(), OneShot::new(client));
        // The handshake alone overfills the stream; the server never reads.
        let connect = tokio::time::timeout(Duration::from_secs(1), manager.connect()).await;
        assert!(connect.is_err());

        let started = Instant::now();
        manager.quit().await;
        assert!(started.elapsed() >= QUIT_TIMEOUT);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }
}
