//! TCP transport to the remote server.

use async_trait::async_trait;
use fifoirc_core::{Connector, Duplex, TransportError};
use tokio::net::{TcpStream, lookup_host};

/// Connects over plain TCP, trying each resolved address in turn.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

impl TcpConnector {
    /// Create a new connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<Duplex, TransportError> {
        let addrs = lookup_host((host, port))
            .await
            .map_err(|source| TransportError::Resolve {
                host: host.to_string(),
                source,
            })?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!(%addr, "Failed to set TCP_NODELAY: {e}");
                    }
                    tracing::info!(host, port, %addr, "Connected");
                    let (reader, writer) = stream.into_split();
                    return Ok(Duplex::new(reader, writer));
                }
                Err(e) => {
                    tracing::debug!(%addr, "Connect attempt failed: {e}");
                    last_err = Some(e);
                }
            }
        }

        Err(match last_err {
            Some(source) => TransportError::Connect {
                host: host.to_string(),
                port,
                source,
            },
            None => TransportError::NoAddress(host.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;

    #[tokio::test]
    async fn test_connects_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 10];
            socket.read_exact(&mut buf).await.unwrap();
            buf
        });

        let mut duplex = TcpConnector::new().connect("127.0.0.1", port).await.unwrap();
        duplex.writer.write_all(b"NICK bot\r\n").await.unwrap();

        assert_eq!(&server.await.unwrap(), b"NICK bot\r\n");
    }

    #[tokio::test]
    async fn test_refused_connection_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = TcpConnector::new().connect("127.0.0.1", port).await.unwrap_err();
        assert!(matches!(err, TransportError::Connect { port: p, .. } if p == port));
    }
}
