//! TCP Connector
//!
//! Opens TCP connections for a codec and runs request/reply exchanges over
//! them.

use crate::adapters::outbound::codec::{Codec, CodecError};
use crate::domain::entities::Host;
use crate::domain::errors::BrokerError;
use crate::domain::ports::{Connection, Connector};
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::{TcpSocket, TcpStream};

/// Socket-level settings, applied to every connection as given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportOptions {
    /// Bound on establishing a connection; `None` waits for the OS
    pub connect_timeout: Option<Duration>,
    pub send_buffer_size: Option<u32>,
    pub recv_buffer_size: Option<u32>,
}

pub struct TcpConnector {
    codec: Codec,
    options: TransportOptions,
}

impl TcpConnector {
    pub fn new(codec: Codec, options: TransportOptions) -> Self {
        Self { codec, options }
    }

    fn socket_for(&self, addr: &SocketAddr) -> io::Result<TcpSocket> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        if let Some(size) = self.options.send_buffer_size {
            socket.set_send_buffer_size(size)?;
        }
        if let Some(size) = self.options.recv_buffer_size {
            socket.set_recv_buffer_size(size)?;
        }
        Ok(socket)
    }

    /// Try every resolved address in turn.
    async fn connect_any(&self, host: &Host) -> io::Result<TcpStream> {
        let mut last_err = None;
        for addr in tokio::net::lookup_host(host.addr()).await? {
            let attempt = match self.socket_for(&addr) {
                Ok(socket) => socket.connect(addr).await,
                Err(e) => Err(e),
            };
            match attempt {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    tracing::debug!(host = %host, addr = %addr, error = %e, "connect attempt failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
        }))
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, host: &Host) -> Result<Box<dyn Connection>, BrokerError> {
        let stream = match self.options.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, self.connect_any(host))
                .await
                .map_err(|_| {
                    BrokerError::connection(host, format!("connect timed out after {}ms", limit.as_millis()))
                })?,
            None => self.connect_any(host).await,
        }
        .map_err(|e| BrokerError::connection(host, e))?;

        stream
            .set_nodelay(true)
            .map_err(|e| BrokerError::connection(host, e))?;
        tracing::debug!(host = %host, codec = %self.codec, "connected");

        Ok(Box::new(TcpConnection {
            host: host.to_string(),
            codec: self.codec,
            stream: BufReader::new(stream),
        }))
    }
}

struct TcpConnection {
    host: String,
    codec: Codec,
    stream: BufReader<TcpStream>,
}

impl TcpConnection {
    fn map_err(&self, e: CodecError) -> BrokerError {
        match e {
            CodecError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                BrokerError::connection(&self.host, "connection closed by peer")
            }
            CodecError::Io(e) => BrokerError::connection(&self.host, e),
            CodecError::Malformed(reason) => BrokerError::protocol(&self.host, reason),
        }
    }
}

#[async_trait]
impl Connection for TcpConnection {
    async fn round_trip(&mut self, request: Bytes) -> Result<Bytes, BrokerError> {
        if let Err(e) = self.codec.write_request(self.stream.get_mut(), &request).await {
            return Err(self.map_err(e));
        }
        match self.codec.read_reply(&mut self.stream).await {
            Ok(reply) => Ok(reply),
            Err(e) => Err(self.map_err(e)),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Framed echo server answering every frame on a connection.
    async fn framed_echo() -> Host {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    loop {
                        let mut len = [0u8; 4];
                        if stream.read_exact(&mut len).await.is_err() {
                            return;
                        }
                        let mut body = vec![0u8; u32::from_be_bytes(len) as usize];
                        if stream.read_exact(&mut body).await.is_err() {
                            return;
                        }
                        let _ = stream.write_all(&len).await;
                        let _ = stream.write_all(&body).await;
                    }
                });
            }
        });
        Host::new("127.0.0.1", port)
    }

    #[tokio::test]
    async fn test_framed_round_trips_on_one_connection() {
        let host = framed_echo().await;
        let connector = TcpConnector::new(
            Codec::Framed,
            TransportOptions {
                connect_timeout: Some(Duration::from_secs(1)),
                send_buffer_size: Some(64 * 1024),
                recv_buffer_size: Some(64 * 1024),
            },
        );

        let mut conn = connector.connect(&host).await.unwrap();
        for msg in ["one", "two", "three"] {
            let reply = conn.round_trip(Bytes::from(msg)).await.unwrap();
            assert_eq!(reply, Bytes::from(msg));
        }
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let connector = TcpConnector::new(Codec::Framed, TransportOptions::default());
        let err = connector.connect(&Host::new("127.0.0.1", port)).await.err().unwrap();
        assert!(matches!(err, BrokerError::Connection { .. }));
    }

    #[tokio::test]
    async fn test_peer_close_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 64];
                let _ = stream.read(&mut buf).await;
            }
        });

        let connector = TcpConnector::new(Codec::Framed, TransportOptions::default());
        let mut conn = connector.connect(&Host::new("127.0.0.1", port)).await.unwrap();
        let err = conn.round_trip(Bytes::from_static(b"hi")).await.unwrap_err();
        assert_eq!(err, BrokerError::connection(format!("127.0.0.1:{port}"), "connection closed by peer"));
    }

    #[tokio::test]
    async fn test_malformed_reply_is_protocol_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 64];
                let _ = stream.read(&mut buf).await;
                let _ = stream.write_all(b"garbage\r\n\r\n").await;
            }
        });

        let connector = TcpConnector::new(Codec::Http, TransportOptions::default());
        let mut conn = connector.connect(&Host::new("127.0.0.1", port)).await.unwrap();
        let err = conn
            .round_trip(Bytes::from_static(b"GET / HTTP/1.1\r\n\r\n"))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::Protocol { .. }));
    }
}
