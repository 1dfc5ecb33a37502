//! Wire Codecs
//!
//! The two recognised wire formats. Each variant knows how to frame one
//! request and read back exactly one reply, and builds the connector that
//! speaks it.

use crate::adapters::outbound::tcp_connector::{TcpConnector, TransportOptions};
use crate::domain::errors::ConfigError;
use crate::domain::ports::Connector;
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest reply frame accepted by the framed codec.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Largest HTTP response head accepted.
const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Failure while framing or parsing.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("{0}")]
    Malformed(String),
}

/// Wire protocol spoken to every host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// HTTP/1.1 request/response; requests are written verbatim
    Http,
    /// 4-byte big-endian length prefix, as used by framed Thrift transports
    Framed,
}

impl Codec {
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Http => "http",
            Codec::Framed => "framed",
        }
    }

    /// Build the connector that speaks this codec.
    pub fn connector(&self, options: TransportOptions) -> Arc<dyn Connector> {
        Arc::new(TcpConnector::new(*self, options))
    }

    /// Write one request.
    pub async fn write_request<W>(&self, writer: &mut W, request: &[u8]) -> Result<(), CodecError>
    where
        W: AsyncWrite + Unpin,
    {
        match self {
            Codec::Http => writer.write_all(request).await?,
            Codec::Framed => {
                let len = u32::try_from(request.len())
                    .map_err(|_| CodecError::Malformed(format!("request too large: {} bytes", request.len())))?;
                writer.write_all(&len.to_be_bytes()).await?;
                writer.write_all(request).await?;
            }
        }
        writer.flush().await?;
        Ok(())
    }

    /// Read exactly one reply.
    pub async fn read_reply<R>(&self, reader: &mut R) -> Result<Bytes, CodecError>
    where
        R: AsyncBufRead + Unpin,
    {
        match self {
            Codec::Http => read_http_response(reader).await,
            Codec::Framed => read_frame(reader).await,
        }
    }
}

impl FromStr for Codec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Codec::Http),
            "framed" | "thrift" => Ok(Codec::Framed),
            _ => Err(ConfigError::UnknownCodec(s.to_string())),
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

async fn read_frame<R>(reader: &mut R) -> Result<Bytes, CodecError>
where
    R: AsyncBufRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(CodecError::Malformed(format!("frame too large: {len} bytes")));
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data).await?;
    Ok(Bytes::from(data))
}

/// Read a response head and its `Content-Length` body. Returns the whole
/// response, head included.
async fn read_http_response<R>(reader: &mut R) -> Result<Bytes, CodecError>
where
    R: AsyncBufRead + Unpin,
{
    let mut response = BytesMut::new();
    let mut line = String::new();

    read_head_line(reader, &mut line, MAX_HEAD_SIZE).await?;
    let status = parse_status_line(&line)?;
    response.extend_from_slice(line.as_bytes());

    let mut content_length = None;
    loop {
        line.clear();
        read_head_line(reader, &mut line, MAX_HEAD_SIZE - response.len()).await?;
        response.extend_from_slice(line.as_bytes());

        let header = line.trim_end_matches(['\r', '\n']);
        if header.is_empty() {
            break;
        }
        let Some((name, value)) = header.split_once(':') else {
            return Err(CodecError::Malformed(format!("bad header line: {header}")));
        };
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            let len: usize = value
                .parse()
                .map_err(|_| CodecError::Malformed(format!("bad content-length: {value}")))?;
            content_length = Some(len);
        } else if name.eq_ignore_ascii_case("transfer-encoding")
            && value.to_ascii_lowercase().contains("chunked")
        {
            return Err(CodecError::Malformed("chunked responses are not supported".to_string()));
        }
    }

    let body_len = match content_length {
        Some(len) => len,
        // These never carry a body
        None if status < 200 || status == 204 || status == 304 => 0,
        None => return Err(CodecError::Malformed("response without content-length".to_string())),
    };
    if body_len > MAX_FRAME_SIZE {
        return Err(CodecError::Malformed(format!("body too large: {body_len} bytes")));
    }

    let head_len = response.len();
    response.resize(head_len + body_len, 0);
    reader.read_exact(&mut response[head_len..]).await?;
    Ok(response.freeze())
}

/// Read one CRLF-terminated head line, never buffering more than `budget`
/// bytes of it.
async fn read_head_line<R>(reader: &mut R, line: &mut String, budget: usize) -> Result<(), CodecError>
where
    R: AsyncBufRead + Unpin,
{
    let read = (&mut *reader).take(budget as u64).read_line(line).await?;
    if read == 0 && budget > 0 {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }
    if !line.ends_with('\n') {
        if read < budget {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
        return Err(CodecError::Malformed("response head too large".to_string()));
    }
    Ok(())
}

fn parse_status_line(line: &str) -> Result<u16, CodecError> {
    let mut parts = line.split_whitespace();
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(CodecError::Malformed(format!("bad status line: {}", line.trim_end())));
    }
    parts
        .next()
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| CodecError::Malformed(format!("bad status line: {}", line.trim_end())))
}
