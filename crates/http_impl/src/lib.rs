pub mod connect;
pub mod https;
pub mod socks5;
pub mod util;

use std::str::FromStr;

use bytes::{BufMut, Bytes, BytesMut};
use error::{Error, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

const BUFF_SIZE: usize = 4096;
const READ_TIMEOUT_SECS: u64 = 10;
/// Largest request head accepted from a client or an upstream proxy.
const MAX_HEAD_SIZE: usize = 64 * 1024;

pub struct IncomingRequest {
    pub type_: ProtocolType,
    /// Bytes to send to the destination before relaying starts.
    pub content: Bytes,
    pub protocol: Box<dyn Protocol + Send + Sync>,
}

impl IncomingRequest {
    pub fn host(&self) -> &str {
        self.protocol.get_host()
    }

    pub fn port(&self) -> u16 {
        self.protocol.get_port()
    }
}

/// Sniff the first byte: SOCKS5 greets with its version, anything else is
/// taken as an HTTP request line.
pub async fn parse_incoming_request<S>(conn: &mut S) -> Result<IncomingRequest>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let timeout = tokio::time::Duration::from_secs(READ_TIMEOUT_SECS);
    let first = match tokio::time::timeout(timeout, conn.read_u8()).await? {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(Error::EmptyRequest),
        Err(e) => return Err(e.into()),
    };

    if first == socks5::SOCKS5_VERSION {
        let request = socks5::Socks5Request::handshake(conn).await?;
        return Ok(IncomingRequest {
            type_: ProtocolType::Socks5,
            content: Bytes::new(),
            protocol: Box::new(request),
        });
    }

    let mut head = BytesMut::new();
    head.put_u8(first);
    read_head(conn, &mut head).await?;
    let request = https::HttpRequest::new(head.freeze())?;
    Ok(IncomingRequest {
        type_: ProtocolType::Http,
        content: request.forward_content(),
        protocol: Box::new(request),
    })
}

#[async_trait::async_trait]
pub trait Protocol {
    fn get_host(&self) -> &str;
    fn get_port(&self) -> u16;
    fn get_method(&self) -> RequestType;
    /// Tell the client whether the outbound side could be opened.
    async fn respond_command_result(&self, conn: &mut (dyn AsyncWrite + Unpin + Send), success: bool) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolType {
    Http,
    Socks5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Connect,
    Normal,
}

impl RequestType {
    pub fn default_port(&self) -> u16 {
        match *self {
            RequestType::Connect => 443,
            RequestType::Normal => 80,
        }
    }
}

impl FromStr for RequestType {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.to_uppercase();
        Ok(match s.as_str() {
            "CONNECT" => Self::Connect,
            _ => Self::Normal,
        })
    }
}

/// Read until the buffer holds a full header block. Bytes past the blank
/// line stay in `buf`.
pub async fn read_head<R>(conn: &mut R, buf: &mut BytesMut) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut chunk = [0; BUFF_SIZE];
    let timeout = tokio::time::Duration::from_secs(READ_TIMEOUT_SECS);
    while head_len(buf).is_none() {
        if buf.len() > MAX_HEAD_SIZE {
            return Err(Error::Protocol("http head too large".to_string()));
        }
        let n = tokio::time::timeout(timeout, conn.read(&mut chunk)).await??;
        if n == 0 {
            return Err(Error::EmptyRequest);
        }
        buf.put_slice(&chunk[..n]);
    }
    debug!("head: {:?}", String::from_utf8_lossy(buf));
    Ok(())
}

/// Length of the header block including the terminating blank line.
pub fn head_len(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

pub(crate) async fn write_all(conn: &mut (dyn AsyncWrite + Unpin + Send), buf: &[u8]) -> Result<()> {
    conn.write_all(buf).await?;
    conn.flush().await?;
    Ok(())
}
