//! Byte stream transports an adapter runs its protocol over.

mod tcp;
mod ws;

pub use tcp::TcpTransport;
pub use ws::WsTransport;

use async_trait::async_trait;
use bytes::Bytes;
use error::Result;

const CONNECT_TIMEOUT_SECS: u64 = 10;

#[async_trait]
pub trait RawTransport: Send {
    async fn connect(&mut self, host: &str, port: u16) -> Result<()>;

    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Next chunk from the peer, `None` once it closed. Cancel safe.
    async fn read(&mut self) -> Result<Option<Bytes>>;

    /// Flush and close the write side.
    async fn disconnect(&mut self) -> Result<()>;

    /// Drop the connection without flushing anything.
    fn force_disconnect(&mut self);
}
