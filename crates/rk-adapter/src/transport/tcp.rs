use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use error::{Error, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tracing::debug;

use super::{RawTransport, CONNECT_TIMEOUT_SECS};

const READ_BUFF_SIZE: usize = 16 * 1024;

#[derive(Default)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
    buf: BytesMut,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn stream(&mut self) -> Result<&mut TcpStream> {
        self.stream.as_mut().ok_or(Error::AdapterClosed)
    }
}

#[async_trait]
impl RawTransport for TcpTransport {
    async fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        let stream = timeout(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            TcpStream::connect((host, port)),
        )
        .await??;
        let _ = stream.set_nodelay(true);
        debug!("tcp connected to {}:{}", host, port);
        self.stream = Some(stream);
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream()?;
        stream.write_all(data).await?;
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Bytes>> {
        self.buf.reserve(READ_BUFF_SIZE);
        let stream = self.stream.as_mut().ok_or(Error::AdapterClosed)?;
        let n = stream.read_buf(&mut self.buf).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(self.buf.split().freeze()))
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.as_mut() {
            stream.flush().await?;
            stream.shutdown().await?;
        }
        Ok(())
    }

    fn force_disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.set_linger(Some(Duration::from_secs(0)));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_transport() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            conn.read_exact(&mut buf).await.unwrap();
            conn.write_all(&buf).await.unwrap();
        });

        let mut transport = TcpTransport::new();
        assert!(transport.write(b"x").await.is_err());
        transport.connect("127.0.0.1", port).await.unwrap();
        transport.write(b"hello").await.unwrap();
        let mut echoed = Vec::new();
        while echoed.len() < 5 {
            echoed.extend_from_slice(&transport.read().await.unwrap().unwrap());
        }
        assert_eq!(echoed, b"hello");
        server.await.unwrap();
        assert_eq!(transport.read().await.unwrap(), None);
        transport.force_disconnect();
        assert!(transport.read().await.is_err());
    }
}
