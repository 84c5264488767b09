use async_trait::async_trait;
use bytes::Bytes;
use error::{Error, Result};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use super::{RawTransport, CONNECT_TIMEOUT_SECS};

type InnerStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Binary websocket frames carrying the byte stream.
pub struct WsTransport {
    path: String,
    tls: bool,
    stream: Option<InnerStream>,
}

impl WsTransport {
    pub fn new(path: impl Into<String>, tls: bool) -> Self {
        let mut path = path.into();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        Self {
            path,
            tls,
            stream: None,
        }
    }

    /// The port is left out when it is the scheme default.
    pub fn url(&self, host: &str, port: u16) -> String {
        let (scheme, default_port) = if self.tls { ("wss", 443) } else { ("ws", 80) };
        let host = if host.contains(':') {
            format!("[{}]", host)
        } else {
            host.to_string()
        };
        if port == default_port {
            format!("{}://{}{}", scheme, host, self.path)
        } else {
            format!("{}://{}:{}{}", scheme, host, port, self.path)
        }
    }

    fn stream(&mut self) -> Result<&mut InnerStream> {
        self.stream.as_mut().ok_or(Error::AdapterClosed)
    }
}

#[async_trait]
impl RawTransport for WsTransport {
    async fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        let url = self.url(host, port);
        let (stream, _) = timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS), connect_async(url.as_str())).await??;
        debug!("websocket connected to {}", url);
        self.stream = Some(stream);
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let stream = self.stream()?;
        stream.send(Message::Binary(data.to_vec())).await?;
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Bytes>> {
        let stream = self.stream()?;
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Some(Bytes::from(data))),
                Some(Ok(Message::Text(text))) => return Ok(Some(Bytes::from(text.into_bytes()))),
                Some(Ok(Message::Close(frame))) => {
                    info!("websocket closed by peer: {:?}", frame);
                    return Ok(None);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(None),
            }
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.as_mut() {
            stream.close(None).await?;
        }
        Ok(())
    }

    fn force_disconnect(&mut self) {
        self.stream = None;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_url() {
        assert_eq!(WsTransport::new("/ray", true).url("v.example.com", 443), "wss://v.example.com/ray");
        assert_eq!(WsTransport::new("ray", true).url("v.example.com", 8443), "wss://v.example.com:8443/ray");
        assert_eq!(WsTransport::new("/", false).url("10.0.0.1", 80), "ws://10.0.0.1/");
        assert_eq!(WsTransport::new("/", false).url("::1", 8080), "ws://[::1]:8080/");
    }

    #[tokio::test]
    async fn test_ws_transport() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (conn, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(conn).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_binary() {
                    ws.send(msg).await.unwrap();
                } else if msg.is_close() {
                    break;
                }
            }
        });

        let mut transport = WsTransport::new("/ws", false);
        transport.connect("127.0.0.1", port).await.unwrap();
        transport.write(b"hello").await.unwrap();
        assert_eq!(transport.read().await.unwrap(), Some(Bytes::from_static(b"hello")));
        transport.disconnect().await.unwrap();
        server.await.unwrap();
    }
}
