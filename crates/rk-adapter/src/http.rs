use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use error::{Error, Result};
use http_impl::connect::{build_connect_request, parse_connect_response};
use rk_common::Session;
use tracing::debug;

use crate::core::AdapterCore;
use crate::transport::{RawTransport, TcpTransport};
use crate::{AdapterEvent, AdapterFactory, AdapterSocket, AdapterState};

/// Largest response head accepted from the upstream proxy.
const MAX_RESPONSE_HEAD: usize = 16 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpProxyServer {
    pub host: String,
    pub port: u16,
    pub auth: Option<(String, String)>,
}

/// Tunnels through an upstream HTTP proxy with CONNECT.
pub struct HttpAdapter {
    server: HttpProxyServer,
    core: AdapterCore,
}

impl HttpAdapter {
    pub fn new(server: HttpProxyServer, transport: Box<dyn RawTransport>) -> Self {
        Self {
            server,
            core: AdapterCore::new(transport),
        }
    }

    /// Returns whatever followed the response head.
    async fn handshake(&mut self, session: &Session) -> Result<Bytes> {
        let auth = self
            .server
            .auth
            .as_ref()
            .map(|(u, p)| (u.as_str(), p.as_str()));
        let request = build_connect_request(session.host(), session.port(), auth);
        self.core.send_raw(&request).await?;

        let mut buf = BytesMut::new();
        loop {
            if let Some((code, len)) = parse_connect_response(&buf)? {
                debug!("upstream proxy answered {} for {}", code, session);
                if !(200..300).contains(&code) {
                    return Err(Error::Protocol(format!("upstream proxy refused connect with {}", code)));
                }
                return Ok(buf.split_off(len).freeze());
            }
            if buf.len() > MAX_RESPONSE_HEAD {
                return Err(Error::Protocol("connect response too large".to_string()));
            }
            match self.core.recv_raw().await? {
                Some(data) => buf.extend_from_slice(&data),
                None => return Err(Error::Protocol("upstream proxy closed during connect".to_string())),
            }
        }
    }
}

#[async_trait]
impl AdapterSocket for HttpAdapter {
    fn kind(&self) -> &'static str {
        "http"
    }

    fn state(&self) -> AdapterState {
        self.core.state()
    }

    async fn open(&mut self, session: &Session) -> Result<()> {
        self.core.connect(&self.server.host, self.server.port).await?;
        let rest = match self.handshake(session).await {
            Ok(rest) => rest,
            Err(e) => {
                self.core.force_disconnect(None);
                return Err(e);
            }
        };
        self.core.did_connect();
        if !rest.is_empty() {
            self.core.did_read(rest);
        }
        Ok(())
    }

    async fn write(&mut self, data: Bytes) -> Result<()> {
        self.core.write(&data, data.len()).await
    }

    async fn next_event(&mut self) -> AdapterEvent {
        self.core.next_event(|raw| Ok(vec![raw])).await
    }

    async fn disconnect(&mut self, error: Option<Error>) {
        self.core.disconnect(error).await
    }

    fn force_disconnect(&mut self, error: Option<Error>) {
        self.core.force_disconnect(error)
    }
}

#[derive(Debug, Clone)]
pub struct HttpAdapterFactory {
    server: HttpProxyServer,
}

impl HttpAdapterFactory {
    pub fn new(server: HttpProxyServer) -> Self {
        Self { server }
    }
}

impl AdapterFactory for HttpAdapterFactory {
    fn kind(&self) -> &'static str {
        "http"
    }

    fn adapter_for(&self, _session: &Session) -> Box<dyn AdapterSocket> {
        Box::new(HttpAdapter::new(self.server.clone(), Box::new(TcpTransport::new())))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn fake_proxy(answer: &'static [u8]) -> (u16, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.ends_with(b"\r\n\r\n") {
                let n = conn.read(&mut buf).await.unwrap();
                head.extend_from_slice(&buf[..n]);
            }
            conn.write_all(answer).await.unwrap();
            String::from_utf8(head).unwrap()
        });
        (port, handle)
    }

    fn server(port: u16, auth: Option<(String, String)>) -> HttpProxyServer {
        HttpProxyServer {
            host: "127.0.0.1".to_string(),
            port,
            auth,
        }
    }

    #[tokio::test]
    async fn test_connect_through_proxy() {
        let (port, proxy) = fake_proxy(b"HTTP/1.1 200 Connection established\r\n\r\nhello").await;
        let factory = HttpAdapterFactory::new(server(port, Some(("user".to_string(), "pass".to_string()))));
        let session = Session::new("example.com", 443);
        let mut adapter = factory.adapter_for(&session);
        adapter.open(&session).await.unwrap();

        assert!(matches!(adapter.next_event().await, AdapterEvent::Connected));
        match adapter.next_event().await {
            AdapterEvent::Read(data) => assert_eq!(data, Bytes::from_static(b"hello")),
            other => panic!("unexpected {:?}", other),
        }
        let head = proxy.await.unwrap();
        assert!(head.starts_with("CONNECT example.com:443 HTTP/1.1\r\n"));
        assert!(head.contains("Proxy-Authorization: Basic dXNlcjpwYXNz\r\n"));
    }

    #[tokio::test]
    async fn test_proxy_refuses() {
        let (port, _proxy) = fake_proxy(b"HTTP/1.1 403 Forbidden\r\n\r\n").await;
        let factory = HttpAdapterFactory::new(server(port, None));
        let session = Session::new("example.com", 443);
        let mut adapter = factory.adapter_for(&session);
        assert!(adapter.open(&session).await.is_err());
        assert_eq!(adapter.state(), AdapterState::Closed);
    }
}
