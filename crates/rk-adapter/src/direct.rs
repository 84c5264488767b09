use async_trait::async_trait;
use bytes::Bytes;
use error::{Error, Result};
use rk_common::Session;
use tracing::debug;

use crate::core::AdapterCore;
use crate::transport::{RawTransport, TcpTransport};
use crate::{AdapterEvent, AdapterFactory, AdapterSocket, AdapterState};

/// Connects straight to the destination.
pub struct DirectAdapter {
    core: AdapterCore,
}

impl DirectAdapter {
    pub fn new(transport: Box<dyn RawTransport>) -> Self {
        Self {
            core: AdapterCore::new(transport),
        }
    }
}

#[async_trait]
impl AdapterSocket for DirectAdapter {
    fn kind(&self) -> &'static str {
        "direct"
    }

    fn state(&self) -> AdapterState {
        self.core.state()
    }

    async fn open(&mut self, session: &Session) -> Result<()> {
        // skip a second lookup when the tunnel already resolved the host
        let host = match session.ip() {
            Some(ip) => ip.to_string(),
            None => session.host().to_string(),
        };
        debug!("direct connect to {}:{}", host, session.port());
        self.core.connect(&host, session.port()).await?;
        self.core.did_connect();
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

#[derive(Debug, Default)]
pub struct DirectAdapterFactory;

impl AdapterFactory for DirectAdapterFactory {
    fn kind(&self) -> &'static str {
        "direct"
    }

    fn adapter_for(&self, _session: &Session) -> Box<dyn AdapterSocket> {
        Box::new(DirectAdapter::new(Box::new(TcpTransport::new())))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_direct_adapter_events() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            conn.read_exact(&mut buf).await.unwrap();
            conn.write_all(b"pong").await.unwrap();
        });

        let session = Session::new("127.0.0.1", port);
        let mut adapter = DirectAdapterFactory.adapter_for(&session);
        adapter.open(&session).await.unwrap();
        assert!(matches!(adapter.next_event().await, AdapterEvent::Connected));
        assert_eq!(adapter.state(), AdapterState::Connected);

        adapter.write(Bytes::from_static(b"ping")).await.unwrap();
        assert!(matches!(adapter.next_event().await, AdapterEvent::Wrote(4)));

        let mut read = Vec::new();
        loop {
            match adapter.next_event().await {
                AdapterEvent::Read(data) => read.extend_from_slice(&data),
                AdapterEvent::Closed(None) => break,
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(read, b"pong");
        assert_eq!(adapter.state(), AdapterState::Closed);
        assert!(matches!(adapter.next_event().await, AdapterEvent::Closed(None)));
        assert!(adapter.write(Bytes::from_static(b"late")).await.is_err());
    }

    #[tokio::test]
    async fn test_direct_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let session = Session::new("127.0.0.1", port);
        let mut adapter = DirectAdapterFactory.adapter_for(&session);
        assert!(adapter.open(&session).await.is_err());
        assert_eq!(adapter.state(), AdapterState::Closed);
    }
}
