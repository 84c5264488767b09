use async_trait::async_trait;
use bytes::Bytes;
use config::TransportKind;
use error::{Error, Result};
use rk_common::Session;
use tracing::debug;
use uuid::Uuid;
use vmess::{VmessAuth, VmessCommand, VmessSession};

use crate::core::AdapterCore;
use crate::transport::{RawTransport, TcpTransport, WsTransport};
use crate::{AdapterEvent, AdapterFactory, AdapterSocket, AdapterState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmessServer {
    pub host: String,
    pub port: u16,
    pub uuid: Uuid,
    pub alter_id: u16,
    pub transport: TransportKind,
    pub path: String,
    pub tls: bool,
}

impl VmessServer {
    fn new_transport(&self) -> Box<dyn RawTransport> {
        match self.transport {
            TransportKind::Ws => Box::new(WsTransport::new(self.path.clone(), self.tls)),
            TransportKind::Tcp => Box::new(TcpTransport::new()),
        }
    }
}

/// Runs every byte through a [`VmessSession`]. The codec is built on open
/// and dropped with the adapter.
pub struct VmessAdapter {
    server: VmessServer,
    core: AdapterCore,
    vmess: Option<VmessSession>,
}

impl VmessAdapter {
    pub fn new(server: VmessServer) -> Self {
        let transport = server.new_transport();
        Self {
            server,
            core: AdapterCore::new(transport),
            vmess: None,
        }
    }
}

#[async_trait]
impl AdapterSocket for VmessAdapter {
    fn kind(&self) -> &'static str {
        "vmess"
    }

    fn state(&self) -> AdapterState {
        self.core.state()
    }

    async fn open(&mut self, session: &Session) -> Result<()> {
        let command = VmessCommand::for_session(session)?;
        let mut vmess = VmessSession::new(VmessAuth::new(self.server.uuid), command);

        debug!(
            "vmess connect to {}:{} (alter id {}) for {}",
            self.server.host, self.server.port, self.server.alter_id, session
        );
        self.core.connect(&self.server.host, self.server.port).await?;
        let header = vmess.pack_request_header()?;
        if let Err(e) = self.core.send_raw(&header).await {
            self.core.force_disconnect(None);
            return Err(e);
        }
        self.vmess = Some(vmess);
        self.core.did_connect();
        Ok(())
    }

    async fn write(&mut self, data: Bytes) -> Result<()> {
        let vmess = self.vmess.as_mut().ok_or(Error::AdapterClosed)?;
        let packed = vmess.pack_request(&data);
        self.core.write(&packed, data.len()).await
    }

    async fn next_event(&mut self) -> AdapterEvent {
        let vmess = &mut self.vmess;
        self.core
            .next_event(move |raw| {
                let vmess = vmess.as_mut().ok_or(Error::AdapterClosed)?;
                vmess.handle_response(&raw);
                let mut bodies = Vec::new();
                while let Some(body) = vmess.unpack_response()? {
                    let end = body.is_empty();
                    bodies.push(body);
                    if end {
                        break;
                    }
                }
                Ok(bodies)
            })
            .await
    }

    async fn disconnect(&mut self, error: Option<Error>) {
        if !self.core.is_closed() {
            if let Some(vmess) = self.vmess.as_mut() {
                let terminate = vmess.terminate_request();
                if let Err(e) = self.core.send_raw(&terminate).await {
                    debug!("send vmess terminate frame failed: {}", e);
                }
            }
        }
        self.core.disconnect(error).await
    }

    fn force_disconnect(&mut self, error: Option<Error>) {
        self.core.force_disconnect(error)
    }
}

#[derive(Debug, Clone)]
pub struct VmessAdapterFactory {
    server: VmessServer,
}

impl VmessAdapterFactory {
    pub fn new(server: VmessServer) -> Self {
        Self { server }
    }
}

impl AdapterFactory for VmessAdapterFactory {
    fn kind(&self) -> &'static str {
        "vmess"
    }

    fn adapter_for(&self, _session: &Session) -> Box<dyn AdapterSocket> {
        Box::new(VmessAdapter::new(self.server.clone()))
    }
}
