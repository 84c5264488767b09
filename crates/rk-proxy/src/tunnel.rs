use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use error::{Error, Result};
use http_impl::{parse_incoming_request, IncomingRequest};
use rk_adapter::{AdapterEvent, AdapterSocket};
use rk_common::{Resolution, Session, TrafficInfo, TunnelId};
use rk_stat::{StatEvent, TunnelEvent};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::activity::Activity;
use crate::pool::TunnelHandle;
use crate::TunnelContext;

const RELAY_BUF_SIZE: usize = 32 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TunnelState {
    Idle,
    Opening,
    Established,
    Closing,
    Closed,
}

/// One inbound client paired with the adapter its session routed to.
pub struct Tunnel<S> {
    id: TunnelId,
    ctx: Arc<TunnelContext>,
    inbound: S,
    remote_addr: SocketAddr,
    adapter: Option<Box<dyn AdapterSocket>>,
    session: Option<Session>,
    activity: Arc<Activity>,
    state: TunnelState,
}

impl<S> Tunnel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(ctx: Arc<TunnelContext>, inbound: S, remote_addr: SocketAddr) -> Self {
        Self {
            id: ctx.pool.next_id(),
            ctx,
            inbound,
            remote_addr,
            adapter: None,
            session: None,
            activity: Arc::new(Activity::new()),
            state: TunnelState::Idle,
        }
    }

    pub fn id(&self) -> TunnelId {
        self.id
    }

    /// Drive the tunnel until either side closes or the pool evicts it.
    pub async fn run(mut self) -> Result<()> {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        self.ctx
            .pool
            .register(TunnelHandle::new(self.id, self.activity.clone(), shutdown_tx));
        self.ctx.stat(StatEvent::Tunnel(TunnelEvent::Opened));
        self.set_state(TunnelState::Opening);

        let result = tokio::select! {
            res = self.serve() => res,
            _ = shutdown_rx.recv() => {
                info!("{} force closed", self);
                self.force_close();
                Ok(())
            }
        };
        match &result {
            Err(e) if e.is_decode_failure() => warn!("{} dropped on decode failure: {}", self, e),
            Err(e) => warn!("{} closed with error: {}", self, e),
            Ok(()) => {}
        }
        self.close().await;
        result
    }

    async fn serve(&mut self) -> Result<()> {
        let request = parse_incoming_request(&mut self.inbound).await?;
        let session = resolve(&self.ctx, Session::new(request.host(), request.port())).await;
        debug!("tunnel {} from {} requests {}", self.id, self.remote_addr, session);
        self.session = Some(session.clone());

        if self.ctx.pressure.is_under_pressure() {
            if let Some(id) = self.ctx.pool.recycle_except(self.id).await {
                info!("tunnel {} opening under memory pressure, recycled {}", self.id, id);
            }
        }

        if let Err(e) = self.open(&request, &session).await {
            if let Err(reply_err) = request.protocol.respond_command_result(&mut self.inbound, false).await {
                debug!("reply failure to client failed: {}", reply_err);
            }
            return Err(e);
        }
        request.protocol.respond_command_result(&mut self.inbound, true).await?;
        self.set_state(TunnelState::Established);
        self.relay(&session).await
    }

    /// Routing is decided once; a failed open is not retried elsewhere.
    async fn open(&mut self, request: &IncomingRequest, session: &Session) -> Result<()> {
        let factory = self.ctx.rules.resolve(session)?;
        let adapter = factory.adapter_for(session);
        info!("{} via {} adapter", self, adapter.kind());
        // keep the adapter so a forced close can reach it mid handshake
        let adapter = self.adapter.insert(adapter);
        adapter.open(session).await?;
        match adapter.next_event().await {
            AdapterEvent::Connected => {}
            AdapterEvent::Closed(Some(e)) => return Err(e),
            other => return Err(Error::Protocol(format!("unexpected adapter event {:?} while opening", other))),
        }

        if !request.content.is_empty() {
            let len = request.content.len();
            adapter.write(request.content.clone()).await?;
            self.activity.touch();
            self.traffic(session, len, true);
        }
        Ok(())
    }

    async fn relay(&mut self, session: &Session) -> Result<()> {
        let Some(adapter) = self.adapter.as_mut() else {
            return Err(Error::AdapterClosed);
        };
        let kind = adapter.kind();
        let mut buf = BytesMut::with_capacity(RELAY_BUF_SIZE);
        loop {
            buf.reserve(RELAY_BUF_SIZE);
            tokio::select! {
                n = self.inbound.read_buf(&mut buf) => {
                    let n = n?;
                    if n == 0 {
                        debug!("tunnel {} client closed", self.id);
                        return Ok(());
                    }
                    self.activity.touch();
                    adapter.write(buf.split().freeze()).await?;
                    send_traffic(&self.ctx, session, kind, n, true);
                }
                event = adapter.next_event() => match event {
                    AdapterEvent::Read(data) => {
                        self.activity.touch();
                        self.inbound.write_all(&data).await?;
                        send_traffic(&self.ctx, session, kind, data.len(), false);
                    }
                    AdapterEvent::Wrote(_) => self.activity.touch(),
                    AdapterEvent::Connected => {}
                    AdapterEvent::Closed(None) => {
                        debug!("tunnel {} adapter closed", self.id);
                        return Ok(());
                    }
                    AdapterEvent::Closed(Some(e)) => return Err(e),
                }
            }
        }
    }

    fn set_state(&mut self, state: TunnelState) {
        if self.state != state {
            debug!("tunnel {} {:?} -> {:?}", self.id, self.state, state);
            self.state = state;
        }
    }

    fn traffic(&self, session: &Session, len: usize, is_upload: bool) {
        if let Some(adapter) = self.adapter.as_ref() {
            send_traffic(&self.ctx, session, adapter.kind(), len, is_upload);
        }
    }

    fn force_close(&mut self) {
        self.set_state(TunnelState::Closing);
        if let Some(adapter) = self.adapter.as_mut() {
            adapter.force_disconnect(None);
        }
    }

    async fn close(&mut self) {
        self.set_state(TunnelState::Closing);
        if let Some(adapter) = self.adapter.as_mut() {
            adapter.disconnect(None).await;
        }
        let _ = self.inbound.shutdown().await;
        self.set_state(TunnelState::Closed);
        self.ctx.pool.closed(self.id);
        self.ctx.stat(StatEvent::Tunnel(TunnelEvent::Closed));
        debug!("{} closed", self);
    }
}

/// Only looks the host up when some rule decides on the ip.
async fn resolve(ctx: &TunnelContext, session: Session) -> Session {
    if session.is_ip() || !ctx.rules.needs_ip() {
        return session;
    }
    match ctx.resolver.lookup(session.host()).await {
        Ok(ip) => session.with_resolution(Resolution::Resolved(ip)),
        Err(e) => {
            warn!("resolve {} failed: {}", session.host(), e);
            session.with_resolution(Resolution::Failed)
        }
    }
}

fn send_traffic(ctx: &TunnelContext, session: &Session, adapter: &str, len: usize, is_upload: bool) {
    ctx.stat(StatEvent::Traffic(TrafficInfo::new(
        session.host(),
        adapter,
        len as u64,
        is_upload,
    )));
}

impl<S> Display for Tunnel<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.session {
            Some(session) => write!(f, "tunnel {} ({} -> {})", self.id, self.remote_addr, session),
            None => write!(f, "tunnel {} ({})", self.id, self.remote_addr),
        }
    }
}
