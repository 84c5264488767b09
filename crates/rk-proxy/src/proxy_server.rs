use std::{net::SocketAddr, sync::Arc};

use error::Result;
use rk_stat::StatEvent;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::{Server, Tunnel, TunnelContext};

/// Accepts inbound clients and runs one tunnel per connection.
pub struct ProxyServer {
    listener: TcpListener,
    ctx: Arc<TunnelContext>,
    shutdown: broadcast::Sender<()>,
}

impl ProxyServer {
    pub fn new(listener: TcpListener, ctx: Arc<TunnelContext>) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        ProxyServer { listener, ctx, shutdown }
    }

    pub async fn bind(addr: SocketAddr, ctx: Arc<TunnelContext>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self::new(listener, ctx))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Hold back new connections while memory is over the threshold,
    /// recycling one idle tunnel per round.
    async fn relieve_pressure(&self) {
        let pressure = &self.ctx.pressure;
        while pressure.is_under_pressure() {
            warn!(
                "memory pressure: {:?} bytes resident, pause accepting",
                pressure.resident_bytes()
            );
            tokio::time::sleep(pressure.config().pause_delay()).await;
            let recycled = self.ctx.pool.recycle().await;
            tokio::time::sleep(pressure.config().resume_delay()).await;
            if recycled.is_none() {
                // nothing idle enough to drop
                break;
            }
        }
    }
}

#[async_trait::async_trait]
impl Server for ProxyServer {
    async fn start(&self) -> Result<()> {
        let mut shutdown_rx = self.shutdown.subscribe();
        info!("proxy server listening on {}", self.local_addr()?);
        loop {
            self.relieve_pressure().await;
            tokio::select! {
                res = self.listener.accept() => match res {
                    Ok((conn, remote_addr)) => {
                        debug!("accept connection from: {}", remote_addr);
                        self.handle_connection(conn, remote_addr).await;
                    }
                    Err(e) => {
                        error!("accept connection failed: {}", e);
                    }
                },
                _ = shutdown_rx.recv() => {
                    info!("proxy server on {} stopped accepting", self.local_addr()?);
                    return Ok(());
                }
            }
        }
    }

    async fn stop(&self) -> Result<()> {
        let _ = self.shutdown.send(());
        let closed = self.ctx.pool.stop().await;
        info!("proxy server stopped, {} tunnels closed", closed);
        Ok(())
    }

    async fn _handle(&self, conn: TcpStream, remote_addr: SocketAddr) {
        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            ctx.stat(StatEvent::Connection(1));
            let tunnel = Tunnel::new(ctx.clone(), conn, remote_addr);
            if let Err(e) = tunnel.run().await {
                debug!("handle connection error: {}", e);
            }
            ctx.stat(StatEvent::Connection(-1));
        });
    }
}
