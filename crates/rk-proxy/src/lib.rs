mod activity;
mod pool;
mod pressure;
pub mod proxy_server;
mod resolver;
mod tunnel;

pub use activity::Activity;
pub use pool::{TunnelHandle, TunnelPool};
pub use pressure::PressureMonitor;
pub use proxy_server::ProxyServer;
pub use resolver::{Resolver, StaticResolver, SystemResolver};
pub use tunnel::Tunnel;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use error::Result;
use rk_adapter::AdapterFactoryRef;
use rk_rule::RuleManager;
use rk_stat::StatEvent;
use tokio::{net::TcpStream, sync::mpsc::UnboundedSender};
use tracing::error;

#[async_trait::async_trait]
pub trait Server {
    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    async fn handle_connection(&self, conn: TcpStream, remote_addr: SocketAddr) {
        let _ = conn.set_linger(Some(Duration::from_secs(0)));

        self._handle(conn, remote_addr).await;
    }

    async fn _handle(&self, conn: TcpStream, remote_addr: SocketAddr);
}

/// Everything a tunnel needs from the process, passed down explicitly.
pub struct TunnelContext {
    pub rules: Arc<RuleManager<AdapterFactoryRef>>,
    pub resolver: Arc<dyn Resolver>,
    pub pressure: PressureMonitor,
    pub pool: TunnelPool,
    stat_sender: UnboundedSender<StatEvent>,
}

impl TunnelContext {
    pub fn new(
        rules: Arc<RuleManager<AdapterFactoryRef>>,
        resolver: Arc<dyn Resolver>,
        pressure: PressureMonitor,
        pool: TunnelPool,
        stat_sender: UnboundedSender<StatEvent>,
    ) -> Self {
        Self {
            rules,
            resolver,
            pressure,
            pool,
            stat_sender,
        }
    }

    pub fn stat(&self, event: StatEvent) {
        if let Err(e) = self.stat_sender.send(event) {
            error!("send stat event error: {}", e);
        }
    }
}
