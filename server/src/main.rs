mod stat_logger;

use std::sync::Arc;
use std::time::Duration;

use config::Config;
use error::{Error, Result};
use rk_adapter::AdapterFactoryManager;
use rk_common::stat::StatType;
use rk_proxy::{PressureMonitor, ProxyServer, Server, SystemResolver, TunnelContext, TunnelPool};
use rk_rule::{parse_rules, RuleManager};
use rk_stat::{ProcessMemoryProbe, StatisticManager};
use strum::IntoEnumIterator;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::stat_logger::StatLogger;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    // also routes `log` records into tracing
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .try_init()
        .map_err(|e| Error::Message(format!("setting default subscriber failed: {}", e)))?;

    let config = match args::init_config_arg() {
        Some(path) => Config::from_path(path)?,
        None => Config::load()?,
    };
    if config.listeners.is_empty() {
        return Err(Error::config("listeners", "at least one listener is required"));
    }

    // adapters first, rules refer to them by id
    let registry = AdapterFactoryManager::from_config(&config.adapters)?;
    let rules = parse_rules(&config.rules, |id| registry.get(id))?;
    info!("{} adapters, {} rules, append direct: {}", registry.len(), rules.len(), config.append_direct);
    let rules = Arc::new(RuleManager::new(rules, registry.direct(), config.append_direct));

    // create statistic manager
    let (stat_sender, stat_receiver) = tokio::sync::mpsc::unbounded_channel();
    let mut stat_manager = StatisticManager::new(stat_receiver, Duration::from_secs(config.stat_interval_secs));
    let mut stat_logger = StatLogger::new();
    for stat_type in StatType::iter() {
        stat_logger.add_subscribe(stat_manager.subscribe(stat_type));
    }

    let pressure = PressureMonitor::new(Arc::new(ProcessMemoryProbe::new()), config.pressure.clone());
    let pool = TunnelPool::spawn(config.pressure.idle_cutoff(), stat_sender.clone());
    let ctx = Arc::new(TunnelContext::new(
        rules,
        Arc::new(SystemResolver::new()?),
        pressure,
        pool,
        stat_sender,
    ));

    let mut servers = Vec::new();
    for listener in &config.listeners {
        match ProxyServer::bind(listener.addr, ctx.clone()).await {
            Ok(server) => servers.push(Arc::new(server)),
            Err(e) => error!("fail to bind {}, error: {}", listener.addr, e),
        }
    }
    if servers.is_empty() {
        return Err(Error::from("no listener could be bound"));
    }

    info!("start stat manager");
    tokio::spawn(async move {
        stat_manager.run().await;
    });
    tokio::spawn(async move {
        stat_logger.run().await;
    });

    info!("start proxy server");
    let mut handlers = Vec::new();
    for server in servers.iter().cloned() {
        handlers.push(tokio::spawn(async move {
            if let Err(e) = server.start().await {
                error!("proxy server exit with error: {}", e);
            }
        }));
    }

    tokio::signal::ctrl_c().await?;
    info!("receive ctrl-c, shutting down");
    for server in &servers {
        server.stop().await?;
    }
    futures::future::join_all(handlers).await;
    Ok(())
}
