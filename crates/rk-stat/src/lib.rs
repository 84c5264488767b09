use std::collections::HashMap;

use chrono::Utc;
use rk_common::{
    stat::{StatData, StatType},
    TrafficInfo,
};
use tokio::sync::{broadcast::Sender, mpsc::UnboundedReceiver};
use tracing::{debug, error, info};

pub use memory::{FixedMemoryProbe, MemoryProbe, ProcessMemoryProbe};
pub use tunnel_stat::TunnelEvent;

mod connection_stat;
mod memory;
mod system_stat;
mod traffic_stat;
mod tunnel_stat;

pub struct StatisticManager {
    traffic: traffic_stat::TrafficStat,
    connection_stat: connection_stat::ConnectionStat,
    tunnel_stat: tunnel_stat::TunnelStat,
    system_stat: system_stat::SystemStat,
    subscribed: HashMap<StatType, Sender<StatData>>,
    listener: UnboundedReceiver<StatEvent>,
    interval: tokio::time::Duration,
}

impl StatisticManager {
    pub fn new(listener: UnboundedReceiver<StatEvent>, interval: tokio::time::Duration) -> Self {
        Self {
            traffic: traffic_stat::TrafficStat::new(),
            connection_stat: connection_stat::ConnectionStat::new(),
            tunnel_stat: tunnel_stat::TunnelStat::new(),
            system_stat: system_stat::SystemStat::new(),
            subscribed: HashMap::with_capacity(4),
            listener,
            interval,
        }
    }

    pub fn subscribe(&mut self, stat_type: StatType) -> tokio::sync::broadcast::Receiver<StatData> {
        if let Some(tx) = self.subscribed.get(&stat_type) {
            return tx.subscribe();
        }
        let (tx, rx) = tokio::sync::broadcast::channel(500);
        self.subscribed.insert(stat_type, tx);
        rx
    }

    pub fn collect_stat(&mut self) {
        for (stat_type, tx) in &self.subscribed {
            let stat = match stat_type {
                StatType::Traffic => self.traffic.collect(),
                StatType::Connection => self.connection_stat.collect(),
                StatType::Tunnel => self.tunnel_stat.collect(),
                StatType::System => self.system_stat.collect(),
            };
            if stat.data.is_empty() {
                continue;
            }
            if let Err(e) = tx.send(stat) {
                error!("send stat error: {}", e);
            }
        }
    }

    pub fn handle_event(&mut self, event: StatEvent) {
        match event {
            StatEvent::Traffic(info) => {
                self.traffic.add(&info);
            }
            StatEvent::Connection(in_cnt) => {
                self.connection_stat.add(in_cnt);
            }
            StatEvent::Tunnel(event) => {
                self.tunnel_stat.add(event);
            }
        }
    }

    /// Runs until every event sender is dropped, then publishes a last
    /// collection.
    pub async fn run(&mut self) {
        let mut timer = tokio::time::interval(self.interval);
        timer.reset();
        loop {
            tokio::select! {
                _ = timer.tick() => {
                    debug!("try collect stat");
                    self.collect_stat();
                    timer.reset();
                }
                event = self.listener.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => break,
                    }
                }
            }
        }
        info!("stat channel closed");
        self.collect_stat();
    }
}

trait StatCollectable {
    fn stat_type(&self) -> StatType;
    fn _collect(&mut self) -> String;

    fn collect(&mut self) -> StatData {
        StatData {
            stat_type: self.stat_type(),
            data: self._collect(),
            timestamp: Utc::now().timestamp() as u64,
        }
    }
}

#[derive(Debug)]
pub enum StatEvent {
    Traffic(TrafficInfo),
    Connection(i64),
    Tunnel(TunnelEvent),
}
