use std::sync::atomic::{AtomicU64, Ordering};

use rk_common::stat::TunnelStatSnapshot;

use crate::StatCollectable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelEvent {
    Opened,
    Closed,
    /// Force closed to relieve memory pressure.
    Evicted,
}

pub struct TunnelStat {
    opened: AtomicU64,
    closed: AtomicU64,
    evicted: AtomicU64,
}

impl StatCollectable for TunnelStat {
    fn stat_type(&self) -> crate::StatType {
        crate::StatType::Tunnel
    }

    fn _collect(&mut self) -> String {
        let snap = TunnelStatSnapshot {
            opened: self.opened.swap(0, Ordering::Relaxed),
            closed: self.closed.swap(0, Ordering::Relaxed),
            evicted: self.evicted.swap(0, Ordering::Relaxed),
        };
        serde_json::to_string(&snap).unwrap_or_default()
    }
}

impl TunnelStat {
    pub fn new() -> Self {
        Self {
            opened: AtomicU64::new(0),
            closed: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    pub fn add(&self, event: TunnelEvent) {
        let counter = match event {
            TunnelEvent::Opened => &self.opened,
            TunnelEvent::Closed => &self.closed,
            TunnelEvent::Evicted => &self.evicted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
