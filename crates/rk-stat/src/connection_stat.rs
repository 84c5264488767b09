use std::sync::atomic::{AtomicI64, Ordering};

use rk_common::stat::ConnectionStatSnapshot;

use crate::StatCollectable;

pub struct ConnectionStat {
    alive: AtomicI64,
}

impl StatCollectable for ConnectionStat {
    fn stat_type(&self) -> crate::StatType {
        crate::StatType::Connection
    }

    /// A gauge, so collecting does not reset it.
    fn _collect(&mut self) -> String {
        let snap = ConnectionStatSnapshot {
            alive_in_connection: self.alive.load(Ordering::Relaxed),
        };
        serde_json::to_string(&snap).unwrap_or_default()
    }
}

impl ConnectionStat {
    pub fn new() -> Self {
        Self {
            alive: AtomicI64::new(0),
        }
    }

    pub fn add(&self, in_conn: i64) {
        self.alive.fetch_add(in_conn, Ordering::Relaxed);
    }
}
