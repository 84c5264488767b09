use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use rk_common::{
    stat::{TrafficStatSnapshot, TrafficTotalStatSnapshot},
    TrafficInfo,
};

use crate::StatCollectable;

pub struct TrafficStat {
    total: AtomicU64,
    upload: AtomicU64,
    download: AtomicU64,
    hosts: DashMap<String, TrafficInfo>,
}

impl StatCollectable for TrafficStat {
    fn stat_type(&self) -> crate::StatType {
        crate::StatType::Traffic
    }

    fn _collect(&mut self) -> String {
        let snap = TrafficStatSnapshot {
            total: TrafficTotalStatSnapshot {
                total: self.total.swap(0, Ordering::Relaxed),
                upload: self.upload.swap(0, Ordering::Relaxed),
                download: self.download.swap(0, Ordering::Relaxed),
            },
            hosts: self.hosts.iter().map(|e| e.value().clone()).collect(),
        };
        match serde_json::to_string(&snap) {
            Ok(msg) => {
                self.hosts.clear();
                msg
            }
            Err(_) => "".to_string(),
        }
    }
}

impl TrafficStat {
    pub fn new() -> Self {
        Self {
            total: AtomicU64::new(0),
            upload: AtomicU64::new(0),
            download: AtomicU64::new(0),
            hosts: DashMap::new(),
        }
    }

    pub fn add(&self, info: &TrafficInfo) {
        self.total
            .fetch_add(info.upload + info.download, Ordering::Relaxed);
        self.upload.fetch_add(info.upload, Ordering::Relaxed);
        self.download.fetch_add(info.download, Ordering::Relaxed);
        self.hosts
            .entry(info.get_key())
            .and_modify(|old| {
                old.upload += info.upload;
                old.download += info.download;
            })
            .or_insert_with(|| info.clone());
    }
}
