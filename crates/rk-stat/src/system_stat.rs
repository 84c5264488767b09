use rk_common::stat::{StatType, SystemStatSnapshot};
use sysinfo::System;

use crate::memory::{MemoryProbe, ProcessMemoryProbe};
use crate::StatCollectable;

pub struct SystemStat {
    sys: System,
    process: ProcessMemoryProbe,
}

impl StatCollectable for SystemStat {
    fn stat_type(&self) -> StatType {
        StatType::System
    }

    fn _collect(&mut self) -> String {
        self.sys.refresh_cpu_usage();
        self.sys.refresh_memory();

        let cpu_usage = self.sys.global_cpu_usage();
        let total = self.sys.total_memory();
        let memory_usage = if total == 0 {
            0.0
        } else {
            self.sys.used_memory() as f32 / total as f32
        };
        let snap = SystemStatSnapshot {
            cpu_usage,
            memory_usage,
            process_memory: self.process.resident_bytes().unwrap_or_default(),
        };
        serde_json::to_string(&snap).unwrap_or_default()
    }
}

impl SystemStat {
    pub fn new() -> Self {
        Self {
            sys: System::new(),
            process: ProcessMemoryProbe::new(),
        }
    }
}
