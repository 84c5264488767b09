use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::warn;

/// Reports how much memory the process currently holds.
pub trait MemoryProbe {
    /// `None` when the figure is not available.
    fn resident_bytes(&self) -> Option<u64>;
}

/// Resident set size of the running process, read through sysinfo.
pub struct ProcessMemoryProbe {
    pid: Option<Pid>,
    sys: Mutex<System>,
}

impl ProcessMemoryProbe {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                warn!("can not get current pid: {}", e);
                None
            }
        };
        Self {
            pid,
            sys: Mutex::new(System::new()),
        }
    }
}

impl Default for ProcessMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for ProcessMemoryProbe {
    fn resident_bytes(&self) -> Option<u64> {
        let pid = self.pid?;
        let mut sys = self.sys.lock().ok()?;
        sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        sys.process(pid).map(|p| p.memory())
    }
}

/// A probe whose reading is set by hand.
#[derive(Debug, Default)]
pub struct FixedMemoryProbe {
    bytes: AtomicU64,
}

impl FixedMemoryProbe {
    pub fn new(bytes: u64) -> Self {
        Self {
            bytes: AtomicU64::new(bytes),
        }
    }

    pub fn set(&self, bytes: u64) {
        self.bytes.store(bytes, Ordering::Relaxed);
    }
}

impl MemoryProbe for FixedMemoryProbe {
    fn resident_bytes(&self) -> Option<u64> {
        Some(self.bytes.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_process_probe_reports_memory() {
        let probe = ProcessMemoryProbe::new();
        assert!(probe.resident_bytes().unwrap_or_default() > 0);
    }

    #[test]
    fn test_fixed_probe() {
        let probe = FixedMemoryProbe::new(10);
        assert_eq!(probe.resident_bytes(), Some(10));
        probe.set(20);
        assert_eq!(probe.resident_bytes(), Some(20));
    }
}
