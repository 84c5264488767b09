use std::sync::Arc;

use config::PressureConfig;
use rk_stat::MemoryProbe;

/// Compares the process footprint against the configured threshold.
pub struct PressureMonitor {
    probe: Arc<dyn MemoryProbe + Send + Sync>,
    config: PressureConfig,
}

impl PressureMonitor {
    pub fn new(probe: Arc<dyn MemoryProbe + Send + Sync>, config: PressureConfig) -> Self {
        Self { probe, config }
    }

    pub fn config(&self) -> &PressureConfig {
        &self.config
    }

    pub fn resident_bytes(&self) -> Option<u64> {
        self.probe.resident_bytes()
    }

    /// An unreadable probe never counts as pressure.
    pub fn is_under_pressure(&self) -> bool {
        self.resident_bytes()
            .map(|bytes| bytes > self.config.threshold_bytes)
            .unwrap_or(false)
    }
}
