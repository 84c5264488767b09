use error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

const DEFAULT_THRESHOLD_BYTES: u64 = 13 * 1024 * 1024;
const DEFAULT_IDLE_CUTOFF_MS: u64 = 500;
const DEFAULT_PAUSE_DELAY_US: u64 = 100;
const DEFAULT_RESUME_DELAY_US: u64 = 500;
const DEFAULT_STAT_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub listeners: Vec<ListenerConfig>,
    #[serde(default = "default_true")]
    pub append_direct: bool,
    #[serde(default)]
    pub pressure: PressureConfig,
    #[serde(default = "default_stat_interval")]
    pub stat_interval_secs: u64,
    #[serde(default)]
    pub adapters: Vec<AdapterConfig>,
    #[serde(default)]
    pub rules: Vec<RuleDescriptor>,
}

impl Config {
    /// load config from resource folder, `env` picks the file
    pub fn load() -> Result<Self> {
        let env = env::var("env").unwrap_or("dev".to_string());
        let mut base_path = Self::get_resource_path()?;
        base_path.push(format!("config/relay_config_{}.yaml", env));
        Self::from_path(base_path)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("load config from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for (i, adapter) in self.adapters.iter().enumerate() {
            if !ids.insert(adapter.id.to_string()) {
                return Err(Error::config(format!("adapters[{}].id", i), format!("duplicated adapter id {}", adapter.id)));
            }
        }
        if self.pressure.threshold_bytes == 0 {
            return Err(Error::config("pressure.threshold_bytes", "must be greater than zero"));
        }
        Ok(())
    }

    /// get resources folder path
    pub fn get_resource_path() -> Result<PathBuf> {
        // get root path
        let mut path = std::env::current_dir()?;
        loop {
            let mut p = path.clone();
            p.push("resources");
            if p.is_dir() {
                return Ok(p);
            }
            if !path.pop() {
                return Err(Error::from("fail to get resource path"));
            }
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_stat_interval() -> u64 {
    DEFAULT_STAT_INTERVAL_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    pub addr: SocketAddr,
}

/// Tuning of the memory pressure guard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PressureConfig {
    pub threshold_bytes: u64,
    pub idle_cutoff_ms: u64,
    pub pause_delay_us: u64,
    pub resume_delay_us: u64,
}

impl Default for PressureConfig {
    fn default() -> Self {
        Self {
            threshold_bytes: DEFAULT_THRESHOLD_BYTES,
            idle_cutoff_ms: DEFAULT_IDLE_CUTOFF_MS,
            pause_delay_us: DEFAULT_PAUSE_DELAY_US,
            resume_delay_us: DEFAULT_RESUME_DELAY_US,
        }
    }
}

impl PressureConfig {
    pub fn idle_cutoff(&self) -> Duration {
        Duration::from_millis(self.idle_cutoff_ms)
    }

    pub fn pause_delay(&self) -> Duration {
        Duration::from_micros(self.pause_delay_us)
    }

    pub fn resume_delay(&self) -> Duration {
        Duration::from_micros(self.resume_delay_us)
    }
}

/// Adapter ids may be written as strings or integers; both compare as text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum AdapterId {
    Number(i64),
    Name(String),
}

impl Display for AdapterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterId::Number(n) => write!(f, "{}", n),
            AdapterId::Name(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    Direct,
    Http,
    Vmess,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Tcp,
    Ws,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    pub id: AdapterId,
    #[serde(rename = "type")]
    pub kind: AdapterKind,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub uuid: Option<String>,
    pub alter_id: Option<u16>,
    pub path: Option<String>,
    pub transport: Option<TransportKind>,
    #[serde(default)]
    pub tls: bool,
}

/// One rule entry, validated later against the adapter registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleDescriptor {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub adapter: Option<AdapterId>,
    pub country: Option<String>,
    #[serde(rename = "match")]
    pub matches: Option<bool>,
    pub file: Option<PathBuf>,
    pub criteria: Option<Vec<String>>,
}
