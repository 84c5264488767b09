use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::EnumIter;

use crate::TrafficInfo;

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, EnumIter, Serialize, Deserialize)]
pub enum StatType {
    Traffic,
    Connection,
    Tunnel,
    System,
}

impl Display for StatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                StatType::Traffic => "traffic",
                StatType::Connection => "connection",
                StatType::Tunnel => "tunnel",
                StatType::System => "system",
            }
        )
    }
}

impl FromStr for StatType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "traffic" => Ok(StatType::Traffic),
            "connection" => Ok(StatType::Connection),
            "tunnel" => Ok(StatType::Tunnel),
            "system" => Ok(StatType::System),
            _ => Err(format!("unknown stat type {}", s)),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatData {
    pub stat_type: StatType,
    pub data: String,
    pub timestamp: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectionStatSnapshot {
    pub alive_in_connection: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficTotalStatSnapshot {
    pub total: u64,
    pub upload: u64,
    pub download: u64,
}

/// Totals plus the per host/adapter breakdown since the last collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficStatSnapshot {
    pub total: TrafficTotalStatSnapshot,
    pub hosts: Vec<TrafficInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TunnelStatSnapshot {
    pub opened: u64,
    pub closed: u64,
    pub evicted: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatSnapshot {
    pub cpu_usage: f32,
    pub memory_usage: f32,
    pub process_memory: u64,
}
