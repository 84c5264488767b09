use serde::{Deserialize, Serialize};

pub mod session;
pub mod stat;

pub use session::{Address, Resolution, Session};

/// Identity of a tunnel inside the live set.
pub type TunnelId = u64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrafficInfo {
    pub host: String,
    pub adapter: String,
    pub upload: u64,
    pub download: u64,
}

impl TrafficInfo {
    pub fn new(host: &str, adapter: &str, traffic: u64, is_upload: bool) -> TrafficInfo {
        let (upload, download) = if is_upload {
            (traffic, 0)
        } else {
            (0, traffic)
        };
        TrafficInfo {
            upload,
            download,
            host: host.to_string(),
            adapter: adapter.to_string(),
        }
    }

    pub fn get_key(&self) -> String {
        format!("{}-{}", self.host, self.adapter)
    }
}
