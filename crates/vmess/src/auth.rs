use std::time::{SystemTime, UNIX_EPOCH};

use error::{Error, Result};
use hmac::{Hmac, Mac};
use md5::Md5;
use uuid::Uuid;

type HmacMd5 = Hmac<Md5>;

/// Rolling handshake signature: HMAC-MD5 keyed by the user id over the
/// current unix timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmessAuth {
    identity: [u8; 16],
    timestamp: [u8; 8],
}

impl VmessAuth {
    pub fn new(uuid: Uuid) -> Self {
        Self {
            identity: uuid.into_bytes(),
            timestamp: now(),
        }
    }

    pub fn parse(uuid: &str) -> Result<Self> {
        Ok(Self::new(Uuid::parse_str(uuid)?))
    }

    /// Take a fresh timestamp. The server only accepts a narrow window, so
    /// every handshake refreshes before signing.
    pub fn update(&mut self) {
        self.timestamp = now();
    }

    pub fn identity(&self) -> &[u8; 16] {
        &self.identity
    }

    pub fn timestamp(&self) -> &[u8; 8] {
        &self.timestamp
    }

    pub fn serialize(&self) -> Result<[u8; 16]> {
        let mut mac = <HmacMd5 as Mac>::new_from_slice(&self.identity)
            .map_err(|e| Error::Crypto(e.to_string()))?;
        mac.update(&self.timestamp);
        Ok(mac.finalize().into_bytes().into())
    }

    #[cfg(test)]
    pub(crate) fn with_timestamp(uuid: Uuid, ts: u64) -> Self {
        Self {
            identity: uuid.into_bytes(),
            timestamp: ts.to_be_bytes(),
        }
    }
}

fn now() -> [u8; 8] {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    secs.to_be_bytes()
}
