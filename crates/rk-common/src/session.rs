use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Outcome of looking up the session host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    NotAttempted,
    Resolved(IpAddr),
    Failed,
}

/// Destination requested by one inbound connection.
///
/// A session never changes once the tunnel owns it; a DNS lookup produces a
/// new value through [`Session::with_resolution`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    host: String,
    port: u16,
    is_ip: bool,
    resolution: Resolution,
}

impl Session {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let bare = host.trim_start_matches('[').trim_end_matches(']');
        match bare.parse::<IpAddr>() {
            Ok(ip) => Self {
                host: bare.to_string(),
                port,
                is_ip: true,
                resolution: Resolution::Resolved(ip),
            },
            Err(_) => Self {
                host,
                port,
                is_ip: false,
                resolution: Resolution::NotAttempted,
            },
        }
    }

    pub fn with_resolution(self, resolution: Resolution) -> Self {
        if self.is_ip {
            return self;
        }
        Self { resolution, ..self }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_ip(&self) -> bool {
        self.is_ip
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// The destination ip, either literal or resolved.
    pub fn ip(&self) -> Option<IpAddr> {
        match self.resolution {
            Resolution::Resolved(ip) => Some(ip),
            _ => None,
        }
    }

    pub fn dns_failed(&self) -> bool {
        self.resolution == Resolution::Failed
    }

    pub fn address(&self) -> Address {
        if self.is_ip {
            if let Some(ip) = self.ip() {
                return Address::from(ip);
            }
        }
        Address::Domain(self.host.clone())
    }
}

impl Display for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.address() {
            Address::Ipv6(ip) => write!(f, "[{}]:{}", ip, self.port),
            _ => write!(f, "{}:{}", self.host, self.port),
        }
    }
}

/// Typed destination address as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Domain(String),
}

impl From<IpAddr> for Address {
    fn from(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(v4) => Address::Ipv4(v4),
            IpAddr::V6(v6) => Address::Ipv6(v6),
        }
    }
}
