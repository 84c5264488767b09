use std::net::IpAddr;

use error::{Error, Result};
use ipnet::IpNet;

/// A CIDR block or an inclusive `start-end` span of one address family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpRange {
    Cidr(IpNet),
    Range(IpAddr, IpAddr),
}

impl IpRange {
    /// Accepts `10.0.0.0/8`, `1.2.3.4` or `1.2.3.4-1.2.3.9`.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.contains('/') {
            let net: IpNet = raw
                .parse()
                .map_err(|e| Error::Message(format!("invalid cidr {raw}: {e}")))?;
            return Ok(IpRange::Cidr(net));
        }
        if let Some((start, end)) = raw.split_once('-') {
            let start = parse_ip(start)?;
            let end = parse_ip(end)?;
            if start.is_ipv4() != end.is_ipv4() {
                return Err(Error::Message(format!("mixed address families in {raw}")));
            }
            if start > end {
                return Err(Error::Message(format!("range start after end in {raw}")));
            }
            return Ok(IpRange::Range(start, end));
        }
        let ip = parse_ip(raw)?;
        Ok(IpRange::Range(ip, ip))
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        match self {
            IpRange::Cidr(net) => net.contains(&ip),
            IpRange::Range(start, end) => {
                start.is_ipv4() == ip.is_ipv4() && *start <= ip && ip <= *end
            }
        }
    }
}

fn parse_ip(raw: &str) -> Result<IpAddr> {
    raw.trim()
        .parse()
        .map_err(|e| Error::Message(format!("invalid ip {raw}: {e}")))
}
