use std::net::IpAddr;

use ipnet::IpNet;

/// Maps an address to an ISO country code.
pub trait CountryLookup {
    fn country(&self, ip: IpAddr) -> Option<String>;
}

/// Used when no geo database is configured; no address has a country.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCountryLookup;

impl CountryLookup for NoCountryLookup {
    fn country(&self, _ip: IpAddr) -> Option<String> {
        None
    }
}

/// Table of networks to country codes, first hit wins.
#[derive(Debug, Default, Clone)]
pub struct CidrCountryLookup {
    entries: Vec<(IpNet, String)>,
}

impl CidrCountryLookup {
    pub fn new(entries: Vec<(IpNet, String)>) -> Self {
        Self { entries }
    }
}

impl CountryLookup for CidrCountryLookup {
    fn country(&self, ip: IpAddr) -> Option<String> {
        self.entries
            .iter()
            .find(|(net, _)| net.contains(&ip))
            .map(|(_, code)| code.clone())
    }
}
