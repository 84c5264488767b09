use std::collections::HashMap;
use std::net::IpAddr;

use anyhow::Context;
use async_trait::async_trait;
use error::Result;
use trust_dns_resolver::TokioAsyncResolver;

/// Host name lookup feeding the ip based rules.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn lookup(&self, host: &str) -> Result<IpAddr>;
}

/// Resolver configured from the operating system.
pub struct SystemResolver {
    inner: TokioAsyncResolver,
}

impl SystemResolver {
    pub fn new() -> Result<Self> {
        Ok(Self {
            inner: TokioAsyncResolver::tokio_from_system_conf()?,
        })
    }
}

#[async_trait]
impl Resolver for SystemResolver {
    async fn lookup(&self, host: &str) -> Result<IpAddr> {
        let response = self.inner.lookup_ip(host).await?;
        let ip = response.iter().next().context("no addresses returned")?;
        Ok(ip)
    }
}

/// Fixed host table; unknown hosts fail to resolve.
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    hosts: HashMap<String, IpAddr>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>, ip: IpAddr) -> Self {
        self.hosts.insert(host.into().to_lowercase(), ip);
        self
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn lookup(&self, host: &str) -> Result<IpAddr> {
        let ip = self
            .hosts
            .get(&host.to_lowercase())
            .copied()
            .with_context(|| format!("no record for {}", host))?;
        Ok(ip)
    }
}
