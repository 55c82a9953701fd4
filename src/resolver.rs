use crate::common::error::ProxyError;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::net::IpAddr;
use tokio::net::lookup_host;

/// Maps a hostname to a single IP address using the host's name resolution
/// facility (spec.md §4.A). The core uses only the first address returned;
/// IPv4/IPv6 preference is delegated entirely to the host stack.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, name: &str) -> Result<IpAddr>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DnsResolver;

#[async_trait]
impl Resolver for DnsResolver {
    async fn resolve(&self, name: &str) -> Result<IpAddr> {
        // lookup_host requires a "host:port" pair; the port is discarded.
        let mut addrs = lookup_host((name, 0))
            .await
            .map_err(|_| anyhow!(ProxyError::HostUnreachable(name.to_string())))?;

        addrs
            .next()
            .map(|addr| addr.ip())
            .ok_or_else(|| anyhow!(ProxyError::HostUnreachable(name.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_loopback_name() {
        let resolver = DnsResolver;
        let ip = resolver.resolve("localhost").await.unwrap();
        assert!(ip.is_loopback());
    }

    #[tokio::test]
    async fn unresolvable_name_is_host_unreachable() {
        let resolver = DnsResolver;
        let err = resolver.resolve("this-name-should-never-resolve.invalid").await.unwrap_err();
        assert!(err.downcast_ref::<ProxyError>().is_some());
    }
}
