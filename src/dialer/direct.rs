use crate::{
    common::{error::classify_dial_error, net::Address},
    dialer::Dialer,
    net,
    resolver::Resolver,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpStream;

/// Dials the destination directly off the host network, resolving domain
/// names through the configured [`Resolver`] first.
pub struct DirectDialer {
    resolver: Arc<dyn Resolver>,
    dest_timeout: Duration,
}

impl DirectDialer {
    pub fn new(resolver: Arc<dyn Resolver>, dest_timeout: Duration) -> DirectDialer {
        DirectDialer { resolver, dest_timeout }
    }

    async fn socket_addr(&self, target: &Address) -> Result<SocketAddr> {
        match target {
            Address::Ipv4(addr) => Ok(SocketAddr::V4(*addr)),
            Address::Ipv6(addr) => Ok(SocketAddr::V6(*addr)),
            Address::Domain { name, port, .. } => {
                let ip = self.resolver.resolve(name).await?;
                Ok(SocketAddr::new(ip, *port))
            }
        }
    }
}

#[async_trait]
impl Dialer for DirectDialer {
    async fn dial(&self, target: &Address) -> Result<TcpStream> {
        let sock_addr = self.socket_addr(target).await?;

        let dial = tokio::time::timeout(self.dest_timeout, net::establish_tcp_connection(sock_addr));
        match dial.await {
            Ok(result) => result.map_err(|err| classify_dial_error(&target.to_string(), &err).into()),
            Err(_) => Err(classify_dial_error(&target.to_string(), &anyhow::anyhow!(std::io::Error::from(std::io::ErrorKind::TimedOut))).into()),
        }
        .context(format!("dialing {target}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::DnsResolver;
    use std::net::Ipv4Addr;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn dials_ipv4_loopback_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let dialer = DirectDialer::new(Arc::new(DnsResolver), Duration::from_secs(2));
        let target = Address::Ipv4(std::net::SocketAddrV4::new(Ipv4Addr::LOCALHOST, port));

        let (accepted, dialed) = tokio::join!(listener.accept(), dialer.dial(&target));
        assert!(accepted.is_ok());
        assert!(dialed.is_ok());
    }

    #[tokio::test]
    async fn dial_refused_when_nothing_listens() {
        let dialer = DirectDialer::new(Arc::new(DnsResolver), Duration::from_secs(2));
        let target = Address::Ipv4(std::net::SocketAddrV4::new(Ipv4Addr::LOCALHOST, 1));
        let err = dialer.dial(&target).await.unwrap_err();
        assert!(err.downcast_ref::<crate::common::error::ProxyError>().is_some());
    }
}
