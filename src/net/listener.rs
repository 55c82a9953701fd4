use anyhow::Result;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};

/// A bound listening socket for one protocol endpoint. Unlike a
/// protocol-sniffing listener that peeks the first byte to route a single
/// port between SOCKS5 and HTTP, each endpoint here is already bound to a
/// known protocol (spec.md §4.J): the server owns two of these, one per
/// listen address.
pub struct ProxyTcpListener {
    inner: TcpListener,
}

impl ProxyTcpListener {
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<ProxyTcpListener> {
        Ok(ProxyTcpListener { inner: TcpListener::bind(addr).await? })
    }

    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        self.inner.accept().await.map_err(anyhow::Error::from)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.local_addr().map_err(anyhow::Error::from)
    }
}
