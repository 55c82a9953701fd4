pub mod listener;

use anyhow::Result;
use socket2::{SockRef, TcpKeepalive};
use std::time::Duration;
use tokio::net::{TcpStream, ToSocketAddrs};

/// TCP-level options applied to an established stream. Currently only
/// keepalive, since that's the one knob both the SOCKS5 and HTTP dialers
/// need set on outbound connections.
pub struct TcpConnectionOptions {
    keep_alive: Option<TcpKeepalive>,
}

impl TcpConnectionOptions {
    pub fn new() -> TcpConnectionOptions {
        TcpConnectionOptions { keep_alive: None }
    }

    pub fn set_keepalive(&mut self, keep_alive: TcpKeepalive) -> &mut TcpConnectionOptions {
        self.keep_alive = Some(keep_alive);
        self
    }

    pub fn apply_to(&self, tcp_stream: &TcpStream) -> Result<()> {
        let sock_ref = SockRef::from(tcp_stream);
        if let Some(keep_alive) = &self.keep_alive {
            sock_ref.set_tcp_keepalive(keep_alive)?;
        }
        Ok(())
    }
}

impl Default for TcpConnectionOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Establishes a TCP connection and applies `tcp_opts` to the resulting
/// socket before handing it back.
pub async fn establish_tcp_connection_with_opts(addr: impl ToSocketAddrs, tcp_opts: &TcpConnectionOptions) -> Result<TcpStream> {
    let tcp_stream = TcpStream::connect(addr).await?;
    tcp_opts.apply_to(&tcp_stream)?;
    Ok(tcp_stream)
}

/// Establishes a TCP connection with the keepalive profile every outbound
/// dial in the proxy uses.
pub async fn establish_tcp_connection(addr: impl ToSocketAddrs) -> Result<TcpStream> {
    let mut tcp_opts = TcpConnectionOptions::new();
    tcp_opts.set_keepalive(TcpKeepalive::new().with_time(Duration::from_secs(150)).with_interval(Duration::from_secs(30)).with_retries(5));
    establish_tcp_connection_with_opts(addr, &tcp_opts).await
}
