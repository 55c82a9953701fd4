use crate::{
    common::{error::ProxyError, net::Address},
    dialer::Dialer,
    net,
    proto::socks5::{consts, AuthMethod, ReplyStatus},
};
use anyhow::{bail, Result};
use async_trait::async_trait;
use bytes::BytesMut;
use std::net::SocketAddr;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

/// Dials targets through a local SOCKS5 proxy — Tor's `SOCKSPort` — instead
/// of the host network directly (spec.md §4.D). The destination is handed
/// over by name so the upstream resolves it, which is what keeps a `.onion`
/// destination routable and avoids leaking DNS queries to the host resolver.
///
/// This is a client role, so it speaks the wire format with raw reads/writes
/// rather than the server-side `ProxyRequest`/`ProxyResponse` types.
pub struct UpstreamSocks5Dialer {
    proxy_addr: SocketAddr,
    control_addr: SocketAddr,
}

impl UpstreamSocks5Dialer {
    pub fn new(proxy_addr: SocketAddr, control_addr: SocketAddr) -> UpstreamSocks5Dialer {
        UpstreamSocks5Dialer { proxy_addr, control_addr }
    }

    /// Opens a plain TCP connection to the control port, used by the
    /// rotation controller to issue `NEWNYM` signals.
    pub async fn dial_control(&self) -> Result<TcpStream> {
        net::establish_tcp_connection(self.control_addr).await
    }
}

#[async_trait]
impl Dialer for UpstreamSocks5Dialer {
    async fn dial(&self, target: &Address) -> Result<TcpStream> {
        let mut stream = net::establish_tcp_connection(self.proxy_addr).await?;

        stream.write_all(&[consts::SOCKS5_VERSION, 0x01, AuthMethod::NoAuth.as_byte()]).await?;
        let mut method_reply = [0u8; 2];
        stream.read_exact(&mut method_reply).await?;
        if method_reply[0] != consts::SOCKS5_VERSION || method_reply[1] != AuthMethod::NoAuth.as_byte() {
            bail!(ProxyError::NoAcceptableAuthMethod);
        }

        let mut request = BytesMut::new();
        request.extend_from_slice(&[consts::SOCKS5_VERSION, consts::command::SOCKS5_CMD_CONNECT, 0x00]);
        target.write_to(&mut request);
        stream.write_all(&request).await?;

        let mut header = [0u8; 3];
        stream.read_exact(&mut header).await?;
        let _bound_addr = Address::read_from(&mut stream).await?;

        if header[1] != ReplyStatus::Succeeded.as_byte() {
            bail!(ProxyError::DialFailed(target.to_string(), format!("upstream replied with status {:#04x}", header[1])));
        }

        Ok(stream)
    }
}
