use crate::common::error::{InvalidValue, ProxyError};
use crate::proto::socks5::consts::address::*;
use anyhow::{bail, Result};
use bytes::BufMut;
use std::{
    fmt::Display,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6},
};
use tokio::io::AsyncReadExt;

/// A SOCKS5 `ATYP`-tagged address: exactly one of IPv4, IPv6, or a domain
/// name is populated (spec.md §3 "Address specification"). A domain-name
/// address that has not been resolved carries `resolved: None`; once
/// resolved both the domain and the IP are retained so logs and reply
/// framing can use either.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Ipv4(SocketAddrV4),
    Ipv6(SocketAddrV6),
    Domain { name: String, port: u16, resolved: Option<IpAddr> },
}

impl Address {
    pub fn port(&self) -> u16 {
        match self {
            Address::Ipv4(addr) => addr.port(),
            Address::Ipv6(addr) => addr.port(),
            Address::Domain { port, .. } => *port,
        }
    }

    /// Returns the already-known socket address, if any, without performing
    /// resolution. IPv4/IPv6 addresses always return `Some`; an unresolved
    /// domain returns `None`.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        match self {
            Address::Ipv4(addr) => Some(SocketAddr::V4(*addr)),
            Address::Ipv6(addr) => Some(SocketAddr::V6(*addr)),
            Address::Domain { resolved: Some(ip), port, .. } => Some(SocketAddr::new(*ip, *port)),
            Address::Domain { resolved: None, .. } => None,
        }
    }

    /// Host string suitable for passing to a dialer's `host:port` parameter:
    /// the domain name when present, otherwise the literal IP.
    pub fn host(&self) -> String {
        match self {
            Address::Ipv4(addr) => addr.ip().to_string(),
            Address::Ipv6(addr) => addr.ip().to_string(),
            Address::Domain { name, .. } => name.clone(),
        }
    }

    pub async fn read_from<T: AsyncReadExt + Unpin>(stream: &mut T) -> Result<Address> {
        let atyp = stream.read_u8().await?;
        match atyp {
            SOCKS5_ADDR_TYPE_IPV4 => Address::read_ipv4(stream).await,
            SOCKS5_ADDR_TYPE_IPV6 => Address::read_ipv6(stream).await,
            SOCKS5_ADDR_TYPE_DOMAIN_NAME => Address::read_domain_name(stream).await,
            other => bail!(ProxyError::DataError(InvalidValue::AddressType(other))),
        }
    }

    async fn read_ipv4<T: AsyncReadExt + Unpin>(stream: &mut T) -> Result<Address> {
        let ip = Ipv4Addr::from(stream.read_u32().await?);
        let port = stream.read_u16().await?;
        Ok(Address::Ipv4(SocketAddrV4::new(ip, port)))
    }

    async fn read_ipv6<T: AsyncReadExt + Unpin>(stream: &mut T) -> Result<Address> {
        let ip = Ipv6Addr::from(stream.read_u128().await?);
        let port = stream.read_u16().await?;
        Ok(Address::Ipv6(SocketAddrV6::new(ip, port, 0, 0)))
    }

    async fn read_domain_name<T: AsyncReadExt + Unpin>(stream: &mut T) -> Result<Address> {
        let len = stream.read_u8().await?;
        let mut buf = vec![0u8; len as usize];
        stream.read_exact(&mut buf).await?;

        let name = String::from_utf8(buf).map_err(ProxyError::DomainNameDecodingFailed)?;
        let port = stream.read_u16().await?;

        Ok(Address::Domain { name, port, resolved: None })
    }

    /// Encodes the ATYP-tagged address body (not including any reply
    /// version/status bytes) per spec.md §4.F. A domain address is always
    /// encoded by name, never by its cached resolved IP.
    pub fn write_to<T: BufMut>(&self, buf: &mut T) {
        match self {
            Address::Ipv4(addr) => {
                buf.put_u8(SOCKS5_ADDR_TYPE_IPV4);
                buf.put_slice(&addr.ip().octets());
                buf.put_u16(addr.port());
            }
            Address::Ipv6(addr) => {
                buf.put_u8(SOCKS5_ADDR_TYPE_IPV6);
                buf.put_slice(&addr.ip().octets());
                buf.put_u16(addr.port());
            }
            Address::Domain { name, port, .. } => {
                buf.put_u8(SOCKS5_ADDR_TYPE_DOMAIN_NAME);
                buf.put_u8(name.len() as u8);
                buf.put_slice(name.as_bytes());
                buf.put_u16(*port);
            }
        }
    }

    /// Encodes a null address: IPv4 `0.0.0.0:0`, used for replies that carry
    /// no meaningful bind address (spec.md §4.F).
    pub fn write_null<T: BufMut>(buf: &mut T) {
        buf.put_u8(SOCKS5_ADDR_TYPE_IPV4);
        buf.put_slice(&[0, 0, 0, 0]);
        buf.put_u16(0);
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => Address::Ipv4(v4),
            SocketAddr::V6(v6) => Address::Ipv6(v6),
        }
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Address::Ipv4(addr) => write!(f, "{addr}"),
            Address::Ipv6(addr) => write!(f, "[{}]:{}", addr.ip(), addr.port()),
            Address::Domain { name, port, .. } => write!(f, "{name}:{port}"),
        }
    }
}
