///
/// SOCKS5 protocol implementation details.
///
/// RFC 1928: https://datatracker.ietf.org/doc/html/rfc1928
/// RFC 1929: https://datatracker.ietf.org/doc/html/rfc1929
///
use crate::common::error::{InvalidValue, ProxyError};
use anyhow::bail;

pub mod handshake;
pub mod relay;
pub mod subnego;


#[rustfmt::skip]
pub mod consts {
    pub const SOCKS5_VERSION: u8 = 0x05;
    pub const SUBNEGOTIATION_VERSION: u8 = 0x01;

    pub mod auth {
        pub const SOCKS5_AUTH_METHOD_NONE: u8 = 0x00;
        pub const SOCKS5_AUTH_METHOD_GSSAPI: u8 = 0x01;
        pub const SOCKS5_AUTH_METHOD_PASSWORD: u8 = 0x02;
        pub const SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE: u8 = 0xff;
    }

    pub mod command {
        pub const SOCKS5_CMD_CONNECT: u8 = 0x01;
        pub const SOCKS5_CMD_BIND: u8 = 0x02;
        pub const SOCKS5_CMD_UDP_ASSOCIATE: u8 = 0x03;
    }

    pub mod address {
        pub const SOCKS5_ADDR_TYPE_IPV4: u8 = 0x01;
        pub const SOCKS5_ADDR_TYPE_DOMAIN_NAME: u8 = 0x03;
        pub const SOCKS5_ADDR_TYPE_IPV6: u8 = 0x04;
    }

    pub mod reply {
        pub const SOCKS5_REPLY_SUCCEEDED: u8 = 0x00;
        pub const SOCKS5_REPLY_GENERAL_FAILURE: u8 = 0x01;
        pub const SOCKS5_REPLY_CONNECTION_NOT_ALLOWED: u8 = 0x02;
        pub const SOCKS5_REPLY_NETWORK_UNREACHABLE: u8 = 0x03;
        pub const SOCKS5_REPLY_HOST_UNREACHABLE: u8 = 0x04;
        pub const SOCKS5_REPLY_CONNECTION_REFUSED: u8 = 0x05;
        pub const SOCKS5_REPLY_TTL_EXPIRED: u8 = 0x06;
        pub const SOCKS5_REPLY_COMMAND_NOT_SUPPORTED: u8 = 0x07;
        pub const SOCKS5_REPLY_ADDRESS_TYPE_NOT_SUPPORTED: u8 = 0x08;
    }
}

/// Authentication method offered during the handshake (RFC 1928 §3).
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum AuthMethod {
    NoAuth = consts::auth::SOCKS5_AUTH_METHOD_NONE,
    GssApi = consts::auth::SOCKS5_AUTH_METHOD_GSSAPI,
    UserPass = consts::auth::SOCKS5_AUTH_METHOD_PASSWORD,
}

impl AuthMethod {
    pub fn from_byte(value: u8) -> Option<AuthMethod> {
        use consts::auth::*;
        match value {
            SOCKS5_AUTH_METHOD_NONE => Some(AuthMethod::NoAuth),
            SOCKS5_AUTH_METHOD_GSSAPI => Some(AuthMethod::GssApi),
            SOCKS5_AUTH_METHOD_PASSWORD => Some(AuthMethod::UserPass),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Request command (RFC 1928 §4).
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Command {
    Connect = consts::command::SOCKS5_CMD_CONNECT,
    Bind = consts::command::SOCKS5_CMD_BIND,
    UdpAssociate = consts::command::SOCKS5_CMD_UDP_ASSOCIATE,
}

impl TryFrom<u8> for Command {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> anyhow::Result<Self> {
        use consts::command::*;
        match value {
            SOCKS5_CMD_CONNECT => Ok(Command::Connect),
            SOCKS5_CMD_BIND => Ok(Command::Bind),
            SOCKS5_CMD_UDP_ASSOCIATE => Ok(Command::UdpAssociate),
            other => bail!(ProxyError::DataError(InvalidValue::SocksCommand(other))),
        }
    }
}

/// Reply status byte (RFC 1928 §6), the subset this proxy ever emits per
/// spec.md §4.H ("Reply code set used by the machine").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    Succeeded,
    GeneralFailure,
    NetworkUnreachable,
    HostUnreachable,
    ConnectionRefused,
    CommandNotSupported,
    AddressTypeNotSupported,
}

impl ReplyStatus {
    #[rustfmt::skip]
    pub fn as_byte(self) -> u8 {
        use consts::reply::*;
        match self {
            ReplyStatus::Succeeded               => SOCKS5_REPLY_SUCCEEDED,
            ReplyStatus::GeneralFailure           => SOCKS5_REPLY_GENERAL_FAILURE,
            ReplyStatus::NetworkUnreachable       => SOCKS5_REPLY_NETWORK_UNREACHABLE,
            ReplyStatus::HostUnreachable          => SOCKS5_REPLY_HOST_UNREACHABLE,
            ReplyStatus::ConnectionRefused         => SOCKS5_REPLY_CONNECTION_REFUSED,
            ReplyStatus::CommandNotSupported       => SOCKS5_REPLY_COMMAND_NOT_SUPPORTED,
            ReplyStatus::AddressTypeNotSupported   => SOCKS5_REPLY_ADDRESS_TYPE_NOT_SUPPORTED,
        }
    }
}

impl From<&ProxyError> for ReplyStatus {
    fn from(err: &ProxyError) -> Self {
        match err {
            ProxyError::UnsupportedCommand(_) => ReplyStatus::CommandNotSupported,
            ProxyError::DataError(InvalidValue::AddressType(_)) => ReplyStatus::AddressTypeNotSupported,
            ProxyError::HostUnreachable(_) => ReplyStatus::HostUnreachable,
            ProxyError::ConnectionRefused(_) => ReplyStatus::ConnectionRefused,
            ProxyError::NetworkUnreachable(_) => ReplyStatus::NetworkUnreachable,
            ProxyError::DialFailed(..) => ReplyStatus::HostUnreachable,
            _ => ReplyStatus::GeneralFailure,
        }
    }
}

impl From<&anyhow::Error> for ReplyStatus {
    fn from(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<ProxyError>() {
            Some(proxy_err) => ReplyStatus::from(proxy_err),
            None => ReplyStatus::GeneralFailure,
        }
    }
}
