use crate::proto::socks5::Command;
use thiserror::Error;

/// Errors surfaced by the proxy core. Each variant maps to a disposition
/// documented alongside the component that raises it: a SOCKS5 reply code,
/// an HTTP status, or simply "drop the connection".
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("data has incorrect / corrupted field: {0}")]
    DataError(#[from] InvalidValue),

    #[error("failed UTF-8 decoding of domain name: {0}")]
    DomainNameDecodingFailed(std::string::FromUtf8Error),

    #[error("unsupported SOCKS command: {0:?}")]
    UnsupportedCommand(Command),

    #[error("unable to agree on an authentication method")]
    NoAcceptableAuthMethod,

    #[error("unsupported authentication sub-negotiation version: {0:#04x}")]
    UnsupportedAuthVersion(u8),

    #[error("authentication failed for user {0:?}")]
    AuthFailure(Option<String>),

    #[error("unable to resolve host: {0}")]
    HostUnreachable(String),

    #[error("connection refused by {0}")]
    ConnectionRefused(String),

    #[error("network unreachable while dialing {0}")]
    NetworkUnreachable(String),

    #[error("failed to dial {0}: {1}")]
    DialFailed(String, String),

    #[error("failed to write reply: {0}")]
    WriteReplyFailed(#[source] std::io::Error),

    #[error("relay failed: {0}")]
    RelayError(#[source] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum InvalidValue {
    #[error("invalid 'reserved' value {0:#04x}")]
    ReservedValue(u8),

    #[error("invalid type of network address {0:#04x}")]
    AddressType(u8),

    #[error("invalid version of protocol {0:#04x}")]
    ProtocolVersion(u8),

    #[error("invalid authentication method {0:#04x}")]
    AuthMethod(u8),

    #[error("invalid SOCKS command {0:#04x}")]
    SocksCommand(u8),
}

/// Classifies a dial failure into the reply/status family spec.md §4.H.7.c and
/// §7 require. Prefers typed `io::Error` introspection, falls back to
/// substring matching on the error message to preserve behavior for dialers
/// (e.g. the upstream SOCKS5 dialer) that can only report a textual reason.
pub fn classify_dial_error(target: &str, err: &anyhow::Error) -> ProxyError {
    if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
        match io_err.kind() {
            std::io::ErrorKind::ConnectionRefused => return ProxyError::ConnectionRefused(target.to_string()),
            std::io::ErrorKind::NotFound | std::io::ErrorKind::AddrNotAvailable => {
                return ProxyError::HostUnreachable(target.to_string())
            }
            _ => {}
        }
    }

    let message = err.to_string().to_lowercase();
    if message.contains("refused") {
        ProxyError::ConnectionRefused(target.to_string())
    } else if message.contains("unreachable network") || message.contains("network unreachable") || message.contains("network is unreachable") {
        ProxyError::NetworkUnreachable(target.to_string())
    } else {
        ProxyError::HostUnreachable(target.to_string())
    }
}
