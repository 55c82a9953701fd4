use super::{consts, AuthMethod};
use crate::{
    common::error::{InvalidValue, ProxyError},
    io::{ProxyRequest, ProxyResponse},
};
use anyhow::{bail, Result};
use cfg_if::cfg_if;
use std::collections::HashSet;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

// The client connects to the server and sends a version identifier /
// method selection message:
// +----+----------+----------+
// |VER | NMETHODS | METHODS  |
// +----+----------+----------+
// | 1  |    1     | 1 to 255 |
// +----+----------+----------+
#[derive(Debug)]
pub struct HandshakeRequest {
    auth_methods: HashSet<AuthMethod>,
}

impl HandshakeRequest {
    cfg_if! {
        if #[cfg(test)] {
            pub fn new(auth_methods: HashSet<AuthMethod>) -> HandshakeRequest {
                HandshakeRequest { auth_methods }
            }
        }
    }

    /// Client-offered methods, in original order is not preserved (the set is
    /// unordered); method selection instead iterates `offered_in_order`.
    pub fn auth_methods(&self) -> &HashSet<AuthMethod> {
        &self.auth_methods
    }
}

impl ProxyRequest for HandshakeRequest {
    async fn read_from<T: AsyncReadExt + Unpin + Send>(stream: &mut T) -> Result<Self> {
        let version = stream.read_u8().await?;
        bail_on_bad_version(version)?;

        let nmethods = stream.read_u8().await?;
        let mut raw_methods = vec![0u8; nmethods as usize];
        stream.read_exact(&mut raw_methods).await?;

        // Unknown methods (e.g. GSSAPI) are dropped rather than rejected;
        // method selection simply never picks them.
        let auth_methods = raw_methods.into_iter().filter_map(AuthMethod::from_byte).collect();

        Ok(HandshakeRequest { auth_methods })
    }
}

// The server selects one of the methods given in METHODS and replies:
// +----+--------+
// |VER | METHOD |
// +----+--------+
// | 1  |   1    |
// +----+--------+
#[derive(Debug, PartialEq)]
pub struct HandshakeResponse {
    selected_method: Option<AuthMethod>,
}

impl HandshakeResponse {
    pub fn selected(method: AuthMethod) -> HandshakeResponse {
        HandshakeResponse { selected_method: Some(method) }
    }

    pub fn no_acceptable_method() -> HandshakeResponse {
        HandshakeResponse { selected_method: None }
    }
}

impl ProxyResponse for HandshakeResponse {
    async fn write_to<T: AsyncWriteExt + Unpin + Send>(&self, stream: &mut T) -> Result<()> {
        let method = self
            .selected_method
            .map_or(consts::auth::SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE, AuthMethod::as_byte);

        stream.write_all(&[consts::SOCKS5_VERSION, method]).await?;
        Ok(())
    }
}

pub(crate) fn bail_on_bad_version(version: u8) -> Result<()> {
    if version != consts::SOCKS5_VERSION {
        bail!(ProxyError::DataError(InvalidValue::ProtocolVersion(version)));
    }
    Ok(())
}
