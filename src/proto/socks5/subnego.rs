use super::consts;
use crate::common::error::ProxyError;
use anyhow::{bail, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

// RFC 1929 §2 sub-negotiation request:
// +----+------+----------+------+----------+
// |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
// +----+------+----------+------+----------+
// | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
// +----+------+----------+------+----------+
pub struct UserPassRequest {
    pub username: String,
    pub password: String,
}

impl UserPassRequest {
    pub async fn read_from<T: AsyncReadExt + Unpin + Send>(stream: &mut T) -> Result<UserPassRequest> {
        let version = stream.read_u8().await?;
        if version != consts::SUBNEGOTIATION_VERSION {
            bail!(ProxyError::UnsupportedAuthVersion(version));
        }

        let ulen = stream.read_u8().await?;
        let mut user_buf = vec![0u8; ulen as usize];
        stream.read_exact(&mut user_buf).await?;

        let plen = stream.read_u8().await?;
        let mut pass_buf = vec![0u8; plen as usize];
        stream.read_exact(&mut pass_buf).await?;

        let username = String::from_utf8(user_buf).map_err(ProxyError::DomainNameDecodingFailed)?;
        let password = String::from_utf8(pass_buf).map_err(ProxyError::DomainNameDecodingFailed)?;

        Ok(UserPassRequest { username, password })
    }
}

// RFC 1929 §2 sub-negotiation reply:
// +----+--------+
// |VER | STATUS |
// +----+--------+
// | 1  |   1    |
// +----+--------+
pub struct UserPassResponse {
    success: bool,
}

impl UserPassResponse {
    pub fn success() -> UserPassResponse {
        UserPassResponse { success: true }
    }

    pub fn failure() -> UserPassResponse {
        UserPassResponse { success: false }
    }

    pub async fn write_to<T: AsyncWriteExt + Unpin + Send>(&self, stream: &mut T) -> Result<()> {
        let status = if self.success { 0x00 } else { 0x01 };
        stream.write_all(&[consts::SUBNEGOTIATION_VERSION, status]).await?;
        Ok(())
    }
}
