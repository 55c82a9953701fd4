use super::{handshake::bail_on_bad_version, Command, ReplyStatus};
use crate::{
    common::{
        error::{InvalidValue, ProxyError},
        net::Address,
    },
    io::{ProxyRequest, ProxyResponse},
};
use anyhow::{bail, Result};
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

// The SOCKS request is sent once the client has completed authentication:
// +----+-----+-------+------+----------+----------+
// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
// +----+-----+-------+------+----------+----------+
// | 1  |  1  | X'00' |  1   | Variable |    2     |
// +----+-----+-------+------+----------+----------+
#[derive(Debug)]
pub struct RelayRequest {
    command: Command,
    dest_addr: Address,
}

impl RelayRequest {
    pub fn command(&self) -> Command {
        self.command
    }

    pub fn dest_addr(&self) -> &Address {
        &self.dest_addr
    }
}

impl ProxyRequest for RelayRequest {
    async fn read_from<T: AsyncReadExt + Unpin + Send>(stream: &mut T) -> Result<Self> {
        let mut header = [0u8; 3];
        stream.read_exact(&mut header).await?;

        let (version, cmd, reserved) = (header[0], header[1], header[2]);
        bail_on_bad_version(version)?;
        if reserved != 0x00 {
            bail!(ProxyError::DataError(InvalidValue::ReservedValue(reserved)));
        }

        let command = Command::try_from(cmd)?;
        let dest_addr = Address::read_from(stream).await?;

        Ok(RelayRequest { command, dest_addr })
    }
}

// The server's reply to a relay request:
// +----+-----+-------+------+----------+----------+
// |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
// +----+-----+-------+------+----------+----------+
// | 1  |  1  | X'00' |  1   | Variable |    2     |
// +----+-----+-------+------+----------+----------+
#[derive(Debug)]
pub struct RelayResponse {
    status: ReplyStatus,
    bound_addr: Option<Address>,
}

impl RelayResponse {
    pub fn success(bound_addr: Address) -> RelayResponse {
        RelayResponse { status: ReplyStatus::Succeeded, bound_addr: Some(bound_addr) }
    }

    pub fn failure(status: ReplyStatus) -> RelayResponse {
        RelayResponse { status, bound_addr: None }
    }
}

impl ProxyResponse for RelayResponse {
    async fn write_to<T: AsyncWriteExt + Unpin + Send>(&self, stream: &mut T) -> Result<()> {
        let mut bytes = BytesMut::new();
        bytes.extend_from_slice(&[super::consts::SOCKS5_VERSION, self.status.as_byte(), 0x00]);

        match &self.bound_addr {
            Some(addr) => addr.write_to(&mut bytes),
            None => Address::write_null(&mut bytes),
        }

        stream.write_all(&bytes).await.map_err(ProxyError::WriteReplyFailed)?;
        Ok(())
    }
}
