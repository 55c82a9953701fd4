use anyhow::Result;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// A message this proxy reads off the wire (handshake, sub-negotiation, or
/// relay request).
pub trait ProxyRequest: Sized {
    async fn read_from<T: AsyncReadExt + Unpin + Send>(stream: &mut T) -> Result<Self>;
}

/// A message this proxy writes to the wire (handshake or relay response).
pub trait ProxyResponse {
    async fn write_to<T: AsyncWriteExt + Unpin + Send>(&self, stream: &mut T) -> Result<()>;
}
