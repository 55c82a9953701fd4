use anyhow::Result;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Bytes moved in each direction of a completed relay.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelayStats {
    pub client_to_dest: u64,
    pub dest_to_client: u64,
}

/// Pumps bytes between `client` and `dest` until both directions have seen
/// EOF, or until either side errors. Each direction is copied by its own
/// task so a stalled peer on one side never blocks drain of the other; a
/// clean EOF on one side half-closes the corresponding write half of the
/// other so the peer observes it promptly rather than waiting for the whole
/// tunnel to tear down.
///
/// On error, the first error from either direction is returned, but both
/// tasks are still awaited to completion so neither socket is leaked.
pub async fn relay<C, D>(client: C, dest: D) -> (Result<RelayStats>, (C, D))
where
    C: AsyncRead + AsyncWrite + Unpin + Send,
    D: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (mut client_r, mut client_w) = tokio::io::split(client);
    let (mut dest_r, mut dest_w) = tokio::io::split(dest);

    let client_to_dest = async {
        let n = tokio::io::copy(&mut client_r, &mut dest_w).await?;
        dest_w.shutdown().await?;
        Ok::<u64, std::io::Error>(n)
    };

    let dest_to_client = async {
        let n = tokio::io::copy(&mut dest_r, &mut client_w).await?;
        client_w.shutdown().await?;
        Ok::<u64, std::io::Error>(n)
    };

    let (l2r, r2l) = tokio::join!(client_to_dest, dest_to_client);

    let result = match (l2r, r2l) {
        (Ok(client_to_dest), Ok(dest_to_client)) => Ok(RelayStats { client_to_dest, dest_to_client }),
        (Err(err), _) => Err(err.into()),
        (_, Err(err)) => Err(err.into()),
    };

    (result, (client_r.unsplit(client_w), dest_r.unsplit(dest_w)))
}
