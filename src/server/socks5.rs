use crate::{
    auth::socks5::select_authenticator,
    common::{
        error::ProxyError,
        logging::{log_request_handling_error, log_tunnel_closed, log_tunnel_closed_with_error, log_tunnel_created},
        net::Address,
    },
    io::{ProxyRequest, ProxyResponse},
    proto::socks5::{
        handshake::{HandshakeRequest, HandshakeResponse},
        relay::{RelayRequest, RelayResponse},
        Command, ReplyStatus,
    },
    relay::relay,
    server::AppState,
};
use anyhow::{anyhow, bail, Result};
use human_bytes::human_bytes;
use log::{error, info};
use std::{net::SocketAddr, sync::Arc, time::Instant};
use tokio::{io::BufReader, net::TcpStream};

/// Drives one accepted SOCKS5 connection end to end: handshake, method
/// negotiation + authentication, relay request, dial, reply, relay
/// (spec.md §4.H).
pub async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, state: Arc<AppState>) -> Result<()> {
    let mut conn = BufReader::new(stream);

    tokio::time::timeout(state.client_timeout, negotiate(&mut conn, &state))
        .await
        .map_err(|_| anyhow!(ProxyError::Internal("handshake deadline exceeded".into())))??;

    let request = match tokio::time::timeout(state.client_timeout, RelayRequest::read_from(&mut conn)).await {
        Ok(Ok(request)) => request,
        Ok(Err(err)) => {
            // A malformed relay request (e.g. an unrecognized ATYP, spec.md §4.H
            // step 5 / §7) still gets a reply before the connection drops.
            RelayResponse::failure(ReplyStatus::from(&err)).write_to(&mut conn).await?;
            log_request_handling_error!(peer_addr, err);
            bail!(err);
        }
        Err(_) => bail!(ProxyError::Internal("relay request deadline exceeded".into())),
    };

    let command = request.command();
    let dest_addr = request.dest_addr().clone();

    if command != Command::Connect {
        let err = anyhow!(ProxyError::UnsupportedCommand(command));
        RelayResponse::failure(ReplyStatus::from(&err)).write_to(&mut conn).await?;
        log_request_handling_error!(peer_addr, err);
        bail!(err);
    }

    let dial_start = Instant::now();
    let outbound = match state.dialer.dial(&dest_addr).await {
        Ok(outbound) => outbound,
        Err(err) => {
            RelayResponse::failure(ReplyStatus::from(&err)).write_to(&mut conn).await?;
            log_request_handling_error!(peer_addr, err);
            return Err(err);
        }
    };
    let latency = dial_start.elapsed();
    info!("SOCKS5 CONNECT {} -> {} dialed in {:?}", peer_addr, dest_addr, latency);

    let bound_addr: Address = outbound.local_addr()?.into();
    RelayResponse::success(bound_addr.clone()).write_to(&mut conn).await?;

    log_tunnel_created!(peer_addr, bound_addr, dest_addr);
    let (result, _) = relay(conn, outbound).await;
    match result {
        Ok(stats) => log_tunnel_closed!(peer_addr, bound_addr, dest_addr, stats.client_to_dest, stats.dest_to_client),
        Err(ref err) => log_tunnel_closed_with_error!(peer_addr, bound_addr, dest_addr, err),
    }
    result.map(|_| ())
}

async fn negotiate<T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send>(conn: &mut T, state: &AppState) -> Result<()> {
    let handshake = HandshakeRequest::read_from(conn).await?;

    match select_authenticator(handshake.auth_methods(), state.credential_store.as_ref()) {
        Some(authenticator) => {
            HandshakeResponse::selected(authenticator.method()).write_to(conn).await?;
            authenticator.authenticate(conn).await
        }
        None => {
            HandshakeResponse::no_acceptable_method().write_to(conn).await?;
            bail!(ProxyError::NoAcceptableAuthMethod);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialer::direct::DirectDialer;
    use crate::resolver::DnsResolver;
    use std::{net::Ipv4Addr, time::Duration};
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    async fn test_state() -> Arc<AppState> {
        Arc::new(AppState {
            credential_store: None,
            dialer: Arc::new(DirectDialer::new(Arc::new(DnsResolver), Duration::from_secs(2))),
            client_timeout: Duration::from_secs(2),
        })
    }

    #[tokio::test]
    async fn noauth_connect_relays_bytes() {
        let echo = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let echo_addr = echo.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = echo.accept().await.unwrap();
            let mut buf = [0u8; 4];
            sock.read_exact(&mut buf).await.unwrap();
            sock.write_all(b"pong").await.unwrap();
        });

        let proxy_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let proxy_addr = proxy_listener.local_addr().unwrap();
        let state = test_state().await;

        tokio::spawn(async move {
            let (stream, peer) = proxy_listener.accept().await.unwrap();
            handle_connection(stream, peer, state).await.unwrap();
        });

        let mut client = TcpStream::connect(proxy_addr).await.unwrap();
        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();

        let mut greeting_reply = [0u8; 2];
        client.read_exact(&mut greeting_reply).await.unwrap();
        assert_eq!([0x05, 0x00], greeting_reply);

        let port = echo_addr.port();
        let mut request = vec![0x05, 0x01, 0x00, 0x01];
        request.extend_from_slice(&Ipv4Addr::LOCALHOST.octets());
        request.extend_from_slice(&port.to_be_bytes());
        client.write_all(&request).await.unwrap();
        client.write_all(b"ping").await.unwrap();

        let mut reply_header = [0u8; 4];
        client.read_exact(&mut reply_header).await.unwrap();
        assert_eq!([0x05, 0x00, 0x00, 0x01], reply_header);
        let mut reply_addr = [0u8; 6];
        client.read_exact(&mut reply_addr).await.unwrap();

        let mut pong = [0u8; 4];
        client.read_exact(&mut pong).await.unwrap();
        assert_eq!(b"pong", &pong);
    }

    #[tokio::test]
    async fn bind_command_is_declined() {
        let proxy_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let proxy_addr = proxy_listener.local_addr().unwrap();
        let state = test_state().await;

        tokio::spawn(async move {
            let (stream, peer) = proxy_listener.accept().await.unwrap();
            let _ = handle_connection(stream, peer, state).await;
        });

        let mut client = TcpStream::connect(proxy_addr).await.unwrap();
        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut greeting_reply = [0u8; 2];
        client.read_exact(&mut greeting_reply).await.unwrap();

        client.write_all(&[0x05, 0x02, 0x00, 0x01, 127, 0, 0, 1, 0, 80]).await.unwrap();

        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(vec![0x05, 0x07, 0x00, 0x01, 0, 0, 0, 0, 0, 0], reply);
    }

    #[tokio::test]
    async fn unrecognized_address_type_is_declined() {
        let proxy_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let proxy_addr = proxy_listener.local_addr().unwrap();
        let state = test_state().await;

        tokio::spawn(async move {
            let (stream, peer) = proxy_listener.accept().await.unwrap();
            let _ = handle_connection(stream, peer, state).await;
        });

        let mut client = TcpStream::connect(proxy_addr).await.unwrap();
        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut greeting_reply = [0u8; 2];
        client.read_exact(&mut greeting_reply).await.unwrap();

        // ATYP 0x06 is not one of IPv4/domain/IPv6.
        client.write_all(&[0x05, 0x01, 0x00, 0x06]).await.unwrap();

        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(vec![0x05, 0x08, 0x00, 0x01, 0, 0, 0, 0, 0, 0], reply);
    }
}
