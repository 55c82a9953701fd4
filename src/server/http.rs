use crate::{
    auth::store::CredentialStore,
    common::{
        logging::{log_tunnel_closed, log_tunnel_closed_with_error, log_tunnel_created},
        net::Address,
    },
    relay::relay,
    server::AppState,
};
use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine};
use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};
use hyper::{
    body::Incoming,
    client,
    header::{HeaderMap, HeaderName, HeaderValue},
    server,
    service::service_fn,
    Request, Response, StatusCode,
};
use human_bytes::human_bytes;
use hyper_util::rt::TokioIo;
use log::{error, info};
use std::{net::SocketAddr, sync::Arc, time::Instant};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
};

/// Headers whose semantics apply only to one transport hop and must not be
/// forwarded (spec.md §4.I step 3). `HeaderMap::remove` compares names
/// case-insensitively, so no extra normalization is needed here.
const HOP_HEADERS: [&str; 9] =
    ["connection", "proxy-connection", "keep-alive", "proxy-authenticate", "proxy-authorization", "te", "trailers", "transfer-encoding", "upgrade"];

/// Bound on the `CONNECT` request's header section, read by hand outside of
/// hyper (see [`handle_connect`]). Guards against a client that never sends
/// the terminating blank line.
const MAX_CONNECT_HEADER_LINES: usize = 128;

const CONNECT_ESTABLISHED_LINE: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

fn strip_hop_headers(headers: &mut HeaderMap) {
    for name in HOP_HEADERS {
        headers.remove(name);
    }
}

type ProxyBody = BoxBody<Bytes, hyper::Error>;

fn empty_body() -> ProxyBody {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
}

fn text_body<T: Into<Bytes>>(chunk: T) -> ProxyBody {
    Full::new(chunk.into()).map_err(|never| match never {}).boxed()
}

fn status_response(status: StatusCode, message: &str) -> Response<ProxyBody> {
    let mut response = Response::new(text_body(message.to_string()));
    *response.status_mut() = status;
    response
}

fn auth_challenge_response() -> Response<ProxyBody> {
    let mut response = status_response(StatusCode::PROXY_AUTHENTICATION_REQUIRED, "Proxy authentication required or unauthorized");
    response.headers_mut().insert("Proxy-Authenticate", "Basic realm=\"Restricted area\"".parse().unwrap());
    response
}

async fn authenticate(headers: &HeaderMap, credential_store: Option<&Arc<dyn CredentialStore>>) -> bool {
    let Some(store) = credential_store else { return true };

    let Some(header) = headers.get("Proxy-Authorization") else { return false };
    let Ok(value) = header.to_str() else { return false };
    let Some(encoded) = value.strip_prefix("Basic ") else { return false };
    let Ok(decoded) = general_purpose::STANDARD.decode(encoded) else { return false };
    let Ok(decoded) = String::from_utf8(decoded) else { return false };
    let Some((user, pass)) = decoded.split_once(':') else { return false };

    store.valid(user, pass).await
}

/// Serves one accepted HTTP(S) proxy connection (spec.md §4.I). `CONNECT` is
/// intercepted before hyper ever sees the connection: hyper's H1 encoder has
/// no way to emit anything but a status code's canonical reason phrase, and
/// the tunnel success line's literal text ("Connection Established", not
/// "OK") is mandated, so that one request is parsed and replied to by hand.
/// Every other method runs through hyper's HTTP/1 server machinery exactly as
/// before.
pub async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, state: Arc<AppState>) -> Result<()> {
    let mut conn = BufReader::new(stream);

    let is_connect = tokio::time::timeout(state.client_timeout, conn.fill_buf())
        .await
        .map_err(|_| anyhow!("timed out waiting for the first request line"))??
        .starts_with(b"CONNECT ");

    if is_connect {
        return handle_connect(conn, peer_addr, state).await;
    }

    let io = TokioIo::new(conn);
    server::conn::http1::Builder::new()
        .serve_connection(io, service_fn(move |req| serve_request(req, peer_addr, state.clone())))
        .await
        .map_err(anyhow::Error::from)
}

/// A forward-proxy request carries an absolute-form `http(s)://` URI (RFC
/// 7230 §5.3.2); anything else (origin-form, authority-form outside
/// `CONNECT`) isn't a request this proxy knows how to route. Checked before
/// [`authenticate`] so an invalid scheme gets `400` without ever consulting
/// the credential store (spec.md §4.I).
fn is_forward_request<B>(req: &Request<B>) -> bool {
    matches!(req.uri().scheme_str(), Some(scheme) if scheme.starts_with("http"))
}

async fn serve_request(req: Request<Incoming>, peer_addr: SocketAddr, state: Arc<AppState>) -> Result<Response<ProxyBody>, hyper::Error> {
    if !is_forward_request(&req) {
        return Ok(status_response(StatusCode::BAD_REQUEST, "Invalid URL scheme"));
    }

    if !authenticate(req.headers(), state.credential_store.as_ref()).await {
        return Ok(auth_challenge_response());
    }

    Ok(handle_forward(req, peer_addr, state).await)
}

/// Reads a `CONNECT` request head directly off the wire (request line plus
/// headers, per RFC 7230 §3) without involving hyper, dials the target, and
/// on success writes the literal tunnel-established line before handing the
/// raw connection to [`relay`].
async fn handle_connect(mut conn: BufReader<TcpStream>, peer_addr: SocketAddr, state: Arc<AppState>) -> Result<()> {
    let read_head = async {
        let mut request_line = String::new();
        conn.read_line(&mut request_line).await?;
        let authority = request_line
            .split_whitespace()
            .nth(1)
            .ok_or_else(|| anyhow!("malformed CONNECT request line: {request_line:?}"))?
            .to_string();

        let mut headers = HeaderMap::new();
        for _ in 0..MAX_CONNECT_HEADER_LINES {
            let mut line = String::new();
            if conn.read_line(&mut line).await? == 0 {
                anyhow::bail!("connection closed while reading CONNECT headers");
            }
            let line = line.trim_end();
            if line.is_empty() {
                return Ok((authority, headers));
            }
            if let Some((name, value)) = line.split_once(':') {
                if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.trim().as_bytes()), HeaderValue::from_str(value.trim())) {
                    headers.insert(name, value);
                }
            }
        }
        anyhow::bail!("CONNECT header section too large")
    };

    let (authority, headers) = tokio::time::timeout(state.client_timeout, read_head)
        .await
        .map_err(|_| anyhow!("timed out reading CONNECT request"))??;

    if !authenticate(&headers, state.credential_store.as_ref()).await {
        conn.write_all(b"HTTP/1.1 407 Proxy Authentication Required\r\nProxy-Authenticate: Basic realm=\"Restricted area\"\r\n\r\n").await?;
        return Ok(());
    }

    let (host, port) = authority.rsplit_once(':').unwrap_or((authority.as_str(), "443"));
    let target = Address::Domain { name: host.to_string(), port: port.parse().unwrap_or(443), resolved: None };

    let dial_start = Instant::now();
    let outbound = match state.dialer.dial(&target).await {
        Ok(outbound) => outbound,
        Err(err) => {
            error!("CONNECT {peer_addr} -> {target} failed: {err}");
            conn.write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n").await?;
            return Err(err);
        }
    };
    let dial_latency = dial_start.elapsed();
    info!("CONNECT {peer_addr} -> {target} dialed in {dial_latency:?}");

    let bound_label = outbound.local_addr().map(|a| Address::from(a).to_string()).unwrap_or_else(|_| "unknown".to_string());
    conn.write_all(CONNECT_ESTABLISHED_LINE).await?;

    log_tunnel_created!(peer_addr, bound_label, target);
    let (result, _) = relay(conn, outbound).await;
    match result {
        Ok(stats) => log_tunnel_closed!(peer_addr, bound_label, target, stats.client_to_dest, stats.dest_to_client),
        Err(ref err) => log_tunnel_closed_with_error!(peer_addr, bound_label, target, err),
    }
    result.map(|_| ())
}

async fn handle_forward(req: Request<Incoming>, peer_addr: SocketAddr, state: Arc<AppState>) -> Response<ProxyBody> {
    let (Some(host), port) = (req.uri().host().map(str::to_string), req.uri().port_u16()) else {
        return status_response(StatusCode::BAD_REQUEST, "Invalid URL scheme");
    };
    let target = Address::Domain { name: host, port: port.unwrap_or(80), resolved: None };
    let target_label = target.to_string();

    let request_start = Instant::now();
    let outcome = tokio::time::timeout(state.client_timeout, forward_request(req, &target, state.dialer.as_ref())).await;

    match outcome {
        Ok(Ok(response)) => {
            info!("forward {peer_addr} -> {target_label} completed in {:?}", request_start.elapsed());
            response
        }
        Ok(Err(err)) => {
            error!("forward {peer_addr} -> {target_label} failed: {err}");
            status_response(StatusCode::BAD_GATEWAY, "Bad gateway: failed to send request")
        }
        Err(_) => {
            error!("forward {peer_addr} -> {target_label} timed out");
            status_response(StatusCode::BAD_GATEWAY, "Bad gateway: failed to send request")
        }
    }
}

async fn forward_request(req: Request<Incoming>, target: &Address, dialer: &(dyn crate::dialer::Dialer)) -> Result<Response<ProxyBody>> {
    let stream = dialer.dial(target).await?;
    let io = TokioIo::new(stream);
    let (mut sender, conn) = client::conn::http1::Builder::new().handshake(io).await?;

    tokio::spawn(async move {
        if let Err(err) = conn.await {
            error!("forward connection failed: {err}");
        }
    });

    let (mut parts, body) = req.into_parts();
    strip_hop_headers(&mut parts.headers);
    let outbound_req = Request::from_parts(parts, body);

    let response = sender.send_request(outbound_req).await?;
    let (mut resp_parts, resp_body) = response.into_parts();
    strip_hop_headers(&mut resp_parts.headers);
    Ok(Response::from_parts(resp_parts, resp_body.boxed()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::store::MockCredentialStore, dialer::direct::DirectDialer, resolver::DnsResolver};
    use hyper::Method;
    use std::time::Duration;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt as _},
        net::TcpListener,
    };

    #[test]
    fn strip_hop_headers_removes_only_listed_names() {
        let mut headers = HeaderMap::new();
        headers.insert("Connection", HeaderValue::from_static("keep-alive"));
        headers.insert("Proxy-Authorization", HeaderValue::from_static("Basic xxx"));
        headers.insert("Transfer-Encoding", HeaderValue::from_static("chunked"));
        headers.insert("Content-Type", HeaderValue::from_static("text/plain"));

        strip_hop_headers(&mut headers);

        assert!(!headers.contains_key("connection"));
        assert!(!headers.contains_key("proxy-authorization"));
        assert!(!headers.contains_key("transfer-encoding"));
        assert_eq!("text/plain", headers.get("content-type").unwrap());
    }

    #[tokio::test]
    async fn store_rejects_translate_to_407_challenge() {
        let mut mock = MockCredentialStore::new();
        mock.expect_valid().return_once(|_, _| false);
        let store: Arc<dyn CredentialStore> = Arc::new(mock);
        assert!(!store.valid("alice", "wrong").await);

        let response = auth_challenge_response();
        assert_eq!(StatusCode::PROXY_AUTHENTICATION_REQUIRED, response.status());
        assert_eq!("Basic realm=\"Restricted area\"", response.headers().get("Proxy-Authenticate").unwrap());
    }

    async fn test_state() -> Arc<AppState> {
        Arc::new(AppState {
            credential_store: None,
            dialer: Arc::new(DirectDialer::new(Arc::new(DnsResolver), Duration::from_secs(2))),
            client_timeout: Duration::from_secs(2),
        })
    }

    #[test]
    fn is_forward_request_rejects_non_http_schemes() {
        let req = Request::builder().method(Method::GET).uri("ftp://example.com/").body(()).unwrap();
        assert!(!is_forward_request(&req));

        let req = Request::builder().method(Method::GET).uri("http://example.com/").body(()).unwrap();
        assert!(is_forward_request(&req));
    }

    #[tokio::test]
    async fn connect_tunnel_writes_literal_established_line() {
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
        client.write_all(format!("CONNECT {echo_addr} HTTP/1.1\r\nHost: {echo_addr}\r\n\r\n").as_bytes()).await.unwrap();

        let mut response = [0u8; CONNECT_ESTABLISHED_LINE.len()];
        client.read_exact(&mut response).await.unwrap();
        assert_eq!(CONNECT_ESTABLISHED_LINE, &response);

        client.write_all(b"ping").await.unwrap();
        let mut pong = [0u8; 4];
        client.read_exact(&mut pong).await.unwrap();
        assert_eq!(b"pong", &pong);
    }
}
