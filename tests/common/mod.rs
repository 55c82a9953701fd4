use log::LevelFilter;
use log4rs_test_utils::test_logging::init_logging_once_for;
use reqwest::Proxy;
use std::{
    net::SocketAddr,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};
use veil_proxy::{config::ProxyConfig, server::ProxyServer};

pub fn init_logging() {
    init_logging_once_for(None, LevelFilter::Debug, "{h({({l}):5.5})} [{M}] {f}:{L}: {m}{n}");
}

pub fn next_available_address() -> SocketAddr {
    static PORT: AtomicUsize = AtomicUsize::new(33000);

    format!("127.0.0.1:{}", PORT.fetch_add(1, Ordering::AcqRel)).parse().unwrap()
}

fn base_config(socks5_addr: SocketAddr, http_addr: SocketAddr) -> ProxyConfig {
    ProxyConfig {
        proxy_tcp_addr: socks5_addr.to_string(),
        http_tcp_addr: http_addr.to_string(),
        network: "tcp".to_string(),
        credentials: String::new(),
        client_timeout: Duration::from_secs(5),
        dest_timeout: Duration::from_secs(5),
        upstream_enabled: false,
        upstream_proxy_addr: "127.0.0.1:9050".to_string(),
        upstream_control_addr: "127.0.0.1:9051".to_string(),
        rotation_interval: Duration::from_secs(600),
    }
}

/// Spawns a fully wired `ProxyServer` (both SOCKS5 and HTTP front ends,
/// spec.md §4.K) on freshly chosen loopback ports and hands back its
/// addresses plus a handle that tears it down.
pub struct RunningProxy {
    pub socks5_addr: SocketAddr,
    pub http_addr: SocketAddr,
    task: tokio::task::JoinHandle<()>,
    shutdown: tokio_util::sync::CancellationToken,
}

impl RunningProxy {
    pub async fn spawn() -> RunningProxy {
        RunningProxy::spawn_with(|_| {}).await
    }

    pub async fn spawn_with(configure: impl FnOnce(&mut ProxyConfig)) -> RunningProxy {
        let socks5_addr = next_available_address();
        let http_addr = next_available_address();
        let mut config = base_config(socks5_addr, http_addr);
        configure(&mut config);

        let server = ProxyServer::bind(&config).await.expect("proxy should bind both listeners");
        let shutdown = server.shutdown_handle();
        let task = tokio::spawn(async move {
            server.run_until_cancelled().await.expect("proxy should shut down cleanly");
        });

        // Give the acceptor loops a chance to reach their first `select!` iteration.
        tokio::task::yield_now().await;

        RunningProxy { socks5_addr, http_addr, task, shutdown }
    }

    pub async fn shutdown(self) {
        self.shutdown.cancel();
        self.task.await.expect("proxy task should not panic");
    }
}

pub fn socks5_proxy(addr: SocketAddr) -> Proxy {
    Proxy::http(format!("socks5://{addr}")).unwrap()
}

pub fn http_proxy(addr: SocketAddr) -> Proxy {
    Proxy::http(format!("http://{addr}")).unwrap()
}

pub mod http {
    use reqwest::{Client, ClientBuilder, Proxy};

    pub fn create_http_client_with_proxy(proxy: Proxy) -> Client {
        ClientBuilder::new().proxy(proxy).build().expect("unable to build HTTP client")
    }
}
