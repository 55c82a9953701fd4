pub mod acceptor;
pub mod http;
pub mod socks5;

use crate::{
    auth::store::{CredentialStore, StaticCredentialStore},
    config::ProxyConfig,
    dialer::{direct::DirectDialer, upstream::UpstreamSocks5Dialer, Dialer},
    net::listener::ProxyTcpListener,
    resolver::DnsResolver,
    rotation::RotationController,
};
use anyhow::{ensure, Context, Result};
use log::info;
use std::{sync::Arc, time::Duration};
use tokio::signal;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

/// Collaborators shared by both front-end protocols (spec.md §2 "Authentication
/// (B) and dialing (C) are the only shared collaborators between H and I").
/// The resolver is not listed here: it's only ever consumed inside the
/// direct dialer's construction, never by a handler directly.
pub struct AppState {
    pub credential_store: Option<Arc<dyn CredentialStore>>,
    pub dialer: Arc<dyn Dialer>,
    pub client_timeout: Duration,
}

/// Owns both protocol listeners and the optional upstream-rotation
/// controller, and drives all three to completion (spec.md §4.K). Each
/// front-end protocol gets its own bound TCP endpoint; there is no
/// protocol-sniffing on a shared port.
pub struct ProxyServer {
    socks5_listener: ProxyTcpListener,
    http_listener: ProxyTcpListener,
    state: Arc<AppState>,
    rotation: Option<RotationController>,
    shutdown: CancellationToken,
}

impl ProxyServer {
    /// Builds the shared collaborators from `config` (spec.md §6) and binds
    /// both listeners. The same internal shutdown token is handed to the
    /// rotation controller, if any, so cancelling it in `run()` stops every
    /// background task together.
    pub async fn bind(config: &ProxyConfig) -> Result<ProxyServer> {
        ensure!(config.network == "tcp", "unsupported listener network family: {}", config.network);

        let shutdown = CancellationToken::new();

        let credential_store: Option<Arc<dyn CredentialStore>> = if config.auth_enabled() {
            Some(Arc::new(StaticCredentialStore::from_pairs(&config.credentials).context("parsing `credentials` config key")?))
        } else {
            None
        };

        let (dialer, rotation): (Arc<dyn Dialer>, Option<RotationController>) = if config.upstream_enabled {
            let upstream = Arc::new(UpstreamSocks5Dialer::new(
                config.upstream_proxy_addr.parse().context("invalid upstream_proxy_addr")?,
                config.upstream_control_addr.parse().context("invalid upstream_control_addr")?,
            ));
            let rotation = RotationController::new(upstream.clone(), config.rotation_interval, shutdown.clone());
            (upstream, Some(rotation))
        } else {
            (Arc::new(DirectDialer::new(Arc::new(DnsResolver), config.dest_timeout)), None)
        };

        let state = Arc::new(AppState { credential_store, dialer, client_timeout: config.client_timeout });

        let socks5_listener = ProxyTcpListener::bind(&config.proxy_tcp_addr).await.context("binding SOCKS5 listener")?;
        let http_listener = ProxyTcpListener::bind(&config.http_tcp_addr).await.context("binding HTTP listener")?;
        info!("SOCKS5 proxy listening on {}", socks5_listener.local_addr()?);
        info!("HTTP proxy listening on {}", http_listener.local_addr()?);

        Ok(ProxyServer { socks5_listener, http_listener, state, rotation, shutdown })
    }

    /// A clone of the server's internal shutdown token. Cancelling it has the
    /// same effect as `Ctrl+C` would in [`Self::run`]; tests use this to
    /// drive shutdown without a real signal.
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs until `Ctrl+C`. Signal handling is the one piece of this method
    /// that is "external" per spec.md §1; everything else it does is
    /// exactly [`Self::run_until_cancelled`]'s job, which is what callers
    /// that need programmatic shutdown (tests, embedding code) should use
    /// instead.
    pub async fn run(self) -> Result<()> {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C. Gracefully tearing down ...");
            }
            shutdown.cancel();
        });

        self.run_until_cancelled().await
    }

    /// Runs both acceptor loops (and the rotation controller, if configured)
    /// concurrently until the server's own shutdown token is cancelled
    /// (spec.md §4.K), then waits for in-flight connections to finish
    /// naturally before returning (spec.md §5 "in-flight connections are
    /// permitted to complete naturally").
    pub async fn run_until_cancelled(self) -> Result<()> {
        let shutdown = self.shutdown;
        let tracker = TaskTracker::new();

        if let Some(rotation) = self.rotation {
            let rotation_shutdown = shutdown.clone();
            tracker.spawn(async move {
                tokio::select! {
                    _ = rotation.run() => {},
                    _ = rotation_shutdown.cancelled() => {},
                }
            });
        }

        // The acceptor loops themselves are plain tasks, not tracked tasks:
        // tracking them would race `tracker.close()` below against a loop
        // iteration still mid-accept. Only the per-connection tasks they
        // spawn (and the rotation controller above) are tracked, so
        // `tracker.wait()` only ever waits on work that's already running.
        let socks5_state = self.state.clone();
        let socks5_tracker = tracker.clone();
        let socks5_shutdown = shutdown.clone();
        let socks5_acceptor = tokio::spawn(acceptor::run("SOCKS5", self.socks5_listener, socks5_tracker, socks5_shutdown, move |stream, peer| {
            let state = socks5_state.clone();
            async move { socks5::handle_connection(stream, peer, state).await }
        }));

        let http_state = self.state.clone();
        let http_tracker = tracker.clone();
        let http_shutdown = shutdown.clone();
        let http_acceptor = tokio::spawn(acceptor::run("HTTP", self.http_listener, http_tracker, http_shutdown, move |stream, peer| {
            let state = http_state.clone();
            async move { http::handle_connection(stream, peer, state).await }
        }));

        shutdown.cancelled().await;

        // Wait for both accept loops to observe cancellation before closing
        // the tracker, so no connection task is spawned after close().
        let _ = tokio::join!(socks5_acceptor, http_acceptor);

        tracker.close();
        tracker.wait().await;
        Ok(())
    }
}
