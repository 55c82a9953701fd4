use crate::{common::logging, net::listener::ProxyTcpListener};
use anyhow::Result;
use async_listen::is_transient_error;
use log::{error, info, warn};
use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpStream, time::sleep};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

/// Delay after a non-transient accept failure, e.g. file descriptor
/// exhaustion, before the loop tries again.
const DELAY_AFTER_ERROR_MILLIS: u64 = 500;

/// Runs one listener's accept loop until `shutdown` is cancelled
/// (spec.md §4.J). Every accepted socket is handed to `handler` on its own
/// task tracked by `tracker`, so a graceful shutdown can wait for in-flight
/// connections to finish naturally instead of severing them.
pub async fn run<H, Fut>(label: &'static str, listener: ProxyTcpListener, tracker: TaskTracker, shutdown: CancellationToken, handler: H)
where
    H: Fn(TcpStream, SocketAddr) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let handler = Arc::new(handler);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    logging::log_tcp_established_conn!(label, peer_addr);

                    // A connection already in flight when shutdown is requested is
                    // allowed to finish naturally (spec.md §5); only the accept
                    // loop itself observes `shutdown`.
                    let handler = handler.clone();
                    tracker.spawn(async move {
                        match handler(stream, peer_addr).await {
                            Ok(()) => logging::log_tcp_closed_conn!(label, peer_addr),
                            Err(ref err) => logging::log_tcp_closed_conn_with_error!(label, peer_addr, err),
                        }
                    });
                }
                Err(err) => {
                    logging::log_tcp_acception_error!(err);

                    let transient = err.downcast_ref::<std::io::Error>().map(is_transient_error).unwrap_or(false);
                    if !transient {
                        sleep(Duration::from_millis(DELAY_AFTER_ERROR_MILLIS)).await;
                    }
                }
            },
            _ = shutdown.cancelled() => {
                info!("{label} acceptor shutting down");
                return;
            }
        }
    }
}
