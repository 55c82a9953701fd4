use crate::{
    common::logging::{log_rotation_bootstrap_retry, log_rotation_bootstrapped, log_rotation_tick_failed, log_rotation_tick_succeeded},
    dialer::upstream::UpstreamSocks5Dialer,
};
use anyhow::{anyhow, Result};
use log::{info, warn};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

const BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(300);
const BOOTSTRAP_RETRY_INTERVAL: Duration = Duration::from_secs(5);
const CONTROL_SUCCESS_PREFIX: &str = "250";

/// Renews the upstream's circuit identity on a fixed interval by issuing
/// `SIGNAL NEWNYM` over its control port (spec.md §4.D, grounded in the
/// original `pkg/tor/controller.go`/`requester.go` bootstrap-then-tick loop).
///
/// The controller never tears the proxy down on a failed rotation; a tick
/// that fails is logged and retried on the next interval.
pub struct RotationController {
    dialer: Arc<UpstreamSocks5Dialer>,
    interval: Duration,
    cancel: CancellationToken,
}

impl RotationController {
    pub fn new(dialer: Arc<UpstreamSocks5Dialer>, interval: Duration, cancel: CancellationToken) -> RotationController {
        RotationController { dialer, interval, cancel }
    }

    /// Probes the control port until a rotation succeeds or `BOOTSTRAP_TIMEOUT`
    /// elapses, then ticks every `interval` until cancelled.
    pub async fn run(self) {
        if let Err(err) = self.bootstrap().await {
            warn!("Upstream rotation controller giving up: reason '{err}'");
            return;
        }
        log_rotation_bootstrapped!();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(self.interval) => {
                    match self.request_new_identity().await {
                        Ok(()) => log_rotation_tick_succeeded!(),
                        Err(err) => log_rotation_tick_failed!(err),
                    }
                }
            }
        }
    }

    async fn bootstrap(&self) -> Result<()> {
        tokio::time::timeout(BOOTSTRAP_TIMEOUT, async {
            loop {
                match self.request_new_identity().await {
                    Ok(()) => return,
                    Err(err) => {
                        log_rotation_bootstrap_retry!(err);
                        tokio::time::sleep(BOOTSTRAP_RETRY_INTERVAL).await;
                    }
                }
            }
        })
        .await
        .map_err(|_| anyhow!("timed out waiting for upstream to become reachable"))
    }

    async fn request_new_identity(&self) -> Result<()> {
        let stream = self.dialer.dial_control().await?;
        let mut conn = BufReader::new(stream);

        conn.write_all(b"AUTHENTICATE \"\"\r\n").await?;
        conn.write_all(b"SIGNAL NEWNYM\r\n").await?;

        let mut status = String::new();
        conn.read_line(&mut status).await?;
        if !status.starts_with(CONTROL_SUCCESS_PREFIX) {
            return Err(anyhow!("control port rejected rotation request: {}", status.trim_end()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::{
        io::{AsyncBufReadExt as _, BufReader as TokioBufReader},
        net::TcpListener,
    };

    #[tokio::test]
    async fn request_new_identity_sends_one_pipelined_exchange() {
        let control = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let control_addr = control.local_addr().unwrap();
        let proxy_addr: SocketAddr = "127.0.0.1:1".parse().unwrap();

        let control_task = tokio::spawn(async move {
            let (stream, _) = control.accept().await.unwrap();
            let mut conn = TokioBufReader::new(stream);

            let mut authenticate = String::new();
            conn.read_line(&mut authenticate).await.unwrap();
            assert_eq!("AUTHENTICATE \"\"\r\n", authenticate);

            let mut signal = String::new();
            conn.read_line(&mut signal).await.unwrap();
            assert_eq!("SIGNAL NEWNYM\r\n", signal);

            conn.get_mut().write_all(b"250 OK\r\n").await.unwrap();
        });

        let dialer = Arc::new(UpstreamSocks5Dialer::new(proxy_addr, control_addr));
        let controller = RotationController::new(dialer, Duration::from_secs(600), CancellationToken::new());
        controller.request_new_identity().await.unwrap();

        control_task.await.unwrap();
    }

    #[tokio::test]
    async fn request_new_identity_rejects_non_250_reply() {
        let control = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let control_addr = control.local_addr().unwrap();
        let proxy_addr: SocketAddr = "127.0.0.1:1".parse().unwrap();

        tokio::spawn(async move {
            let (stream, _) = control.accept().await.unwrap();
            let mut conn = TokioBufReader::new(stream);
            let mut line = String::new();
            conn.read_line(&mut line).await.unwrap();
            line.clear();
            conn.read_line(&mut line).await.unwrap();
            conn.get_mut().write_all(b"515 Bad authentication\r\n").await.unwrap();
        });

        let dialer = Arc::new(UpstreamSocks5Dialer::new(proxy_addr, control_addr));
        let controller = RotationController::new(dialer, Duration::from_secs(600), CancellationToken::new());
        assert!(controller.request_new_identity().await.is_err());
    }
}
