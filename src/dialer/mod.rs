pub mod direct;
pub mod upstream;

use crate::common::net::Address;
use anyhow::Result;
use async_trait::async_trait;
use tokio::net::TcpStream;

/// Establishes the outbound leg of a proxied connection (spec.md §4.C). A
/// single implementation backs every relay request regardless of which
/// front-end protocol (SOCKS5 or HTTP) accepted it.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, target: &Address) -> Result<TcpStream>;
}
