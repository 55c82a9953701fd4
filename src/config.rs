use clap::Parser;
use std::time::Duration;

pub const LOG4RS_CONFIG_FILE_PATH: &str = "log4rs.yaml";

fn parse_duration_secs(raw: &str) -> Result<Duration, std::num::ParseIntError> {
    raw.parse().map(Duration::from_secs)
}

/// Command-line configuration, covering every key spec.md §6 enumerates.
#[derive(Parser, Debug)]
#[clap(author, about = "Dual-protocol SOCKS5 / HTTP forward proxy", version)]
pub struct ProxyConfig {
    /// SOCKS5 listen endpoint
    #[clap(long, default_value = "0.0.0.0:1080")]
    pub proxy_tcp_addr: String,

    /// HTTP proxy listen endpoint
    #[clap(long, default_value = "0.0.0.0:8080")]
    pub http_tcp_addr: String,

    /// Listener network family; only "tcp" is implemented
    #[clap(long, default_value = "tcp")]
    pub network: String,

    /// Inline `user:bcrypt-hash` pairs, comma-separated; empty disables auth
    #[clap(long, default_value = "")]
    pub credentials: String,

    /// Per-connection handshake deadline, in seconds
    #[clap(long, default_value = "15", value_parser = parse_duration_secs)]
    pub client_timeout: Duration,

    /// Outbound dial timeout, in seconds
    #[clap(long, default_value = "15", value_parser = parse_duration_secs)]
    pub dest_timeout: Duration,

    /// Enables the via-upstream-SOCKS5 dialer (e.g. routing through Tor)
    #[clap(long)]
    pub upstream_enabled: bool,

    /// Upstream SOCKS5 endpoint
    #[clap(long, default_value = "127.0.0.1:9050")]
    pub upstream_proxy_addr: String,

    /// Upstream control-port endpoint, used for identity rotation
    #[clap(long, default_value = "127.0.0.1:9051")]
    pub upstream_control_addr: String,

    /// Upstream identity rotation period, in seconds
    #[clap(long, default_value = "600", value_parser = parse_duration_secs)]
    pub rotation_interval: Duration,
}

impl ProxyConfig {
    pub fn auth_enabled(&self) -> bool {
        !self.credentials.trim().is_empty()
    }
}
