// TCP acceptor events

macro_rules! log_tcp_established_conn {
    ($label:expr, $peer:expr) => {
        info!("TCP {} connection OPENED: peer '{}'", $label, $peer)
    };
}

macro_rules! log_tcp_closed_conn {
    ($label:expr, $peer:expr) => {
        info!("TCP {} connection CLOSED: peer '{}'", $label, $peer)
    };
}

macro_rules! log_tcp_closed_conn_with_error {
    ($label:expr, $peer:expr, $err:expr) => {
        error!("TCP {} connection CLOSED with error: peer '{}', reason '{}'", $label, $peer, $err)
    };
}

macro_rules! log_tcp_acception_error {
    ($err:expr) => {
        warn!("TCP connection was NOT accepted: reason '{}'", $err)
    };
}

pub(crate) use log_tcp_acception_error;
pub(crate) use log_tcp_closed_conn;
pub(crate) use log_tcp_closed_conn_with_error;
pub(crate) use log_tcp_established_conn;

// Relay / tunnel events

macro_rules! log_tunnel_created {
    ($peer:expr, $bound:expr, $dest:expr) => {
        info!(
            "Tunnel CREATED: client [{}] <--L--> proxy [{}] <--R--> destination [{}]",
            $peer, $bound, $dest
        )
    };
}

macro_rules! log_tunnel_closed {
    ($peer:expr, $bound:expr, $dest:expr, $l2r:expr, $r2l:expr) => {
        info!(
            "Tunnel CLOSED: client [{}] <--L--> proxy [{}] <--R--> destination [{}], transmitted L->R {}, R->L {}",
            $peer,
            $bound,
            $dest,
            human_bytes($l2r as f64),
            human_bytes($r2l as f64)
        )
    };
}

macro_rules! log_tunnel_closed_with_error {
    ($peer:expr, $bound:expr, $dest:expr, $err:expr) => {
        error!(
            "Tunnel CLOSED with error: client [{}] <--L--> proxy [{}] <--R--> destination [{}], reason '{}'",
            $peer, $bound, $dest, $err
        )
    };
}

pub(crate) use log_tunnel_closed;
pub(crate) use log_tunnel_closed_with_error;
pub(crate) use log_tunnel_created;

// Per-request handling errors (SOCKS5 relay request / HTTP request)

macro_rules! log_request_handling_error {
    ($peer:expr, $err:expr) => {
        error!("Error occurred handling request from '{}': reason '{}'", $peer, $err)
    };
}

pub(crate) use log_request_handling_error;

// Rotation controller events

macro_rules! log_rotation_bootstrapped {
    () => {
        info!("Upstream bootstrap complete; identity rotation has started")
    };
}

macro_rules! log_rotation_bootstrap_retry {
    ($err:expr) => {
        warn!("Upstream bootstrap probe failed, retrying: reason '{}'", $err)
    };
}

macro_rules! log_rotation_tick_failed {
    ($err:expr) => {
        warn!("Upstream identity rotation failed (best-effort): reason '{}'", $err)
    };
}

macro_rules! log_rotation_tick_succeeded {
    () => {
        info!("Upstream identity rotated")
    };
}

pub(crate) use log_rotation_bootstrap_retry;
pub(crate) use log_rotation_bootstrapped;
pub(crate) use log_rotation_tick_failed;
pub(crate) use log_rotation_tick_succeeded;
