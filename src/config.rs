use std::net::IpAddr;
use std::time::Duration;

use crate::consts::DEFAULT_TIMEOUT_SECS;

/// What to do when the client offers no acceptable auth method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoMethodPolicy {
    /// Answer `[5, 0xFF]` and then close, as RFC 1928 asks.
    #[default]
    Reply,
    /// Close without answering.
    Drop,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub handshake_timeout: Duration,
    pub resolve_timeout: Duration,
    pub connect_timeout: Duration,
    pub no_method_policy: NoMethodPolicy,
    /// Internal host that receives requests addressed to 127.0.0.1.
    pub redirect_loopback: Option<IpAddr>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let timeout = Duration::from_secs(DEFAULT_TIMEOUT_SECS);
        Self {
            handshake_timeout: timeout,
            resolve_timeout: timeout,
            connect_timeout: timeout,
            no_method_policy: NoMethodPolicy::default(),
            redirect_loopback: None,
        }
    }
}
