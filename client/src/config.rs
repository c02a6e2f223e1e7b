//! Runtime configuration and endpoint derivation.

use std::time::Duration;

use crate::error::RpcError;

/// Fixed socket path the dev console serves its RPC endpoint on.
pub const WS_PATH: &str = "/dev-console/json-rpc-ws";

/// Configuration for one [`crate::Client`].
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Full WebSocket endpoint, e.g. `ws://localhost:8080/dev-console/json-rpc-ws`.
    pub endpoint: String,
    /// Fixed delay between reconnect attempts. No backoff, no retry cap;
    /// this runtime targets a local dev-tooling connection.
    pub retry_delay: Duration,
    /// Deadline applied to every request that does not set its own.
    /// `None` reproduces the source behavior: callers wait forever.
    pub default_deadline: Option<Duration>,
}

impl ClientConfig {
    /// Config with defaults for a given socket endpoint.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            retry_delay: Duration::from_millis(500),
            default_deadline: None,
        }
    }
}

/// Derive the socket endpoint from the console's own base URL: swap the
/// scheme for its socket equivalent, keep the host, append [`WS_PATH`].
///
/// # Errors
///
/// Returns [`RpcError::InvalidEndpoint`] for URLs that are not http(s).
pub fn endpoint_from_base_url(base_url: &str) -> Result<String, RpcError> {
    let trimmed = base_url.trim_end_matches('/');
    if let Some(rest) = trimmed.strip_prefix("http://") {
        return Ok(format!("ws://{rest}{WS_PATH}"));
    }
    if let Some(rest) = trimmed.strip_prefix("https://") {
        return Ok(format!("wss://{rest}{WS_PATH}"));
    }

    Err(RpcError::InvalidEndpoint(base_url.to_owned()))
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
