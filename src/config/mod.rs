//! Stub server configuration.
//!
//! Every field has a default, so `StubConfig::default()` is what
//! [`StubServer::start`](crate::StubServer::start) uses, and a partial JSON
//! document deserializes with the rest filled in.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::http::StatusCode;

/// Loopback address with an OS-assigned port.
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:0";

/// Maximum size of a complete HTTP request we will buffer before rejecting it (8 MiB).
pub const DEFAULT_MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

/// How long `stop` waits for in-flight requests before aborting them.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings for a [`StubServer`](crate::StubServer).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use stub_http::{StatusCode, StubConfig};
///
/// let config = StubConfig::default()
///     .fallback_status(StatusCode::NOT_IMPLEMENTED)
///     .drain_timeout(Duration::from_millis(250));
/// assert_eq!(config.bind_address, "127.0.0.1:0");
///
/// let parsed: StubConfig = serde_json::from_str(r#"{ "fallback_status": 418 }"#).unwrap();
/// assert_eq!(parsed.fallback_status.as_u16(), 418);
/// assert_eq!(parsed.max_request_size, 8 * 1024 * 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StubConfig {
    /// Address to bind. Port `0` lets the OS pick a free one.
    pub bind_address: String,
    /// Upper bound on request head plus body, in bytes. Larger requests get `413`.
    pub max_request_size: usize,
    /// Grace period for in-flight requests on `stop`, in milliseconds.
    pub drain_timeout_ms: u64,
    /// Status for requests that match no route.
    pub fallback_status: StatusCode,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_owned(),
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT.as_millis() as u64,
            fallback_status: StatusCode::NOT_FOUND,
        }
    }
}

impl StubConfig {
    #[must_use]
    pub fn bind_address(mut self, addr: impl Into<String>) -> Self {
        self.bind_address = addr.into();
        self
    }

    #[must_use]
    pub fn max_request_size(mut self, bytes: usize) -> Self {
        self.max_request_size = bytes;
        self
    }

    #[must_use]
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn fallback_status(mut self, status: StatusCode) -> Self {
        self.fallback_status = status;
        self
    }

    /// The drain timeout as a [`Duration`].
    pub fn drain_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = StubConfig::default();
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.max_request_size, DEFAULT_MAX_REQUEST_SIZE);
        assert_eq!(config.drain_timeout_duration(), DEFAULT_DRAIN_TIMEOUT);
        assert_eq!(config.fallback_status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn setters() {
        let config = StubConfig::default()
            .bind_address("127.0.0.1:18080")
            .max_request_size(1024)
            .drain_timeout(Duration::from_millis(10))
            .fallback_status(StatusCode::GONE);
        assert_eq!(config.bind_address, "127.0.0.1:18080");
        assert_eq!(config.max_request_size, 1024);
        assert_eq!(config.drain_timeout_ms, 10);
        assert_eq!(config.fallback_status, StatusCode::GONE);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: StubConfig = serde_json::from_str(r#"{ "drain_timeout_ms": 50 }"#).unwrap();
        assert_eq!(config.drain_timeout_ms, 50);
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.fallback_status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn rejects_out_of_range_fallback_status() {
        let result = serde_json::from_str::<StubConfig>(r#"{ "fallback_status": 7 }"#);
        assert!(result.is_err());
    }
}
