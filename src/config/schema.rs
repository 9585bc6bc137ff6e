//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML and carry
//! defaults so a missing config file yields a working proxy.

use serde::{Deserialize, Serialize};

use crate::upstream::{
    DEFAULT_FUTURES_REST_URL, DEFAULT_FUTURES_WS_URL, DEFAULT_SPOT_REST_URL, DEFAULT_SPOT_WS_URL,
};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener settings (bind address, shutdown grace).
    pub server: ServerConfig,

    /// Upstream base addresses per API family.
    pub upstream: UpstreamConfig,

    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Server listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host (e.g., "0.0.0.0").
    pub host: String,

    /// Bind port.
    pub port: u16,

    /// Grace period for in-flight work on shutdown, in seconds.
    pub shutdown_grace_secs: u64,
}

impl ServerConfig {
    /// Full bind address, "host:port".
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_grace_secs: 10,
        }
    }
}

/// Upstream base addresses for both API families.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub spot: EndpointConfig,
    pub futures: EndpointConfig,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            spot: EndpointConfig {
                rest_url: DEFAULT_SPOT_REST_URL.to_string(),
                ws_url: DEFAULT_SPOT_WS_URL.to_string(),
            },
            futures: EndpointConfig {
                rest_url: DEFAULT_FUTURES_REST_URL.to_string(),
                ws_url: DEFAULT_FUTURES_WS_URL.to_string(),
            },
        }
    }
}

/// REST and WebSocket base addresses for one API family.
///
/// When a family section is present in the config file, both addresses must
/// be given; defaults apply only when the whole section is omitted.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    /// REST base address (http or https).
    pub rest_url: String,

    /// WebSocket base address (ws or wss).
    pub ws_url: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level directive (trace, debug, info, warn, error).
    pub level: String,

    /// Output format: "json" or "pretty".
    pub format: String,

    /// Include request body previews in request logs.
    pub log_requests: bool,

    /// Include response body previews in request logs.
    pub log_responses: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
            log_requests: true,
            log_responses: true,
        }
    }
}
