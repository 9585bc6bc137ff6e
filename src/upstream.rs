//! Upstream API families and their endpoint registry.
//!
//! The proxy fronts two disjoint API families, each with its own REST and
//! WebSocket base address. The registry is built once from configuration and
//! read-only for the lifetime of the process.

use axum::http::HeaderName;

use crate::config::UpstreamConfig;

/// Default spot REST base address.
pub const DEFAULT_SPOT_REST_URL: &str = "https://api.binance.com";
/// Default spot WebSocket base address.
pub const DEFAULT_SPOT_WS_URL: &str = "wss://stream.binance.com:9443";
/// Default futures (USD-M) REST base address.
pub const DEFAULT_FUTURES_REST_URL: &str = "https://fapi.binance.com";
/// Default futures (USD-M) WebSocket base address.
pub const DEFAULT_FUTURES_WS_URL: &str = "wss://fstream.binance.com";

/// Authentication header carrying the caller's API credential.
/// Forwarded verbatim when present on the inbound request.
pub static API_KEY_HEADER: HeaderName = HeaderName::from_static("x-mbx-apikey");

/// One of the two upstream API families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiFamily {
    Spot,
    Futures,
}

impl ApiFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiFamily::Spot => "spot",
            ApiFamily::Futures => "futures",
        }
    }
}

impl std::fmt::Display for ApiFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// REST and WebSocket base addresses for one API family.
///
/// Bases are stored without a trailing slash so that inbound paths (which
/// always start with `/`) can be appended byte-for-byte.
#[derive(Debug, Clone)]
pub struct EndpointPair {
    pub rest_base: String,
    pub stream_base: String,
}

impl EndpointPair {
    fn new(rest_url: &str, ws_url: &str) -> Self {
        Self {
            rest_base: rest_url.trim_end_matches('/').to_string(),
            stream_base: ws_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Read-only registry resolving an API family to its endpoint pair.
#[derive(Debug, Clone)]
pub struct Endpoints {
    spot: EndpointPair,
    futures: EndpointPair,
}

impl Endpoints {
    pub fn from_config(cfg: &UpstreamConfig) -> Self {
        Self {
            spot: EndpointPair::new(&cfg.spot.rest_url, &cfg.spot.ws_url),
            futures: EndpointPair::new(&cfg.futures.rest_url, &cfg.futures.ws_url),
        }
    }

    pub fn pair(&self, family: ApiFamily) -> &EndpointPair {
        match family {
            ApiFamily::Spot => &self.spot,
            ApiFamily::Futures => &self.futures,
        }
    }
}
