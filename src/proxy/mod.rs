//! The proxying core.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → http/server.rs (family router: /spot, /futures)
//!     → rest.rs  (every plain sub-path: rewrite + forward, stream response)
//!     → relay.rs (/ws, /ws/{streams}, /stream: upgrade + bidirectional relay)
//!     → path.rs  (upstream path mapping for stream routes)
//! ```
//!
//! # Design Decisions
//! - Raw query strings pass through byte-for-byte: callers sign them, and any
//!   re-encoding or reordering invalidates the signature
//! - No upstream call is ever retried; a replayed signed request can execute
//!   a trade twice

pub mod path;
pub mod relay;
pub mod rest;

use std::net::SocketAddr;

use axum::http::HeaderMap;

/// Client address for logging: first `X-Forwarded-For` entry when present,
/// else the socket peer address.
pub(crate) fn client_addr(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| peer.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "10.0.0.1:9999".parse().unwrap()
    }

    #[test]
    fn prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "1.2.3.4, 5.6.7.8".parse().unwrap());
        assert_eq!(client_addr(&headers, peer()), "1.2.3.4");
    }

    #[test]
    fn falls_back_to_peer_address() {
        assert_eq!(client_addr(&HeaderMap::new(), peer()), "10.0.0.1:9999");
    }
}
