//! Upstream path mapping for WebSocket routes.

/// Map an inbound stream route onto the upstream path.
///
/// `remainder` is the inbound path with the family prefix already stripped;
/// `streams` is the explicit stream-list segment when the route carried one.
///
/// The mapping is:
///
/// | inbound (stripped)     | streams          | upstream path       |
/// |------------------------|------------------|---------------------|
/// | `/ws/btcusdt@aggTrade` | `btcusdt@aggTrade` | `/ws/btcusdt@aggTrade` |
/// | `/ws`                  | —                | `/ws`               |
/// | `/stream`              | —                | `/stream`           |
/// | `` or `/`              | —                | `/ws`               |
///
/// Passing the stripped remainder through (rather than forcing `/ws`) keeps
/// the combined-stream endpoint (`/stream?streams=...`) working. Whether this
/// rule generalizes to other upstream naming conventions is unconfirmed; it
/// matches the documented routing of the current upstreams.
pub fn upstream_stream_path(remainder: &str, streams: Option<&str>) -> String {
    if let Some(streams) = streams {
        return format!("/ws/{streams}");
    }
    match remainder {
        "" | "/" => "/ws".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_stream_list_wins() {
        assert_eq!(
            upstream_stream_path("/ws/btcusdt@aggTrade", Some("btcusdt@aggTrade")),
            "/ws/btcusdt@aggTrade"
        );
    }

    #[test]
    fn bare_ws_passes_through() {
        assert_eq!(upstream_stream_path("/ws", None), "/ws");
    }

    #[test]
    fn combined_stream_endpoint_passes_through() {
        assert_eq!(upstream_stream_path("/stream", None), "/stream");
    }

    #[test]
    fn empty_remainder_defaults_to_ws() {
        assert_eq!(upstream_stream_path("", None), "/ws");
        assert_eq!(upstream_stream_path("/", None), "/ws");
    }
}
