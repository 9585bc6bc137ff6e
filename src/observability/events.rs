//! Structured proxy events.
//!
//! The core emits four event kinds: request completed, session connected,
//! session disconnected, and message transferred. Components receive the
//! collaborator by `Arc` at construction; nothing logs through globals.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;

use crate::upstream::ApiFamily;

const MAX_REQUEST_BODY_PREVIEW: usize = 1000;
/// Response preview cap; the REST proxy captures up to this many bytes (plus
/// one, so truncation is detectable) while streaming.
pub(crate) const RESPONSE_PREVIEW_CAP: usize = 2000;
const MAX_MESSAGE_PREVIEW: usize = 500;

/// Direction of a relayed WebSocket message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToUpstream,
    UpstreamToClient,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::ClientToUpstream => "client->upstream",
            Direction::UpstreamToClient => "upstream->client",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything known about one completed REST call.
#[derive(Debug)]
pub struct RequestRecord {
    pub started_at: SystemTime,
    pub duration: Duration,
    pub method: String,
    pub path: String,
    pub query: String,
    pub status: u16,
    pub request_body: Bytes,
    /// Captured response prefix; may be one byte past the preview cap so
    /// truncation is detectable.
    pub response_body: Vec<u8>,
    pub client_addr: String,
    pub api_key: Option<String>,
    pub family: ApiFamily,
}

/// Event sink for the proxy core.
#[derive(Debug, Clone)]
pub struct ProxyEvents {
    log_requests: bool,
    log_responses: bool,
}

impl ProxyEvents {
    pub fn new(log_requests: bool, log_responses: bool) -> Self {
        Self {
            log_requests,
            log_responses,
        }
    }

    /// Emit the completion event for one REST call.
    pub fn record_request(&self, record: RequestRecord) {
        let api_key = record.api_key.as_deref().map(mask_api_key).unwrap_or_default();
        let request_body = if self.log_requests {
            truncate(
                &String::from_utf8_lossy(&record.request_body),
                MAX_REQUEST_BODY_PREVIEW,
            )
        } else {
            String::new()
        };
        let response_body = if self.log_responses {
            truncate(
                &String::from_utf8_lossy(&record.response_body),
                RESPONSE_PREVIEW_CAP,
            )
        } else {
            String::new()
        };

        tracing::info!(
            timestamp_ms = unix_millis(record.started_at),
            duration_ms = record.duration.as_millis() as u64,
            method = %record.method,
            path = %record.path,
            query = %record.query,
            status_code = record.status,
            client_addr = %record.client_addr,
            family = %record.family,
            api_key = %api_key,
            request_body = %request_body,
            response_body = %response_body,
            "api_request"
        );
    }

    /// Emit the connect event for one relay session, exactly once, at the
    /// Connecting -> Active transition.
    pub fn record_session_connect(&self, client_addr: &str, path: &str, family: ApiFamily) {
        tracing::info!(
            client_addr = %client_addr,
            path = %path,
            family = %family,
            "websocket_connect"
        );
    }

    /// Emit the disconnect event for one relay session, exactly once, after
    /// both forwarding tasks have exited.
    pub fn record_session_disconnect(
        &self,
        client_addr: &str,
        path: &str,
        family: ApiFamily,
        duration: Duration,
    ) {
        tracing::info!(
            client_addr = %client_addr,
            path = %path,
            family = %family,
            duration_ms = duration.as_millis() as u64,
            "websocket_disconnect"
        );
    }

    /// Emit the transfer event for one relayed data message.
    pub fn record_message(
        &self,
        direction: Direction,
        client_addr: &str,
        family: ApiFamily,
        payload: &[u8],
    ) {
        tracing::debug!(
            direction = %direction,
            client_addr = %client_addr,
            family = %family,
            size_bytes = payload.len(),
            content = %truncate(&String::from_utf8_lossy(payload), MAX_MESSAGE_PREVIEW),
            "websocket_message"
        );
    }
}

fn unix_millis(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Mask an API key for logging: keep four characters at each end, or mask
/// entirely when the key is too short for that to hide anything.
pub fn mask_api_key(key: &str) -> String {
    if key.len() <= 8 {
        return "****".to_string();
    }
    format!("{}****{}", &key[..4], &key[key.len() - 4..])
}

/// Truncate a preview at `max` bytes, backing off to a char boundary.
fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...[truncated]", &s[..end])
}
