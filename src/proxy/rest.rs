//! REST reverse proxy.
//!
//! # Responsibilities
//! - Rewrite the inbound request onto the family's REST base address
//! - Preserve raw query string, method, body bytes, and end-to-end headers
//! - Stream the upstream response back unmodified
//! - Emit one request event per call, carrying bounded body previews
//!
//! # Design Decisions
//! - The request body is buffered once: it is forwarded intact and its prefix
//!   feeds the request log
//! - The response is not buffered; a tee captures a bounded preview while the
//!   caller streams, and the event fires when the body completes (or the
//!   client goes away)
//! - Upstream failures surface as 502 exactly once; never retried

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Instant, SystemTime};

use axum::body::{to_bytes, Body};
use axum::extract::{ConnectInfo, OriginalUri, State};
use axum::http::{HeaderMap, HeaderName, Request, Response, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};

use crate::error::ProxyError;
use crate::http::AppState;
use crate::observability::events::{ProxyEvents, RequestRecord, RESPONSE_PREVIEW_CAP};
use crate::proxy::client_addr;
use crate::upstream::{ApiFamily, API_KEY_HEADER};

/// Upper bound on buffered request bodies. Trading payloads are a few
/// hundred bytes; anything past this is rejected, not buffered.
const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

/// Forward one REST call to the family's upstream.
///
/// The request arrives with the family prefix already stripped by the nested
/// router; the original URI is kept for logging only.
pub async fn handler(
    State(state): State<AppState>,
    Extension(family): Extension<ApiFamily>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    OriginalUri(original_uri): OriginalUri,
    request: Request<Body>,
) -> Response<Body> {
    let started_at = SystemTime::now();
    let start = Instant::now();

    let (parts, body) = request.into_parts();
    let client = client_addr(&parts.headers, peer);
    let api_key = parts
        .headers
        .get(&API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let body_bytes = match to_bytes(body, MAX_REQUEST_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, path = %original_uri.path(), "failed to read request body");
            return (StatusCode::BAD_REQUEST, "Unreadable or oversized request body")
                .into_response();
        }
    };

    // The raw query is appended byte-for-byte: it carries the caller's
    // signature and timestamp, computed over that exact string.
    let pair = state.endpoints.pair(family);
    let mut target = format!("{}{}", pair.rest_base, parts.uri.path());
    if let Some(query) = parts.uri.query() {
        target.push('?');
        target.push_str(query);
    }

    let pending = PendingRecord {
        events: state.events.clone(),
        start,
        started_at,
        method: parts.method.to_string(),
        path: original_uri.path().to_string(),
        query: parts.uri.query().unwrap_or_default().to_string(),
        request_body: body_bytes.clone(),
        client_addr: client,
        api_key,
        family,
    };

    let outbound = state
        .client
        .request(parts.method.clone(), &target)
        .headers(forward_headers(&parts.headers))
        .body(body_bytes)
        .send()
        .await;

    let upstream_response = match outbound {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(
                error = %e,
                target = %target,
                family = %family,
                "upstream request failed"
            );
            pending.emit(502, Vec::new());
            return ProxyError::UpstreamUnreachable(e.to_string()).into_response();
        }
    };

    let status = upstream_response.status();
    let headers = forward_headers(upstream_response.headers());
    let observed = ObservedBody::new(upstream_response.bytes_stream().boxed(), pending, status.as_u16());

    let mut response = Response::new(Body::from_stream(observed));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Headers that must not cross the proxy hop. Host and content-length are
/// recomputed by the outbound client and the server respectively.
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "host"
            | "content-length"
    )
}

fn forward_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in inbound {
        if is_hop_by_hop(name) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Deferred request event: everything known before the response body has
/// finished streaming.
struct PendingRecord {
    events: Arc<ProxyEvents>,
    start: Instant,
    started_at: SystemTime,
    method: String,
    path: String,
    query: String,
    request_body: Bytes,
    client_addr: String,
    api_key: Option<String>,
    family: ApiFamily,
}

impl PendingRecord {
    fn emit(self, status: u16, response_preview: Vec<u8>) {
        self.events.record_request(RequestRecord {
            started_at: self.started_at,
            duration: self.start.elapsed(),
            method: self.method,
            path: self.path,
            query: self.query,
            status,
            request_body: self.request_body,
            response_body: response_preview,
            client_addr: self.client_addr,
            api_key: self.api_key,
            family: self.family,
        });
    }
}

/// Response body tee: streams upstream chunks through unchanged while
/// capturing a bounded preview, then emits the request event exactly once —
/// at end-of-stream, or on drop if the client disconnected mid-body.
struct ObservedBody {
    inner: BoxStream<'static, Result<Bytes, reqwest::Error>>,
    preview: Vec<u8>,
    pending: Option<PendingRecord>,
    status: u16,
}

impl ObservedBody {
    fn new(
        inner: BoxStream<'static, Result<Bytes, reqwest::Error>>,
        pending: PendingRecord,
        status: u16,
    ) -> Self {
        Self {
            inner,
            preview: Vec::new(),
            pending: Some(pending),
            status,
        }
    }

    fn capture(&mut self, chunk: &Bytes) {
        // One byte past the cap so the log marks truncation.
        let cap = RESPONSE_PREVIEW_CAP + 1;
        if self.preview.len() < cap {
            let take = (cap - self.preview.len()).min(chunk.len());
            self.preview.extend_from_slice(&chunk[..take]);
        }
    }

    fn emit(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.emit(self.status, std::mem::take(&mut self.preview));
        }
    }
}

impl Stream for ObservedBody {
    type Item = Result<Bytes, reqwest::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                self.capture(&chunk);
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
            Poll::Ready(None) => {
                self.emit();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ObservedBody {
    fn drop(&mut self) {
        self.emit();
    }
}
