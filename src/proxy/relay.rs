//! Bidirectional WebSocket relay.
//!
//! # Responsibilities
//! - Complete the client upgrade, then dial the family's stream upstream
//! - Forward messages in both directions, unmodified in type and bytes
//! - Classify termination (clean close vs abnormal) and tear down both sides
//! - Emit connect / message / disconnect events
//!
//! # Session state machine
//! ```text
//! Connecting ──dial ok──▶ Active ──first failure/close──▶ Closing ──▶ Closed
//!      │
//!      └──dial failed──▶ (aborted: no session, no connect event)
//! ```
//!
//! # Design Decisions
//! - Two structurally identical pump tasks share one single-fire termination
//!   signal; whichever side detects the end fires it, idempotently
//! - Message boundaries are never split or merged; ping/pong frames are
//!   relayed transparently and not counted as data messages
//! - Nothing is retried: a dead session stays dead

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{self, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Path, State};
use axum::http::header::{self, HeaderValue};
use axum::http::{HeaderMap, Uri};
use axum::response::Response;
use axum::Extension;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Notify};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message as UpstreamMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use crate::http::AppState;
use crate::observability::{Direction, ProxyEvents};
use crate::proxy::client_addr;
use crate::proxy::path::upstream_stream_path;
use crate::upstream::{ApiFamily, API_KEY_HEADER};

type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SocketError = Box<dyn std::error::Error + Send + Sync>;

const CLOSE_NORMAL: u16 = 1000;
const CLOSE_GOING_AWAY: u16 = 1001;

/// Upgrade the inbound request and run a relay session against the family's
/// stream upstream.
pub async fn handler(
    State(state): State<AppState>,
    Extension(family): Extension<ApiFamily>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    streams: Option<Path<String>>,
    uri: Uri,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let client = client_addr(&headers, peer);
    let streams = streams.map(|Path(s)| s);
    let upstream_path = upstream_stream_path(uri.path(), streams.as_deref());

    // Same signature-preservation rule as the REST side: the raw query is
    // appended untouched.
    let pair = state.endpoints.pair(family);
    let mut target = format!("{}{}", pair.stream_base, upstream_path);
    if let Some(query) = uri.query() {
        target.push('?');
        target.push_str(query);
    }

    let api_key = headers.get(&API_KEY_HEADER).cloned();
    let shutdown = state.shutdown.subscribe();
    let events = state.events.clone();

    ws.on_upgrade(move |client_socket| {
        relay_session(
            client_socket,
            target,
            upstream_path,
            client,
            family,
            api_key,
            events,
            shutdown,
        )
    })
}

/// Drive one session from dial to teardown.
#[allow(clippy::too_many_arguments)]
async fn relay_session(
    client_socket: WebSocket,
    target: String,
    upstream_path: String,
    client: String,
    family: ApiFamily,
    api_key: Option<HeaderValue>,
    events: Arc<ProxyEvents>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let session_id = Uuid::new_v4();
    let started = Instant::now();

    let mut request = match target.as_str().into_client_request() {
        Ok(request) => request,
        Err(e) => {
            tracing::error!(error = %e, target = %target, "invalid upstream websocket target");
            return;
        }
    };
    if let Some(host) = request.uri().host() {
        if let Ok(origin) = HeaderValue::from_str(&format!("https://{host}")) {
            request.headers_mut().insert(header::ORIGIN, origin);
        }
    }
    if let Some(key) = api_key {
        request.headers_mut().insert(&API_KEY_HEADER, key);
    }

    // Dial failure aborts before the session ever becomes visible: no connect
    // event, no disconnect event; the client socket drops closed.
    let upstream_socket = match connect_async(request).await {
        Ok((socket, _response)) => socket,
        Err(e) => {
            tracing::error!(
                error = %e,
                target = %target,
                family = %family,
                session_id = %session_id,
                "upstream websocket dial failed"
            );
            return;
        }
    };

    events.record_session_connect(&client, &upstream_path, family);
    tracing::debug!(
        session_id = %session_id,
        client_addr = %client,
        family = %family,
        target = %target,
        "relay session active"
    );

    let termination = Termination::new();
    let (upstream_sink, upstream_stream) = upstream_socket.split();
    let (client_sink, client_stream) = client_socket.split();

    let to_upstream = pump(
        client_stream,
        upstream_sink,
        Direction::ClientToUpstream,
        &termination,
        &events,
        &client,
        family,
    );
    let to_client = pump(
        upstream_stream,
        client_sink,
        Direction::UpstreamToClient,
        &termination,
        &events,
        &client,
        family,
    );

    let pumps = async { tokio::join!(to_upstream, to_client) };
    tokio::pin!(pumps);

    tokio::select! {
        _ = &mut pumps => {}
        _ = shutdown.recv() => {
            // Process shutdown severs the session; the pumps observe the
            // signal and finish within the grace period.
            termination.fire();
            let _ = pumps.await;
        }
    }

    events.record_session_disconnect(&client, &upstream_path, family, started.elapsed());
    tracing::debug!(session_id = %session_id, client_addr = %client, "relay session closed");
}

/// How one pump task came to an end.
#[derive(Debug, PartialEq, Eq)]
enum PumpOutcome {
    /// EOF or a close handshake with a normal/going-away code.
    Clean,
    /// Read/write error or a close with any other code.
    Abnormal,
    /// The peer pump (or process shutdown) fired the termination signal.
    Severed,
}

/// Forward frames from `src` to `dst` until the session terminates.
///
/// Both directions run this same routine with swapped endpoints. The first
/// side to detect termination fires the shared signal; the other side picks
/// it up around its blocking read.
async fn pump<S, D>(
    mut src: S,
    mut dst: D,
    direction: Direction,
    termination: &Termination,
    events: &ProxyEvents,
    client: &str,
    family: ApiFamily,
) -> PumpOutcome
where
    S: FrameSource,
    D: FrameSink,
{
    loop {
        let next = tokio::select! {
            _ = termination.cancelled() => {
                let _ = dst
                    .send_frame(Frame::Close(Some(CloseReason {
                        code: CLOSE_GOING_AWAY,
                        reason: String::new(),
                    })))
                    .await;
                return PumpOutcome::Severed;
            }
            next = src.next_frame() => next,
        };

        match next {
            None => {
                tracing::debug!(direction = %direction, client_addr = %client, "relay source ended");
                termination.fire();
                return PumpOutcome::Clean;
            }
            Some(Err(e)) => {
                tracing::warn!(
                    direction = %direction,
                    client_addr = %client,
                    error = %e,
                    "relay read failed"
                );
                termination.fire();
                return PumpOutcome::Abnormal;
            }
            Some(Ok(Frame::Close(reason))) => {
                let clean = reason.as_ref().is_none_or(CloseReason::is_clean);
                if clean {
                    tracing::debug!(direction = %direction, client_addr = %client, "close handshake");
                } else if let Some(reason) = &reason {
                    tracing::warn!(
                        direction = %direction,
                        client_addr = %client,
                        code = reason.code,
                        "abnormal close"
                    );
                }
                let _ = dst.send_frame(Frame::Close(reason)).await;
                termination.fire();
                return if clean {
                    PumpOutcome::Clean
                } else {
                    PumpOutcome::Abnormal
                };
            }
            Some(Ok(frame)) => {
                if let Some(payload) = frame.data_payload() {
                    events.record_message(direction, client, family, payload);
                }
                if let Err(e) = dst.send_frame(frame).await {
                    tracing::warn!(
                        direction = %direction,
                        client_addr = %client,
                        error = %e,
                        "relay write failed"
                    );
                    termination.fire();
                    return PumpOutcome::Abnormal;
                }
            }
        }
    }
}

/// Single-fire termination signal shared by a session's two pump tasks.
///
/// `fire` is idempotent and never blocks; exactly one caller sees `true` even
/// when both pumps fire in the same instant.
#[derive(Debug, Default)]
pub(crate) struct Termination {
    fired: AtomicBool,
    notify: Notify,
}

impl Termination {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fire(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.notify.notify_waiters();
        true
    }

    pub(crate) async fn cancelled(&self) {
        if self.fired.load(Ordering::Acquire) {
            return;
        }
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        // Re-check after registering, so a fire between the first load and
        // registration is not missed.
        if self.fired.load(Ordering::Acquire) {
            return;
        }
        notified.await;
    }
}

/// A relayed frame, independent of which socket library produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Frame {
    Text(String),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close(Option<CloseReason>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CloseReason {
    code: u16,
    reason: String,
}

impl CloseReason {
    fn is_clean(&self) -> bool {
        matches!(self.code, CLOSE_NORMAL | CLOSE_GOING_AWAY)
    }
}

impl Frame {
    /// Payload of a data message; `None` for control frames.
    fn data_payload(&self) -> Option<&[u8]> {
        match self {
            Frame::Text(t) => Some(t.as_bytes()),
            Frame::Binary(b) => Some(b),
            _ => None,
        }
    }

    fn from_client(message: ws::Message) -> Self {
        match message {
            ws::Message::Text(t) => Frame::Text(t.as_str().to_owned()),
            ws::Message::Binary(b) => Frame::Binary(b),
            ws::Message::Ping(b) => Frame::Ping(b),
            ws::Message::Pong(b) => Frame::Pong(b),
            ws::Message::Close(frame) => Frame::Close(frame.map(|f| CloseReason {
                code: f.code,
                reason: f.reason.as_str().to_owned(),
            })),
        }
    }

    fn into_client(self) -> ws::Message {
        match self {
            Frame::Text(t) => ws::Message::Text(t.into()),
            Frame::Binary(b) => ws::Message::Binary(b),
            Frame::Ping(b) => ws::Message::Ping(b),
            Frame::Pong(b) => ws::Message::Pong(b),
            Frame::Close(reason) => ws::Message::Close(reason.map(|r| ws::CloseFrame {
                code: r.code,
                reason: r.reason.into(),
            })),
        }
    }

    fn from_upstream(message: UpstreamMessage) -> Self {
        match message {
            UpstreamMessage::Text(t) => Frame::Text(t.as_str().to_owned()),
            UpstreamMessage::Binary(b) => Frame::Binary(b),
            UpstreamMessage::Ping(b) => Frame::Ping(b),
            UpstreamMessage::Pong(b) => Frame::Pong(b),
            UpstreamMessage::Close(frame) => Frame::Close(frame.map(|f| CloseReason {
                code: f.code.into(),
                reason: f.reason.as_str().to_owned(),
            })),
            // Raw frames only occur on the write path; reads never yield them.
            UpstreamMessage::Frame(frame) => Frame::Binary(frame.into_payload()),
        }
    }

    fn into_upstream(self) -> UpstreamMessage {
        match self {
            Frame::Text(t) => UpstreamMessage::Text(t.into()),
            Frame::Binary(b) => UpstreamMessage::Binary(b),
            Frame::Ping(b) => UpstreamMessage::Ping(b),
            Frame::Pong(b) => UpstreamMessage::Pong(b),
            Frame::Close(reason) => UpstreamMessage::Close(reason.map(|r| CloseFrame {
                code: CloseCode::from(r.code),
                reason: r.reason.into(),
            })),
        }
    }
}

/// Reading side of a relay socket.
trait FrameSource {
    async fn next_frame(&mut self) -> Option<Result<Frame, SocketError>>;
}

/// Writing side of a relay socket.
trait FrameSink {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), SocketError>;
}

impl<T: FrameSink> FrameSink for &mut T {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), SocketError> {
        (**self).send_frame(frame).await
    }
}

impl FrameSource for SplitStream<WebSocket> {
    async fn next_frame(&mut self) -> Option<Result<Frame, SocketError>> {
        self.next()
            .await
            .map(|r| r.map(Frame::from_client).map_err(Into::into))
    }
}

impl FrameSink for SplitSink<WebSocket, ws::Message> {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), SocketError> {
        SinkExt::send(self, frame.into_client())
            .await
            .map_err(Into::into)
    }
}

impl FrameSource for SplitStream<UpstreamSocket> {
    async fn next_frame(&mut self) -> Option<Result<Frame, SocketError>> {
        self.next()
            .await
            .map(|r| r.map(Frame::from_upstream).map_err(Into::into))
    }
}

impl FrameSink for SplitSink<UpstreamSocket, UpstreamMessage> {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), SocketError> {
        SinkExt::send(self, frame.into_upstream())
            .await
            .map_err(Into::into)
    }
}
