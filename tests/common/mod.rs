//! Shared helpers for integration tests: mock upstreams and a proxy spawner.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocketUpgrade};
use axum::extract::{OriginalUri, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use tokio::net::TcpListener;

use exchange_proxy::config::ProxyConfig;
use exchange_proxy::lifecycle::Shutdown;
use exchange_proxy::HttpServer;

/// Nothing listens here; used to simulate a dead upstream.
const DEAD_ADDR: &str = "127.0.0.1:9";

/// One request as seen by the mock REST upstream.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub query: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

pub type Captured = Arc<Mutex<Vec<CapturedRequest>>>;

/// REST upstream that records every request. Answers a fixed JSON body,
/// except paths containing "error" which get a 503.
pub async fn start_rest_upstream() -> (SocketAddr, Captured) {
    let captured: Captured = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .fallback(any(capture))
        .with_state(captured.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, captured)
}

async fn capture(
    State(captured): State<Captured>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    captured.lock().unwrap().push(CapturedRequest {
        method: method.to_string(),
        path: path.clone(),
        query: uri.query().unwrap_or_default().to_string(),
        headers,
        body: body.to_vec(),
    });
    if path.contains("error") {
        return (StatusCode::SERVICE_UNAVAILABLE, "upstream down").into_response();
    }
    (
        StatusCode::OK,
        [("content-type", "application/json"), ("x-upstream", "mock")],
        r#"{"ok":true}"#,
    )
        .into_response()
}

/// WebSocket upstream that records the connect URI and echoes data frames.
pub async fn start_ws_upstream() -> (SocketAddr, Arc<Mutex<Vec<String>>>) {
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/ws", any(echo))
        .route("/ws/{streams}", any(echo))
        .route("/stream", any(echo))
        .with_state(seen.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, seen)
}

async fn echo(
    State(seen): State<Arc<Mutex<Vec<String>>>>,
    OriginalUri(uri): OriginalUri,
    ws: WebSocketUpgrade,
) -> Response {
    seen.lock().unwrap().push(uri.to_string());
    ws.on_upgrade(|mut socket| async move {
        while let Some(Ok(message)) = socket.recv().await {
            match message {
                Message::Text(_) | Message::Binary(_) => {
                    if socket.send(message).await.is_err() {
                        break;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    })
}

/// WebSocket upstream that pushes one text frame on connect, then closes
/// with a normal-closure code.
pub async fn start_ws_push_upstream() -> SocketAddr {
    async fn push(ws: WebSocketUpgrade) -> Response {
        ws.on_upgrade(|mut socket| async move {
            let _ = socket.send(Message::Text("welcome".into())).await;
            let _ = socket.send(Message::Close(None)).await;
        })
    }
    let app = Router::new()
        .route("/ws", any(push))
        .route("/ws/{streams}", any(push));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Start the proxy with both families pointed at the given upstreams; `None`
/// targets a dead port.
pub async fn start_proxy(
    rest_upstream: Option<SocketAddr>,
    ws_upstream: Option<SocketAddr>,
) -> (SocketAddr, Arc<Shutdown>) {
    let rest_url = match rest_upstream {
        Some(addr) => format!("http://{addr}"),
        None => format!("http://{DEAD_ADDR}"),
    };
    let ws_url = match ws_upstream {
        Some(addr) => format!("ws://{addr}"),
        None => format!("ws://{DEAD_ADDR}"),
    };

    let mut config = ProxyConfig::default();
    config.upstream.spot.rest_url = rest_url.clone();
    config.upstream.spot.ws_url = ws_url.clone();
    config.upstream.futures.rest_url = rest_url;
    config.upstream.futures.ws_url = ws_url;
    config.server.shutdown_grace_secs = 2;

    let shutdown = Arc::new(Shutdown::new());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(&config, shutdown.clone()).unwrap();

    let run_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, &run_shutdown).await;
    });
    (addr, shutdown)
}
