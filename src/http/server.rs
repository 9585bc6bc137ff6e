//! HTTP server setup and lifecycle.
//!
//! # Responsibilities
//! - Create the Axum router: health endpoints plus one nested router per
//!   API family
//! - Hold the shared application state (endpoint registry, outbound client,
//!   event sink, shutdown handle)
//! - Serve with graceful drain and a bounded grace period

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::{any, get};
use axum::{Extension, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::health;
use crate::lifecycle::Shutdown;
use crate::observability::ProxyEvents;
use crate::proxy::{relay, rest};
use crate::upstream::{ApiFamily, Endpoints};

/// Outbound connect timeout towards REST upstreams. There is no per-request
/// timeout beyond this: trading calls must fail or complete, never be
/// abandoned halfway and retried.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Read-only endpoint registry, built once from config.
    pub endpoints: Arc<Endpoints>,
    /// Outbound HTTP client, shared across REST calls.
    pub client: reqwest::Client,
    /// Event sink for request and session events.
    pub events: Arc<ProxyEvents>,
    /// Shutdown handle; relay sessions subscribe so an idle session can be
    /// severed within the grace period.
    pub shutdown: Arc<Shutdown>,
    /// Process start, for the health endpoints.
    pub started_at: Instant,
}

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
    grace: Duration,
}

impl HttpServer {
    /// Build the server from validated configuration.
    pub fn new(config: &ProxyConfig, shutdown: Arc<Shutdown>) -> Result<Self, ProxyError> {
        let endpoints = Arc::new(Endpoints::from_config(&config.upstream));

        // Redirects pass through to the caller; following them here would
        // re-issue a signed request against a different URL.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ProxyError::Configuration(e.to_string()))?;

        let events = Arc::new(ProxyEvents::new(
            config.logging.log_requests,
            config.logging.log_responses,
        ));

        let state = AppState {
            endpoints,
            client,
            events,
            shutdown,
            started_at: Instant::now(),
        };

        Ok(Self {
            router: Self::build_router(state),
            grace: Duration::from_secs(config.server.shutdown_grace_secs),
        })
    }

    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/health", get(health::liveness))
            .route("/ready", get(health::readiness))
            .nest("/spot", family_router(ApiFamily::Spot))
            .nest("/futures", family_router(ApiFamily::Futures))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until shutdown.
    ///
    /// A listen-time failure is returned and fatal. Once the shutdown signal
    /// fires, in-flight work gets the configured grace period; whatever
    /// remains after that is abandoned to process exit, and drain-time
    /// failures are logged rather than propagated.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "server listening");

        let mut accept_rx = shutdown.subscribe();
        let mut drain_rx = shutdown.subscribe();
        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        let mut serve = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = accept_rx.recv().await;
                })
                .await
        });

        tokio::select! {
            result = &mut serve => return flatten(result),
            _ = drain_rx.recv() => {}
        }

        tracing::info!(
            grace_secs = self.grace.as_secs(),
            "shutdown signal received, draining in-flight work"
        );

        match tokio::time::timeout(self.grace, &mut serve).await {
            Ok(result) => {
                if let Err(e) = flatten(result) {
                    tracing::error!(error = %e, "error while draining");
                }
            }
            Err(_) => {
                tracing::warn!(
                    grace_secs = self.grace.as_secs(),
                    "grace period expired, abandoning remaining connections"
                );
                // Aborting stops the drain wait, not the per-connection
                // tasks axum spawned; those are detached and end with the
                // process.
                serve.abort();
            }
        }

        tracing::info!("server stopped");
        Ok(())
    }
}

/// Router for one API family. The nest prefix has already selected the
/// family; `/ws`, `/ws/{streams}` and `/stream` upgrade to relay sessions,
/// everything else is a REST call with the prefix stripped.
fn family_router(family: ApiFamily) -> Router<AppState> {
    Router::new()
        .route("/ws", any(relay::handler))
        .route("/ws/{streams}", any(relay::handler))
        .route("/stream", any(relay::handler))
        .fallback(rest::handler)
        .layer(Extension(family))
}

fn flatten(result: Result<std::io::Result<()>, tokio::task::JoinError>) -> std::io::Result<()> {
    match result {
        Ok(inner) => inner,
        Err(join_error) => Err(std::io::Error::other(join_error)),
    }
}
