//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! REST proxy / WebSocket relay produce:
//!     → events.rs (request + session lifecycle events)
//!     → logging.rs (tracing subscriber, JSON or pretty)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//! ```
//!
//! # Design Decisions
//! - The event collaborator is injected explicitly (Arc in AppState), never
//!   reached through ambient global state, so tests can construct it directly
//! - API keys are masked before they reach any sink
//! - Body and message previews are truncated at fixed caps

pub mod events;
pub mod logging;

pub use events::{Direction, ProxyEvents, RequestRecord};
