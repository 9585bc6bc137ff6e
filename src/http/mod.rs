//! HTTP protocol surface.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, family routing: /spot, /futures)
//!     → proxy::rest (plain sub-paths, request/response)
//!     → proxy::relay (/ws, /ws/{streams}, /stream, upgraded sessions)
//! ```

pub mod server;

pub use server::{AppState, HttpServer};
