//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Init logging → Bind listener → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain within grace period → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM / SIGINT → trigger the shutdown broadcast
//! ```
//!
//! # Design Decisions
//! - A listen-time failure is fatal; a shutdown-time failure is logged only
//! - The grace period is a hard deadline: work remaining after it is
//!   abandoned to process exit

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
