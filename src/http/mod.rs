//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! GET /        Config-Hash → broker subscription (bounded by long-poll)
//!                  → 200 document | 304 unchanged | 503 broker gone
//! PUT|PATCH /  template text → ConfigTemplate::parse
//!                  → 400 on error | persist → broker swap → 202
//! GET /status  → broker status as JSON
//! ```

pub mod handlers;
pub mod server;

pub use handlers::{AppState, CONFIG_HASH};
pub use server::HttpServer;
