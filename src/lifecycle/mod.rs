//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Controller labels → Providers (containers, swarm, static)
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain requests → Stop broker → Stop load balancer
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Immediate reconciliation pass
//! ```
//!
//! # Design Decisions
//! - Ordered startup lives in main: config, logging, template, providers, broker, listeners
//! - Every long-running task subscribes to one broadcast

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::handle_signals;
