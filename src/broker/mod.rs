//! Reconciliation broker.
//!
//! # Responsibilities
//! - Run periodic and on-demand reconciliation passes
//! - Hold the single current document and the active template
//! - Answer one-shot subscriptions when the document changes
//!
//! # Data Flow
//! ```text
//! tick / reconcile_now
//!     → pass task: providers (bounded) → Synthesizer → ConfigModel
//!     → loop: render with current template → compare hash
//!     → changed: swap current, drain pending subscriptions
//!
//! BrokerHandle ──Command──▶ loop (subscribe, swap template, status)
//! ```
//!
//! # Design Decisions
//! - All mutable state is owned by one task; clients talk to it over mpsc
//! - Provider I/O runs in a spawned task so admission never waits on it
//! - At most one pass is in flight; reconcile requests during a pass queue
//!   a follow-up pass
//! - A failed pass leaves the current document and pending set untouched
//! - No document exists until a pass succeeds; until then every subscriber
//!   waits

pub mod handle;
pub mod reconciler;
pub mod subscription;

pub use handle::{BrokerError, BrokerHandle, BrokerStatus, PassError, PassSummary};
pub use reconciler::{Broker, BrokerSettings};
pub use subscription::Subscription;
