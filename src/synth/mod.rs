//! Configuration synthesis.
//!
//! # Data Flow
//! ```text
//! controller labels ─┐
//!                    ├→ synthesizer.rs → ConfigModel (one per pass)
//! services ──────────┘
//! ```
//!
//! # Design Decisions
//! - The model is rebuilt from scratch every pass, never patched
//! - Replicas and endpoint mode come from the descriptor, not labels
//! - Snippets only extend frontends the controller declared

pub mod model;
pub mod synthesizer;

pub use model::{BackendConfig, ConfigModel};
pub use synthesizer::Synthesizer;
