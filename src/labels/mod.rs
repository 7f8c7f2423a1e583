//! Label decoding subsystem.
//!
//! # Data Flow
//! ```text
//! flat labels {"ingress.frontend.web": "..."}
//!     → decoder.rs (dotted keys → nested LabelTree)
//!     → schema.rs (LabelTree → ControllerLabels / BackendLabels)
//! ```

pub mod decoder;
pub mod schema;

pub use decoder::{decode_labels, decode_namespace, LabelTree, LabelValue};
pub use schema::{BackendLabels, ControllerLabels, DecodeError};

/// Default reserved label namespace.
pub const DEFAULT_NAMESPACE: &str = "ingress";
