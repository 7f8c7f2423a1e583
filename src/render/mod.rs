//! Rendering subsystem.
//!
//! # Data Flow
//! ```text
//! template text
//!     → template.rs (parse at the boundary → ConfigTemplate)
//! ConfigModel + ConfigTemplate
//!     → document.rs (render, sorted maps, SHA-256/128 fingerprint, JSON view)
//!     → RenderedDocument (immutable, shared via Arc)
//! ```

pub mod document;
pub mod template;

pub use document::{content_hash, render, RenderedDocument};
pub use template::{expand_snippet, template_name, ConfigTemplate, RenderError, TemplateError};
