//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → Config (validated, immutable)
//!     → CLI overrides applied in main
//!
//! Template file (not the config file) is hot-reloaded:
//!     watcher.rs detects change
//!     → ConfigTemplate::load parses it
//!     → forward_templates installs it into the broker
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::Config;
pub use watcher::{forward_templates, TemplateWatcher};
