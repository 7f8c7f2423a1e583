//! Label-driven HAProxy configuration controller.

pub mod agent;
pub mod apply;
pub mod broker;
pub mod config;
pub mod http;
pub mod labels;
pub mod lifecycle;
pub mod observability;
pub mod provider;
pub mod render;
pub mod synth;

pub use broker::{Broker, BrokerHandle};
pub use config::Config;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
