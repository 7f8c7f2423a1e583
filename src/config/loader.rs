//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::Config;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::EndpointMode;
    use std::io::Write;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.reconcile.namespace, "ingress");
        assert_eq!(config.reconcile.interval_secs, 5);
        assert!(!config.haproxy.manage);
    }

    #[test]
    fn test_full_file() {
        let config = parse_config(
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [reconcile]
            interval_secs = 2
            long_poll_secs = 10

            [controller]
            mock = true
            labels = { "ingress.class" = "edge" }

            [[mock.services]]
            name = "app"
            replicas = 3
            endpoint_mode = "dnsrr"
            labels = { "ingress.class" = "edge", "ingress.port" = "8080" }

            [haproxy]
            manage = true
            extra_args = ["-db"]

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.reconcile.interval_secs, 2);
        assert!(config.controller.mock);
        assert_eq!(config.controller.labels["ingress.class"], "edge");
        let app = &config.mock.services[0];
        assert_eq!(app.replicas, 3);
        assert_eq!(app.endpoint_mode, EndpointMode::Dnsrr);
        assert_eq!(config.haproxy.extra_args, vec!["-db"]);
        assert_eq!(config.observability.log_format, crate::observability::LogFormat::Json);
    }

    #[test]
    fn test_shipped_sample_parses() {
        let config = parse_config(include_str!("../../ingress.toml")).unwrap();
        assert_eq!(config.mock.services[0].name, "app");
        assert_eq!(config.listener.bind_address, "0.0.0.0:6789");
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(parse_config("[listener"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_validation_error() {
        let err = parse_config("[reconcile]\ninterval_secs = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref errors) if errors.len() == 1));
        assert!(err.to_string().contains("reconcile.interval_secs"));
    }

    #[test]
    fn test_load_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[reconcile]\nnamespace = \"lb\"").unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.reconcile.namespace, "lb");

        assert!(matches!(
            load_config(Path::new("/nonexistent/ingress.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
