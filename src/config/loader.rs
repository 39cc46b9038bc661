//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::HttpConfig;
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
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<HttpConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    HttpConfig::from_toml_str(&content)
}

impl HttpConfig {
    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: HttpConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Run semantic validation on an already-built configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_config(self).map_err(ConfigError::Validation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 9000\npath_prefix = \"/api\"").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.path_prefix.as_deref(), Some("/api"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn invalid_values_report_all_fields() {
        let err = HttpConfig::from_toml_str("port = 1\nhost = \"x\"\nmax_connections = 0")
            .unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Validation failed"));
        assert!(message.contains("host"));
        assert!(message.contains("max_connections"));
    }

    #[test]
    fn syntax_error_is_parse_error() {
        let err = HttpConfig::from_toml_str("port = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
