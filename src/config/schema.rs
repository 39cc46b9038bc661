//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the HTTP grain.
//! All types derive Serde traits for deserialization from config files.
//! Only `port` is required; everything else falls back to a default.

use serde::{Deserialize, Serialize};

/// Root configuration for the HTTP grain.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    /// TCP port for the listening socket (0 picks an ephemeral port).
    pub port: u16,

    /// Bind address (e.g., "0.0.0.0").
    #[serde(default = "default_host")]
    pub host: String,

    /// Prefix stripped from every request target. Non-matching requests get a 404.
    #[serde(default)]
    pub path_prefix: Option<String>,

    /// Filesystem root for static asset serving.
    #[serde(default = "default_static_file_directory")]
    pub static_file_directory: String,

    /// Options forwarded to the static file server.
    #[serde(default)]
    pub static_files: StaticFilesConfig,

    /// Enable URL-encoded and JSON body parsing.
    #[serde(default = "default_true")]
    pub use_body_parser: bool,

    /// Body parser options.
    #[serde(default)]
    pub body_parser: BodyParserConfig,

    /// View engine settings.
    #[serde(default)]
    pub view: ViewConfig,

    /// Session settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Maximum concurrent connections (backpressure on accept).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Install the tracing profiler logger (binary only; libraries inject their own).
    #[serde(default)]
    pub profiler: bool,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl HttpConfig {
    /// Create a configuration for `port` with every other field defaulted.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            host: default_host(),
            path_prefix: None,
            static_file_directory: default_static_file_directory(),
            static_files: StaticFilesConfig::default(),
            use_body_parser: true,
            body_parser: BodyParserConfig::default(),
            view: ViewConfig::default(),
            session: SessionConfig::default(),
            max_connections: default_max_connections(),
            profiler: false,
            observability: ObservabilityConfig::default(),
        }
    }

    /// The configured path prefix. An empty prefix means no prefix.
    pub fn prefix(&self) -> Option<&str> {
        self.path_prefix.as_deref().filter(|prefix| !prefix.is_empty())
    }

    /// The `host:port` string the listener binds to.
    pub fn bind_address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_static_file_directory() -> String {
    "public".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_connections() -> usize {
    10_000
}

/// Static file server options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StaticFilesConfig {
    /// Serve `index.html` for directory requests.
    pub index: bool,

    /// Serve `.gz` siblings to clients accepting gzip.
    pub precompressed_gzip: bool,

    /// Serve `.br` siblings to clients accepting brotli.
    pub precompressed_br: bool,
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            index: true,
            precompressed_gzip: false,
            precompressed_br: false,
        }
    }
}

/// Body parser options, one section per codec.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct BodyParserConfig {
    pub urlencoded: UrlencodedConfig,
    pub json: JsonConfig,
}

/// URL-encoded body parser options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UrlencodedConfig {
    /// Maximum body size in bytes.
    pub limit: usize,

    /// Maximum number of parameters.
    pub parameter_limit: usize,

    /// Media types handled by this parser.
    pub types: Vec<String>,
}

impl Default for UrlencodedConfig {
    fn default() -> Self {
        Self {
            limit: 100 * 1024,
            parameter_limit: 1000,
            types: vec!["application/x-www-form-urlencoded".to_string()],
        }
    }
}

/// JSON body parser options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct JsonConfig {
    /// Maximum body size in bytes.
    pub limit: usize,

    /// Accept only objects and arrays at the top level.
    pub strict: bool,

    /// Media types handled by this parser. `*/*+json` matches any `+json` suffix.
    pub types: Vec<String>,
}

impl Default for JsonConfig {
    fn default() -> Self {
        Self {
            limit: 100 * 1024,
            strict: true,
            types: vec!["application/json".to_string(), "*/*+json".to_string()],
        }
    }
}

/// View engine options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Register the view engine with the application.
    pub enabled: bool,

    /// Template directory.
    pub directory: String,

    /// Extension appended to template names that have none.
    pub extension: String,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: "views".to_string(),
            extension: "html".to_string(),
        }
    }
}

/// Session options for the built-in in-memory session registrar.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Attach the session middleware.
    pub enabled: bool,

    /// Name of the session cookie.
    pub cookie_name: String,

    /// Cookie `Max-Age` in seconds; `None` issues a browser-session cookie.
    pub max_age_secs: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cookie_name: "sand.sid".to_string(),
            max_age_secs: None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_only_needs_port() {
        let config: HttpConfig = toml::from_str("port = 8080").unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.static_file_directory, "public");
        assert!(config.use_body_parser);
        assert!(config.path_prefix.is_none());
        assert!(!config.view.enabled);
        assert_eq!(config.body_parser.json.limit, 100 * 1024);
    }

    #[test]
    fn missing_port_is_rejected() {
        assert!(toml::from_str::<HttpConfig>("host = \"127.0.0.1\"").is_err());
    }

    #[test]
    fn nested_sections_parse() {
        let config: HttpConfig = toml::from_str(
            r#"
            port = 3000
            path_prefix = "/api"

            [body_parser.json]
            strict = false

            [view]
            enabled = true
            directory = "templates"

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.path_prefix.as_deref(), Some("/api"));
        assert!(!config.body_parser.json.strict);
        assert_eq!(config.body_parser.urlencoded.parameter_limit, 1000);
        assert_eq!(config.view.directory, "templates");
        assert_eq!(config.view.extension, "html");
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }

    #[test]
    fn bind_address_brackets_ipv6() {
        let mut config = HttpConfig::new(80);
        assert_eq!(config.bind_address(), "0.0.0.0:80");
        config.host = "::1".to_string();
        assert_eq!(config.bind_address(), "[::1]:80");
    }
}
