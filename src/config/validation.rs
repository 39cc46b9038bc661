//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, addresses parse)
//! - Make sure the path prefix compiles before the pipeline relies on it
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: HttpConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::{IpAddr, SocketAddr};

use thiserror::Error;

use crate::config::schema::HttpConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check every semantic rule and collect all violations.
pub fn validate_config(config: &HttpConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.host.parse::<IpAddr>().is_err() {
        errors.push(ValidationError::new(
            "host",
            format!("'{}' is not an IP address", config.host),
        ));
    }

    if let Some(prefix) = config.prefix() {
        if !prefix.starts_with('/') {
            errors.push(ValidationError::new("path_prefix", "must start with '/'"));
        }
        if let Err(e) = regex::Regex::new(&format!("^{prefix}(.*)")) {
            errors.push(ValidationError::new("path_prefix", e.to_string()));
        }
    }

    if config.max_connections == 0 {
        errors.push(ValidationError::new("max_connections", "must be > 0"));
    }

    let urlencoded = &config.body_parser.urlencoded;
    if urlencoded.limit == 0 {
        errors.push(ValidationError::new("body_parser.urlencoded.limit", "must be > 0"));
    }
    if urlencoded.parameter_limit == 0 {
        errors.push(ValidationError::new(
            "body_parser.urlencoded.parameter_limit",
            "must be > 0",
        ));
    }
    if config.body_parser.json.limit == 0 {
        errors.push(ValidationError::new("body_parser.json.limit", "must be > 0"));
    }

    if config.view.enabled && config.view.directory.trim().is_empty() {
        errors.push(ValidationError::new(
            "view.directory",
            "is required when views are enabled",
        ));
    }

    let cookie = &config.session.cookie_name;
    if cookie.is_empty() || !cookie.bytes().all(is_cookie_token_byte) {
        errors.push(ValidationError::new(
            "session.cookie_name",
            format!("'{cookie}' is not a valid cookie name"),
        ));
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// RFC 6265 token characters.
fn is_cookie_token_byte(b: u8) -> bool {
    b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b)
}
