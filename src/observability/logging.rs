//! Structured logging.
//!
//! # Responsibilities
//! - Install the global `tracing` subscriber
//! - Pick the output format (JSON or pretty) from configuration
//! - Resolve the log filter from `RUST_LOG`, falling back to `log_level`
//!
//! # Design Decisions
//! - The library never installs a subscriber on its own; the binary (or an
//!   embedding application) calls [`init_logging`] once at startup
//! - Request fields (`request_id`, `method`, `path`) come from the span opened
//!   by the request-context registrar

use tracing_subscriber::{
    layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError, EnvFilter, Layer, Registry,
};

use crate::config::{LogFormat, ObservabilityConfig};

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &ObservabilityConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let format: Box<dyn Layer<Registry> + Send + Sync> = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().with_target(false).boxed(),
    };

    tracing_subscriber::registry().with(format).with(filter).try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_fails() {
        let config = ObservabilityConfig::default();
        // Another test may have installed a subscriber already; either way
        // the second call in this test must fail.
        let _ = init_logging(&config);
        assert!(init_logging(&config).is_err());
    }
}
