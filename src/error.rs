//! Crate-level error type.
//!
//! Only assembly and lifecycle failures are errors. Anything that goes wrong
//! while serving a request becomes a response for that request alone.

use axum::BoxError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::lifecycle::LifecycleState;
use crate::view::ViewError;

/// Errors returned by [`HttpGrain`](crate::HttpGrain) operations.
#[derive(Debug, Error)]
pub enum HttpError {
    /// A configuration hook or `router:before` listener failed during init.
    #[error("{hook} failed: {source}")]
    Hook {
        hook: &'static str,
        #[source]
        source: BoxError,
    },

    /// The operation is not allowed in the current lifecycle state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: LifecycleState,
    },

    /// The listening socket could not be bound.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    View(#[from] ViewError),
}

impl HttpError {
    pub(crate) fn hook(hook: &'static str, source: BoxError) -> Self {
        Self::Hook { hook, source }
    }
}
