//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → HttpConfig (validated, immutable)
//!     → shared via Arc with the pipeline and the router
//! ```
//!
//! # Design Decisions
//! - Config is immutable once the grain is initialized
//! - Every field except `port` has a default to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Hooks are code, not data: they live on the grain builder

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BodyParserConfig, HttpConfig, JsonConfig, LogFormat, ObservabilityConfig, SessionConfig,
    StaticFilesConfig, UrlencodedConfig, ViewConfig,
};
pub use validation::ValidationError;
