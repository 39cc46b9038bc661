//! Sand HTTP grain.
//!
//! An HTTP server lifecycle manager and middleware pipeline assembler. A
//! [`HttpGrain`] is configured once, assembles its request pipeline in a
//! fixed order on `init`, serves on `start`, and stops accepting on
//! `shutdown` while in-flight requests drain.
//!
//! ```text
//!  client ──▶ net (listener, connection tracking)
//!               │
//!               ▼
//!             http::App pipeline
//!               headers → path prefix → request time → [profiler]
//!               → request context → adaptive images → static files
//!               → sessions → body parsers → [hooks] → views → router
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod middleware;
pub mod net;
pub mod observability;
pub mod view;

pub use config::HttpConfig;
pub use error::HttpError;
pub use http::{App, Context, HttpGrain, HttpGrainBuilder};
pub use lifecycle::{LifecycleEvent, LifecycleState};
