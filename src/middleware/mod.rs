//! Built-in middleware units.
//!
//! # Pipeline Order
//! ```text
//! [before_all hook]
//!     → headers.rs        (X-Content-Location, X-Powered-By)
//!     → path_prefix.rs    (strip prefix or 404)
//!     → request_time.rs   (access log + request metrics)
//!     → profiler.rs       (only with an injected profiler)
//!     → request_context.rs (task-local context, span, panic boundary)
//!     → adaptive_image.rs
//!     → static_files.rs   (asset pipeline, then the file server)
//!     → sessions.rs       (whatever the registrar attaches)
//!     → body_parser.rs    (urlencoded, json)
//! [before hook] [before_router hook] [router:before listeners]
//!     → views, router
//! ```
//!
//! Each unit exposes an `attach` function that appends it to an
//! [`App`](crate::http::App). The order above is fixed by the pipeline
//! assembler and is load-bearing: the header stamp must see every response,
//! and the prefix rewrite must run before anything that looks at the path.

pub mod adaptive_image;
pub mod body_parser;
pub mod headers;
pub mod path_prefix;
pub mod profiler;
pub mod request_context;
pub mod request_time;
pub mod sessions;
pub mod static_files;

pub use adaptive_image::{AcceptNegotiator, ImageFormat, ImageNegotiator};
pub use body_parser::ParsedBody;
pub use profiler::{Profile, Profiler, RequestProfile, TracingProfiler};
pub use sessions::{MemorySessions, Session, SessionRegistrar};
pub use static_files::{EmbeddedAssets, StaticAssets};
