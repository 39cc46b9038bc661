//! HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! server.rs    init → pipeline.rs builds App (app.rs) → frozen AppService
//!              start → net::Listener → AppService per connection
//! request      → middleware units in attachment order
//!              → router.rs (registrar-built Router)
//!              → handlers, using context.rs / request.rs
//!              → response.rs for responses produced by the pipeline itself
//! ```

pub mod app;
pub mod context;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod router;
pub mod server;

pub use app::{App, AppService};
pub use context::Context;
pub use pipeline::{Collaborators, Hook, Hooks};
pub use request::{RequestContext, RequestId, X_REQUEST_ID};
pub use router::{Controller, ControllerRoutes, NoRoutes, RouteRegistrar};
pub use server::{GrainInfo, HttpGrain, HttpGrainBuilder};
