//! Pipeline assembly.
//!
//! # Responsibilities
//! - Build the [`App`] in its fixed order during init
//! - Run configuration hooks at their slots
//! - Emit `router:before` right before the router is attached
//!
//! # Design Decisions
//! - The order is load-bearing: the header stamp sits outside everything so
//!   even prefix 404s carry it, and the prefix rewrite runs before any unit
//!   that looks at the path
//! - Hooks are `FnOnce`: init runs exactly once per grain
//! - The first failing hook or listener aborts init; later steps never run

use std::sync::Arc;

use axum::BoxError;

use crate::config::{ConfigError, ValidationError};
use crate::error::HttpError;
use crate::http::router::{NoRoutes, RouteRegistrar};
use crate::http::{App, GrainInfo};
use crate::lifecycle::Events;
use crate::middleware::{
    adaptive_image, body_parser, headers, path_prefix, profiler, request_context, request_time,
    static_files, AcceptNegotiator, ImageNegotiator, MemorySessions, Profiler, SessionRegistrar,
    StaticAssets,
};
use crate::view::{self, MiniJinjaEngine, ViewEngine};

/// Configuration hook run with the application handle during init.
pub type Hook = Box<dyn FnOnce(&mut App) -> Result<(), BoxError> + Send>;

/// Optional hooks, each invoked at its slot in the pipeline.
#[derive(Default)]
pub struct Hooks {
    /// Runs first, before any built-in unit.
    pub before_all_middleware: Option<Hook>,
    /// Runs after body parsing.
    pub before_middleware: Option<Hook>,
    /// Runs after `before_middleware`, before `router:before`.
    pub before_router_middleware: Option<Hook>,
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("before_all_middleware", &self.before_all_middleware.is_some())
            .field("before_middleware", &self.before_middleware.is_some())
            .field("before_router_middleware", &self.before_router_middleware.is_some())
            .finish()
    }
}

/// Collaborators the pipeline delegates to.
pub struct Collaborators {
    pub profiler: Option<Arc<dyn Profiler>>,
    pub static_assets: Option<Arc<dyn StaticAssets>>,
    pub sessions: Arc<dyn SessionRegistrar>,
    pub images: Arc<dyn ImageNegotiator>,
    /// Engine registered when `view.enabled`; defaults to [`MiniJinjaEngine`].
    pub views: Option<Arc<dyn ViewEngine>>,
    pub routes: Arc<dyn RouteRegistrar>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            profiler: None,
            static_assets: None,
            sessions: Arc::new(MemorySessions::new()),
            images: Arc::new(AcceptNegotiator),
            views: None,
            routes: Arc::new(NoRoutes),
        }
    }
}

fn run_hook(name: &'static str, hook: Option<Hook>, app: &mut App) -> Result<(), HttpError> {
    if let Some(hook) = hook {
        tracing::debug!(hook = name, "running hook");
        hook(app).map_err(|e| HttpError::hook(name, e))?;
    }
    Ok(())
}

/// Build the application pipeline for `grain`.
pub(crate) fn assemble(
    grain: &GrainInfo,
    hooks: &mut Hooks,
    collaborators: &Collaborators,
    events: &mut Events,
) -> Result<App, HttpError> {
    let config = grain.config();
    let mut app = App::new();

    run_hook("before_all_middleware", hooks.before_all_middleware.take(), &mut app)?;

    headers::attach(&mut app, &headers::host_name(), grain.version());

    path_prefix::attach(&mut app, config.prefix()).map_err(|e| {
        HttpError::Config(ConfigError::Validation(vec![ValidationError {
            field: "path_prefix",
            message: e.to_string(),
        }]))
    })?;

    request_time::attach(&mut app);

    if let Some(profiler) = &collaborators.profiler {
        profiler::attach(&mut app, profiler.clone());
    }

    request_context::attach(&mut app);

    adaptive_image::attach(&mut app, collaborators.images.clone());

    if let Some(assets) = &collaborators.static_assets {
        static_files::attach_assets(&mut app, assets.clone());
    }
    static_files::attach(&mut app, &config.static_file_directory, &config.static_files);

    collaborators
        .sessions
        .register(&mut app, config)
        .map_err(|e| HttpError::hook("session registrar", e))?;

    if config.use_body_parser {
        body_parser::attach(&mut app, &config.body_parser);
    }

    run_hook("before_middleware", hooks.before_middleware.take(), &mut app)?;
    run_hook(
        "before_router_middleware",
        hooks.before_router_middleware.take(),
        &mut app,
    )?;

    events.emit_router_before(&mut app)?;

    if config.view.enabled {
        let engine = match &collaborators.views {
            Some(engine) => engine.clone(),
            None => Arc::new(MiniJinjaEngine::new(&config.view)?) as Arc<dyn ViewEngine>,
        };
        view::register(&mut app, engine);
    }

    app.mount(collaborators.routes.routes(grain));

    tracing::debug!(pipeline = ?app.attached(), "pipeline assembled");
    Ok(app)
}
