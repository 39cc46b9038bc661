//! Route registration.
//!
//! The grain does not own any routes. A [`RouteRegistrar`] builds the
//! terminal [`Router`] once, at the end of init, with a reference to the
//! grain. Plain closures work as registrars; [`ControllerRoutes`] mounts a
//! set of [`Controller`]s under their paths.

use std::sync::Arc;

use axum::Router;

use crate::http::{response, GrainInfo};

/// Builds the router attached at the end of the pipeline.
pub trait RouteRegistrar: Send + Sync + 'static {
    fn routes(&self, grain: &GrainInfo) -> Router;
}

impl<F> RouteRegistrar for F
where
    F: Fn(&GrainInfo) -> Router + Send + Sync + 'static,
{
    fn routes(&self, grain: &GrainInfo) -> Router {
        self(grain)
    }
}

/// Registrar used when none is configured: every request gets a 404.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRoutes;

impl RouteRegistrar for NoRoutes {
    fn routes(&self, _grain: &GrainInfo) -> Router {
        Router::new().fallback(response::not_found)
    }
}

/// A group of routes mounted under a common path.
pub trait Controller: Send + Sync + 'static {
    /// Mount point, e.g. `/users`. `/` merges the routes at the root.
    fn path(&self) -> &str;

    fn routes(&self, grain: &GrainInfo) -> Router;
}

/// Registrar mounting controllers in registration order.
#[derive(Default, Clone)]
pub struct ControllerRoutes {
    controllers: Vec<Arc<dyn Controller>>,
}

impl ControllerRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, controller: impl Controller) -> Self {
        self.controllers.push(Arc::new(controller));
        self
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }
}

impl RouteRegistrar for ControllerRoutes {
    fn routes(&self, grain: &GrainInfo) -> Router {
        let router = self
            .controllers
            .iter()
            .fold(Router::new(), |router, controller| {
                let path = controller.path().trim_end_matches('/');
                tracing::debug!(controller = controller.path(), "mounting controller");
                if path.is_empty() {
                    router.merge(controller.routes(grain))
                } else {
                    router.nest(path, controller.routes(grain))
                }
            });
        router.fallback(response::not_found)
    }
}

impl std::fmt::Debug for ControllerRoutes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let paths: Vec<&str> = self.controllers.iter().map(|c| c.path()).collect();
        f.debug_struct("ControllerRoutes").field("paths", &paths).finish()
    }
}
