//! The application handle.
//!
//! `App` collects middleware in attachment order while the grain initializes.
//! The first unit attached is the outermost one: it sees the request first and
//! the response last. Layers wrap the whole router, not individual routes, so
//! a unit that rewrites the request target changes what the router matches.
//!
//! Once init completes the handle is frozen into an [`AppService`] and never
//! changes again.

use std::convert::Infallible;

use axum::{
    extract::Request,
    response::{IntoResponse, Response},
    Router,
};
use tower::{util::BoxCloneSyncService, Layer, Service, ServiceExt};

use crate::http::response;

/// The frozen request pipeline, cloned into every connection.
pub type AppService = BoxCloneSyncService<Request, Response, Infallible>;

struct Attached {
    name: String,
    apply: Box<dyn FnOnce(AppService) -> AppService + Send>,
}

/// Mutable pipeline under construction.
///
/// Handed by `&mut` to built-in units, hooks, `router:before` listeners and
/// the session registrar during init only.
pub struct App {
    stack: Vec<Attached>,
    router: Option<Router>,
}

impl App {
    pub fn new() -> Self {
        Self {
            stack: Vec::new(),
            router: None,
        }
    }

    /// Attach a middleware layer after everything attached so far.
    ///
    /// `name` only shows up in [`App::attached`] and in logs.
    pub fn use_layer<L>(&mut self, name: impl Into<String>, layer: L) -> &mut Self
    where
        L: Layer<AppService> + Send + 'static,
        L::Service: Service<Request, Error = Infallible> + Clone + Send + Sync + 'static,
        <L::Service as Service<Request>>::Response: IntoResponse + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        let name = name.into();
        tracing::trace!(middleware = %name, position = self.stack.len(), "middleware attached");
        self.stack.push(Attached {
            name,
            apply: Box::new(move |inner| {
                BoxCloneSyncService::new(
                    layer
                        .layer(inner)
                        .map_response(IntoResponse::into_response),
                )
            }),
        });
        self
    }

    /// Attach the terminal router. Later calls replace the previous router.
    pub fn mount(&mut self, router: Router) -> &mut Self {
        self.router = Some(router);
        self
    }

    /// Names of attached units in order, followed by `router` once mounted.
    pub fn attached(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.stack.iter().map(|a| a.name.as_str()).collect();
        if self.router.is_some() {
            names.push("router");
        }
        names
    }

    /// Freeze the handle into the service that serves requests.
    pub fn into_service(self) -> AppService {
        let router = self
            .router
            .unwrap_or_else(|| Router::new().fallback(response::not_found));

        // Wrap innermost first so the first attached layer ends up outermost.
        self.stack
            .into_iter()
            .rev()
            .fold(BoxCloneSyncService::new(router), |inner, attached| {
                (attached.apply)(inner)
            })
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("attached", &self.attached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware::Next, routing::get};
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn first_attached_runs_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut app = App::new();
        for label in ["a", "b"] {
            let log = log.clone();
            app.use_layer(
                label,
                axum::middleware::from_fn(move |request: Request, next: Next| {
                    let log = log.clone();
                    async move {
                        log.lock().unwrap().push(label);
                        next.run(request).await
                    }
                }),
            );
        }
        app.mount(Router::new().route("/", get(|| async { "ok" })));
        assert_eq!(app.attached(), vec!["a", "b", "router"]);

        let response = app
            .into_service()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn layers_can_rewrite_before_routing() {
        let mut app = App::new();
        app.use_layer(
            "rewrite",
            axum::middleware::from_fn(|mut request: Request, next: Next| async move {
                *request.uri_mut() = "/rewritten".parse().unwrap();
                next.run(request).await
            }),
        );
        app.mount(Router::new().route("/rewritten", get(|| async { "hit" })));

        let response = app
            .into_service()
            .oneshot(Request::builder().uri("/original").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unmounted_app_answers_404() {
        let response = App::new()
            .into_service()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
