//! View rendering.
//!
//! When `view.enabled` is set, the grain registers a [`Views`] handle as a
//! request extension just before the router, so handlers can render named
//! templates. The engine itself is pluggable through [`ViewEngine`]; the
//! default is [`MiniJinjaEngine`] reading templates from `view.directory`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::response::{Html, IntoResponse, Response};
use minijinja::Environment;
use serde_json::Value;
use thiserror::Error;

use crate::config::ViewConfig;
use crate::http::{response, App};

/// Template lookup and render failures.
#[derive(Debug, Error)]
pub enum ViewError {
    #[error("view directory {} does not exist", .0.display())]
    MissingDirectory(PathBuf),

    #[error("failed to render view {name}: {source}")]
    Render {
        name: String,
        #[source]
        source: minijinja::Error,
    },
}

impl IntoResponse for ViewError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "view rendering failed");
        response::internal_error()
    }
}

/// Renders a named view with a JSON context.
pub trait ViewEngine: Send + Sync + 'static {
    fn render(&self, name: &str, context: &Value) -> Result<String, ViewError>;
}

/// Jinja-style templates loaded from a directory.
#[derive(Debug)]
pub struct MiniJinjaEngine {
    env: Environment<'static>,
    extension: String,
}

impl MiniJinjaEngine {
    pub fn new(config: &ViewConfig) -> Result<Self, ViewError> {
        let directory = Path::new(&config.directory);
        if !directory.is_dir() {
            return Err(ViewError::MissingDirectory(directory.to_path_buf()));
        }
        let mut env = Environment::new();
        env.set_loader(minijinja::path_loader(directory));
        Ok(Self {
            env,
            extension: config.extension.trim_start_matches('.').to_string(),
        })
    }

    /// Template file name for a view: `name` as given if it has an
    /// extension, otherwise `name.<extension>`.
    fn template_name(&self, name: &str) -> String {
        let file = name.rsplit('/').next().unwrap_or(name);
        if file.contains('.') || self.extension.is_empty() {
            name.to_string()
        } else {
            format!("{name}.{}", self.extension)
        }
    }
}

impl ViewEngine for MiniJinjaEngine {
    fn render(&self, name: &str, context: &Value) -> Result<String, ViewError> {
        let render_error = |source: minijinja::Error| ViewError::Render {
            name: name.to_string(),
            source,
        };
        self.env
            .get_template(&self.template_name(name))
            .and_then(|template| template.render(context))
            .map_err(render_error)
    }
}

/// Handle to the registered view engine, available as a request extension.
#[derive(Clone)]
pub struct Views {
    engine: Arc<dyn ViewEngine>,
}

impl Views {
    pub fn new(engine: Arc<dyn ViewEngine>) -> Self {
        Self { engine }
    }

    /// Render `name` as an HTML response body.
    pub fn render(&self, name: &str, context: &Value) -> Result<Html<String>, ViewError> {
        self.engine.render(name, context).map(Html)
    }
}

impl std::fmt::Debug for Views {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Views").finish_non_exhaustive()
    }
}

/// Register `engine` on the application.
pub fn register(app: &mut App, engine: Arc<dyn ViewEngine>) {
    app.use_layer("views", axum::Extension(Views::new(engine)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, extract::{Extension, Request}, http::StatusCode, routing::get, Router};
    use serde_json::json;
    use tower::ServiceExt;

    fn engine(dir: &tempfile::TempDir) -> MiniJinjaEngine {
        std::fs::write(dir.path().join("hello.html"), "<p>Hello {{ name }}!</p>").unwrap();
        MiniJinjaEngine::new(&ViewConfig {
            enabled: true,
            directory: dir.path().to_str().unwrap().to_string(),
            extension: "html".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn renders_with_default_extension() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        let html = engine.render("hello", &json!({"name": "Sand"})).unwrap();
        assert_eq!(html, "<p>Hello Sand!</p>");
        assert_eq!(engine.render("hello.html", &json!({"name": "x"})).unwrap(), "<p>Hello x!</p>");
    }

    #[test]
    fn missing_template_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = engine(&dir).render("absent", &json!({})).unwrap_err();
        assert!(matches!(err, ViewError::Render { ref name, .. } if name == "absent"));
    }

    #[test]
    fn missing_directory_is_rejected() {
        let err = MiniJinjaEngine::new(&ViewConfig {
            enabled: true,
            directory: "/definitely/not/here".to_string(),
            extension: "html".to_string(),
        })
        .unwrap_err();
        assert!(matches!(err, ViewError::MissingDirectory(_)));
    }

    #[tokio::test]
    async fn handlers_render_through_the_extension() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = App::new();
        register(&mut app, Arc::new(engine(&dir)));
        app.mount(
            Router::new()
                .route(
                    "/",
                    get(|Extension(views): Extension<Views>| async move {
                        views.render("hello", &json!({"name": "route"}))
                    }),
                )
                .route(
                    "/broken",
                    get(|Extension(views): Extension<Views>| async move {
                        views.render("nope", &json!({}))
                    }),
                ),
        );
        let service = app.into_service();

        let ok = service
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = axum::body::to_bytes(ok.into_body(), 256).await.unwrap();
        assert_eq!(&body[..], b"<p>Hello route!</p>");

        let broken = service
            .oneshot(Request::builder().uri("/broken").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(broken.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
