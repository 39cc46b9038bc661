//! Static asset serving.
//!
//! # Responsibilities
//! - Run an optional [`StaticAssets`] collaborator (asset pipeline) first
//! - Serve files from `static_file_directory` with the configured options
//! - Hand every miss to the rest of the pipeline unchanged
//!
//! # Design Decisions
//! - The built-in server is `tower_http`'s `ServeDir` with the remaining
//!   pipeline as its fallback, so a missing file is never a 404 here
//! - Non-GET/HEAD requests fall through as well; routes may still accept them

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use futures_util::future::BoxFuture;
use tower::Layer;
use tower_http::services::ServeDir;

use crate::config::StaticFilesConfig;
use crate::http::App;

/// Asset pipeline placed in front of the built-in file server.
///
/// Implementations either answer the request or pass it on with
/// `next.run(request)`.
pub trait StaticAssets: Send + Sync + 'static {
    fn serve(&self, request: Request, next: Next) -> BoxFuture<'static, Response>;
}

/// In-memory assets keyed by request path, e.g. bundles compiled at startup.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedAssets {
    files: HashMap<String, (HeaderValue, Bytes)>,
}

impl EmbeddedAssets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `contents` under `path` with the given content type.
    pub fn insert(
        mut self,
        path: impl Into<String>,
        content_type: &'static str,
        contents: impl Into<Bytes>,
    ) -> Self {
        self.files.insert(
            path.into(),
            (HeaderValue::from_static(content_type), contents.into()),
        );
        self
    }
}

impl StaticAssets for EmbeddedAssets {
    fn serve(&self, request: Request, next: Next) -> BoxFuture<'static, Response> {
        let hit = matches!(*request.method(), Method::GET | Method::HEAD)
            .then(|| self.files.get(request.uri().path()).cloned())
            .flatten();

        Box::pin(async move {
            match hit {
                Some((content_type, contents)) => {
                    let body = if request.method() == Method::HEAD {
                        Body::empty()
                    } else {
                        Body::from(contents)
                    };
                    ([(header::CONTENT_TYPE, content_type)], body).into_response()
                }
                None => next.run(request).await,
            }
        })
    }
}

/// Attach the asset pipeline collaborator.
pub fn attach_assets(app: &mut App, assets: Arc<dyn StaticAssets>) {
    app.use_layer(
        "static_assets",
        middleware::from_fn_with_state(assets, serve_assets),
    );
}

async fn serve_assets(
    State(assets): State<Arc<dyn StaticAssets>>,
    request: Request,
    next: Next,
) -> Response {
    assets.serve(request, next).await
}

/// Attach the built-in file server over `directory`.
pub fn attach(app: &mut App, directory: &str, options: &StaticFilesConfig) {
    app.use_layer(
        "static_files",
        StaticFilesLayer::new(directory, options.clone()),
    );
}

/// Layer wrapping the rest of the pipeline in a `ServeDir`.
#[derive(Debug, Clone)]
pub struct StaticFilesLayer {
    directory: PathBuf,
    options: StaticFilesConfig,
}

impl StaticFilesLayer {
    pub fn new(directory: impl Into<PathBuf>, options: StaticFilesConfig) -> Self {
        Self {
            directory: directory.into(),
            options,
        }
    }
}

impl<S> Layer<S> for StaticFilesLayer {
    type Service = ServeDir<S>;

    fn layer(&self, inner: S) -> Self::Service {
        let mut serve = ServeDir::new(&self.directory)
            .append_index_html_on_directories(self.options.index)
            .call_fallback_on_method_not_allowed(true);
        if self.options.precompressed_gzip {
            serve = serve.precompressed_gzip();
        }
        if self.options.precompressed_br {
            serve = serve.precompressed_br();
        }
        serve.fallback(inner)
    }
}
