//! Path-prefix rewriting.
//!
//! # Responsibilities
//! - Match the request target (path + query) against `^<prefix>(.*)`
//! - Strip the prefix so later units and the router see the remainder
//! - Answer 404 for anything outside the prefix
//!
//! # Design Decisions
//! - The prefix is a regex fragment, validated when config is loaded
//! - The remainder always starts with `/`; an empty remainder becomes `/`
//! - The untouched URI stays available as axum's `OriginalUri`

use std::sync::Arc;

use axum::{
    extract::{OriginalUri, Request, State},
    http::{uri::PathAndQuery, StatusCode, Uri},
    middleware::{self, Next},
    response::Response,
};
use regex::Regex;

use crate::http::{response, App};

/// Compiled `^<prefix>(.*)` matcher.
#[derive(Debug, Clone)]
pub struct PathPrefix {
    pattern: Regex,
}

impl PathPrefix {
    pub fn new(prefix: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(&format!("^{prefix}(.*)"))?,
        })
    }

    /// The rewritten target, or `None` when `target` is outside the prefix.
    pub fn rewrite(&self, target: &str) -> Option<String> {
        let captures = self.pattern.captures(target)?;
        let rest = captures.get(1).map_or("", |m| m.as_str());
        Some(if rest.starts_with('/') {
            rest.to_string()
        } else {
            format!("/{rest}")
        })
    }
}

/// Attach the rewrite unit. Without a prefix nothing is attached.
pub fn attach(app: &mut App, prefix: Option<&str>) -> Result<(), regex::Error> {
    if let Some(prefix) = prefix {
        let prefix = Arc::new(PathPrefix::new(prefix)?);
        app.use_layer(
            "path_prefix",
            middleware::from_fn_with_state(prefix, rewrite_prefix),
        );
    }
    Ok(())
}

async fn rewrite_prefix(
    State(prefix): State<Arc<PathPrefix>>,
    mut request: Request,
    next: Next,
) -> Response {
    let target = request
        .uri()
        .path_and_query()
        .map_or("/", PathAndQuery::as_str);

    let Some(rewritten) = prefix.rewrite(target) else {
        tracing::debug!(target, "request outside path prefix");
        return response::not_found().await;
    };

    let original = request.uri().clone();
    let mut parts = original.clone().into_parts();
    parts.path_and_query = match PathAndQuery::try_from(rewritten) {
        Ok(pq) => Some(pq),
        Err(_) => return response::plain(StatusCode::BAD_REQUEST, "Bad request"),
    };
    let Ok(uri) = Uri::from_parts(parts) else {
        return response::plain(StatusCode::BAD_REQUEST, "Bad request");
    };

    if request.extensions().get::<OriginalUri>().is_none() {
        request.extensions_mut().insert(OriginalUri(original));
    }
    *request.uri_mut() = uri;
    next.run(request).await
}
