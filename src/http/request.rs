//! Per-request context.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4)
//! - Carry request-local values reachable from any code running for the
//!   request, without threading a parameter through every call
//! - Attribute failures to the request that caused them
//!
//! # Design Decisions
//! - The context is stored in a Tokio task-local for the duration of the
//!   request and also inserted into request extensions for extractors
//! - The context never outlives the request: the registrar drops its scope
//!   when the response is produced
//! - Work spawned onto other tasks does not inherit the context; copy what
//!   you need with [`RequestContext::get`] first

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::http::{Extensions, HeaderName, Method};
use uuid::Uuid;

/// Response header carrying the request ID.
pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

tokio::task_local! {
    static CURRENT: Arc<RequestContext>;
}

/// Unique identifier of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Isolation scope for one request.
#[derive(Debug)]
pub struct RequestContext {
    id: RequestId,
    method: Method,
    path: String,
    peer: Option<SocketAddr>,
    started: Instant,
    values: Mutex<Extensions>,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>, peer: Option<SocketAddr>) -> Self {
        Self {
            id: RequestId::new(),
            method,
            path: path.into(),
            peer,
            started: Instant::now(),
            values: Mutex::new(Extensions::new()),
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path as seen after prefix rewriting.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Store a request-local value, replacing any previous value of the same type.
    pub fn insert<T: Clone + Send + Sync + 'static>(&self, value: T) -> Option<T> {
        self.values
            .lock()
            .expect("request context mutex poisoned")
            .insert(value)
    }

    /// Fetch a copy of a request-local value.
    pub fn get<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.values
            .lock()
            .expect("request context mutex poisoned")
            .get::<T>()
            .cloned()
    }
}

/// The context of the request currently executing on this task, if any.
pub fn current() -> Option<Arc<RequestContext>> {
    CURRENT.try_with(Arc::clone).ok()
}

/// Run `fut` with `context` as the ambient request context.
pub async fn scope<F: Future>(context: Arc<RequestContext>, fut: F) -> F::Output {
    CURRENT.scope(context, fut).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> Arc<RequestContext> {
        Arc::new(RequestContext::new(Method::GET, "/users", None))
    }

    #[test]
    fn request_ids_are_unique() {
        assert_ne!(RequestId::new(), RequestId::new());
    }

    #[tokio::test]
    async fn current_is_only_set_inside_scope() {
        assert!(current().is_none());

        let ctx = context();
        let id = ctx.id();
        let seen = scope(ctx, async {
            tokio::task::yield_now().await;
            current().map(|c| c.id())
        })
        .await;

        assert_eq!(seen, Some(id));
        assert!(current().is_none());
    }

    #[tokio::test]
    async fn values_are_shared_through_the_scope() {
        #[derive(Clone, Debug, PartialEq)]
        struct User(&'static str);

        let ctx = context();
        scope(ctx.clone(), async {
            current().unwrap().insert(User("ada"));
        })
        .await;

        assert_eq!(ctx.get::<User>(), Some(User("ada")));
    }

    #[tokio::test]
    async fn sibling_scopes_are_isolated() {
        let a = context();
        let b = context();
        let (seen_a, seen_b) = tokio::join!(
            scope(a.clone(), async { current().unwrap().id() }),
            scope(b.clone(), async { current().unwrap().id() }),
        );
        assert_eq!(seen_a, a.id());
        assert_eq!(seen_b, b.id());
    }
}
