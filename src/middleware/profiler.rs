//! Profiler logger.
//!
//! Only attached when a [`Profiler`] is injected into the grain. Each request
//! gets a [`Profile`] in its extensions; handlers and later units call
//! [`Profile::mark`] to timestamp interesting points, and the finished
//! profile is handed to the profiler once the response is ready.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::{self, Next},
    response::Response,
};

use crate::http::App;

/// Process-wide profiling capability.
pub trait Profiler: Send + Sync + 'static {
    fn record(&self, profile: &RequestProfile);
}

/// A finished request profile.
#[derive(Debug, Clone)]
pub struct RequestProfile {
    pub method: Method,
    pub path: String,
    pub status: StatusCode,
    pub elapsed: Duration,
    /// Labelled offsets from the start of the request, in mark order.
    pub marks: Vec<(String, Duration)>,
}

/// Per-request mark recorder, available as a request extension.
#[derive(Debug, Clone)]
pub struct Profile {
    start: Instant,
    marks: Arc<Mutex<Vec<(String, Duration)>>>,
}

impl Profile {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            marks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Record `label` at the current offset.
    pub fn mark(&self, label: impl Into<String>) {
        let offset = self.start.elapsed();
        self.marks
            .lock()
            .expect("profile mutex poisoned")
            .push((label.into(), offset));
    }

    fn finish(&self, method: Method, path: String, status: StatusCode) -> RequestProfile {
        RequestProfile {
            method,
            path,
            status,
            elapsed: self.start.elapsed(),
            marks: self.marks.lock().expect("profile mutex poisoned").clone(),
        }
    }
}

/// Profiler that writes each profile to the log at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProfiler;

impl Profiler for TracingProfiler {
    fn record(&self, profile: &RequestProfile) {
        let marks = profile
            .marks
            .iter()
            .map(|(label, offset)| format!("{label}@{:.3}ms", offset.as_secs_f64() * 1000.0))
            .collect::<Vec<_>>()
            .join(" ");
        tracing::debug!(
            method = %profile.method,
            path = %profile.path,
            status = profile.status.as_u16(),
            elapsed_ms = profile.elapsed.as_secs_f64() * 1000.0,
            marks = %marks,
            "request profile"
        );
    }
}

pub fn attach(app: &mut App, profiler: Arc<dyn Profiler>) {
    app.use_layer(
        "log_profiler",
        middleware::from_fn_with_state(profiler, log_profile),
    );
}

async fn log_profile(
    State(profiler): State<Arc<dyn Profiler>>,
    mut request: Request,
    next: Next,
) -> Response {
    let profile = Profile::new();
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    request.extensions_mut().insert(profile.clone());

    let response = next.run(request).await;

    profiler.record(&profile.finish(method, path, response.status()));
    response
}
