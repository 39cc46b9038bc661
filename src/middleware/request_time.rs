//! Request-time logger.
//!
//! Wraps everything attached after it and logs one line per request with
//! the elapsed wall-clock time. Also feeds the request metrics.

use std::time::Instant;

use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
};

use crate::http::App;
use crate::observability::metrics;

pub fn attach(app: &mut App) {
    app.use_layer("log_request_time", middleware::from_fn(log_request_time));
}

async fn log_request_time(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    let response = next.run(request).await;

    let status = response.status();
    let elapsed = start.elapsed();
    tracing::info!(
        method = %method,
        path = %path,
        status = status.as_u16(),
        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
        "{} {} {} - {:.3} ms",
        method,
        path,
        status.as_u16(),
        elapsed.as_secs_f64() * 1000.0,
    );
    metrics::record_request(method.as_str(), status.as_u16(), elapsed);

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, routing::get, Router};
    use tower::ServiceExt;

    #[tokio::test]
    async fn passes_response_through() {
        let mut app = App::new();
        attach(&mut app);
        app.mount(Router::new().route("/", get(|| async { (StatusCode::CREATED, "made") })));

        let response = app
            .into_service()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }
}
