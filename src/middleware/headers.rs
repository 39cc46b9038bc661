//! Standard response headers.
//!
//! # Responsibilities
//! - Append `X-Content-Location` with the host name of the serving machine
//! - Set `X-Powered-By: Sand <version>`, replacing anything set downstream
//!
//! # Design Decisions
//! - Attached before any unit that can short-circuit, so 404s are stamped too
//! - The powered-by header is overriding: no downstream layer or handler can
//!   leak its own technology header

use axum::http::{HeaderName, HeaderValue};
use tower::ServiceBuilder;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::http::App;

pub static X_CONTENT_LOCATION: HeaderName = HeaderName::from_static("x-content-location");
pub static X_POWERED_BY: HeaderName = HeaderName::from_static("x-powered-by");

/// Network name of this machine, or `localhost` if it cannot be read.
pub fn host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Value of the powered-by header for `version`.
pub fn powered_by(version: &str) -> String {
    format!("Sand {version}")
}

/// Attach the header stamping unit.
pub fn attach(app: &mut App, host: &str, version: &str) {
    let location = HeaderValue::from_str(host).unwrap_or_else(|_| {
        tracing::warn!(host, "host name is not a valid header value");
        HeaderValue::from_static("unknown")
    });
    let powered_by = HeaderValue::from_str(&powered_by(version))
        .unwrap_or_else(|_| HeaderValue::from_static("Sand"));

    app.use_layer(
        "stamp_headers",
        ServiceBuilder::new()
            .layer(SetResponseHeaderLayer::appending(
                X_CONTENT_LOCATION.clone(),
                location,
            ))
            .layer(SetResponseHeaderLayer::overriding(
                X_POWERED_BY.clone(),
                powered_by,
            )),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        extract::Request,
        http::StatusCode,
        response::IntoResponse,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    #[tokio::test]
    async fn stamps_every_response() {
        let mut app = App::new();
        attach(&mut app, "web-1", "1.2.3");
        app.mount(Router::new().route(
            "/",
            get(|| async { ([("x-powered-by", "Express")], "hi").into_response() }),
        ));
        let service = app.into_service();

        let ok = service
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(ok.headers()[&X_POWERED_BY], "Sand 1.2.3");
        assert_eq!(ok.headers()[&X_CONTENT_LOCATION], "web-1");

        let missing = service
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(missing.headers()[&X_POWERED_BY], "Sand 1.2.3");
    }

    #[test]
    fn host_name_is_never_empty() {
        assert!(!host_name().is_empty());
    }
}
