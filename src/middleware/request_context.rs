//! Request-context registrar.
//!
//! Establishes the per-request isolation scope for everything attached after
//! it: a task-local [`RequestContext`], a tracing span carrying the request
//! ID, and a panic boundary. A panic in any later unit or handler is logged
//! against its request and answered with a 500; sibling requests and the
//! process carry on.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request},
    http::HeaderValue,
    middleware::{self, Next},
    response::Response,
};
use futures_util::FutureExt;
use tracing::Instrument;

use crate::http::request::{self, RequestContext, X_REQUEST_ID};
use crate::http::{response, App};

pub fn attach(app: &mut App) {
    app.use_layer("register_context", middleware::from_fn(register_context));
}

async fn register_context(mut request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<std::net::SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let context = Arc::new(RequestContext::new(
        request.method().clone(),
        request.uri().path(),
        peer,
    ));
    let id = context.id();
    request.extensions_mut().insert(context.clone());

    let span = tracing::info_span!(
        "request",
        request_id = %id,
        method = %context.method(),
        path = %context.path(),
    );

    let outcome = request::scope(context, AssertUnwindSafe(next.run(request)).catch_unwind())
        .instrument(span)
        .await;

    let mut response = match outcome {
        Ok(response) => response,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::error!(request_id = %id, panic = %message, "request handler panicked");
            response::internal_error()
        }
    };

    if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
        response.headers_mut().insert(X_REQUEST_ID.clone(), value);
    }
    response
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, routing::get, Router};
    use tower::ServiceExt;

    fn app() -> crate::http::AppService {
        let mut app = App::new();
        attach(&mut app);
        app.mount(
            Router::new()
                .route(
                    "/whoami",
                    get(|| async {
                        tokio::task::yield_now().await;
                        request::current()
                            .map(|c| format!("{} {}", c.id(), c.path()))
                            .unwrap_or_default()
                    }),
                )
                .route(
                    "/boom",
                    get(|| async {
                        if request::current().is_some() {
                            panic!("handler exploded");
                        }
                        "unreachable"
                    }),
                ),
        );
        app.into_service()
    }

    #[tokio::test]
    async fn handlers_see_ambient_context() {
        let response = app()
            .oneshot(Request::builder().uri("/whoami").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let id = response.headers()[&X_REQUEST_ID].to_str().unwrap().to_owned();
        let body = axum::body::to_bytes(response.into_body(), 256).await.unwrap();
        assert_eq!(String::from_utf8(body.to_vec()).unwrap(), format!("{id} /whoami"));
    }

    #[tokio::test]
    async fn panic_is_contained_to_its_request() {
        let service = app();

        let failed = service
            .clone()
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(failed.headers().contains_key(&X_REQUEST_ID));

        let next = service
            .oneshot(Request::builder().uri("/whoami").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(next.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn context_does_not_leak_past_the_request() {
        app()
            .oneshot(Request::builder().uri("/whoami").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(request::current().is_none());
    }
}
