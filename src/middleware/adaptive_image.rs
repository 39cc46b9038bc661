//! Adaptive images.
//!
//! For requests that target an image, asks an [`ImageNegotiator`] which
//! format suits the client and exposes the answer as an [`ImageFormat`]
//! request extension. Image responses get `Vary: Accept` so caches keep the
//! variants apart. What to do with the chosen format (serve a sibling file,
//! transcode, redirect) is up to whoever handles the request.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::{self, Next},
    response::Response,
};

use crate::http::App;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "avif"];

/// Image format preferred by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Avif,
    Webp,
    /// Keep whatever format the requested file already has.
    Original,
}

impl ImageFormat {
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            ImageFormat::Avif => Some("avif"),
            ImageFormat::Webp => Some("webp"),
            ImageFormat::Original => None,
        }
    }
}

/// Decides which image format a request should get.
pub trait ImageNegotiator: Send + Sync + 'static {
    fn negotiate(&self, request: &Request) -> ImageFormat;
}

/// Picks AVIF, then WebP, from the `Accept` header; otherwise the original.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptNegotiator;

impl ImageNegotiator for AcceptNegotiator {
    fn negotiate(&self, request: &Request) -> ImageFormat {
        let Some(accept) = request
            .headers()
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
        else {
            return ImageFormat::Original;
        };

        let accepts = |media: &str| {
            accept.split(',').any(|entry| {
                let mut params = entry.split(';').map(str::trim);
                let matches = params
                    .next()
                    .is_some_and(|m| m.eq_ignore_ascii_case(media));
                // `q=0` means "not acceptable".
                let refused = params.any(|p| {
                    p.strip_prefix("q=")
                        .and_then(|q| q.parse::<f32>().ok())
                        .is_some_and(|q| q == 0.0)
                });
                matches && !refused
            })
        };

        if accepts("image/avif") {
            ImageFormat::Avif
        } else if accepts("image/webp") {
            ImageFormat::Webp
        } else {
            ImageFormat::Original
        }
    }
}

/// Whether `path` names an image file.
pub fn is_image_path(path: &str) -> bool {
    path.rsplit_once('.').is_some_and(|(_, ext)| {
        IMAGE_EXTENSIONS
            .iter()
            .any(|known| known.eq_ignore_ascii_case(ext))
    })
}

pub fn attach(app: &mut App, negotiator: Arc<dyn ImageNegotiator>) {
    app.use_layer(
        "adaptive_images",
        middleware::from_fn_with_state(negotiator, adapt_images),
    );
}

async fn adapt_images(
    State(negotiator): State<Arc<dyn ImageNegotiator>>,
    mut request: Request,
    next: Next,
) -> Response {
    if !is_image_path(request.uri().path()) {
        return next.run(request).await;
    }

    let format = negotiator.negotiate(&request);
    request.extensions_mut().insert(format);

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("accept"));
    response
}
