//! Handler-facing view of everything the pipeline attached to a request.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::http::request::RequestContext;
use crate::middleware::{ImageFormat, ParsedBody, Profile, Session};
use crate::view::Views;

/// Extractor collecting the per-request values set by built-in units.
///
/// Every field is optional: a unit that is not attached (sessions disabled,
/// no body parser, non-image request) simply leaves its slot empty.
#[derive(Debug, Clone, Default)]
pub struct Context {
    request: Option<Arc<RequestContext>>,
    body: Option<Value>,
    session: Option<Session>,
    views: Option<Views>,
    image: Option<ImageFormat>,
    profile: Option<Profile>,
}

impl Context {
    pub fn request(&self) -> Option<&Arc<RequestContext>> {
        self.request.as_ref()
    }

    /// Body parsed by the URL-encoded or JSON parser.
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Parsed body deserialized into `T`; `None` if absent or mismatched.
    pub fn body_as<T: DeserializeOwned>(&self) -> Option<T> {
        self.body
            .as_ref()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn views(&self) -> Option<&Views> {
        self.views.as_ref()
    }

    /// Negotiated format when the request targets an image.
    pub fn image_format(&self) -> Option<ImageFormat> {
        self.image
    }

    /// Timestamp a profiling mark; no-op without a profiler.
    pub fn mark(&self, label: &str) {
        if let Some(profile) = &self.profile {
            profile.mark(label);
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Context {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let extensions = &parts.extensions;
        Ok(Self {
            request: extensions.get::<Arc<RequestContext>>().cloned(),
            body: extensions.get::<ParsedBody>().map(|ParsedBody(v)| v.clone()),
            session: extensions.get::<Session>().cloned(),
            views: extensions.get::<Views>().cloned(),
            image: extensions.get::<ImageFormat>().copied(),
            profile: extensions.get::<Profile>().cloned(),
        })
    }
}
