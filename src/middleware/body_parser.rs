//! Request body parsing.
//!
//! # Responsibilities
//! - Parse `application/x-www-form-urlencoded` bodies into a JSON object
//! - Parse JSON bodies
//! - Expose the result as a [`ParsedBody`] request extension
//!
//! # Design Decisions
//! - The first parser that accepts a request wins; the second sees the
//!   extension and skips
//! - Bodies are buffered up to the configured limit, then restored so
//!   downstream extractors can still read the raw bytes
//! - Empty bodies and non-matching content types pass through untouched
//! - Failures are answered here (400/413) and never reach the router

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::{self, Next},
    response::Response,
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde_json::{map::Entry, Map, Value};

use crate::config::{BodyParserConfig, JsonConfig, UrlencodedConfig};
use crate::http::{response, App};

/// Parsed request body, available as a request extension.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBody(pub Value);

/// Attach the URL-encoded parser followed by the JSON parser.
pub fn attach(app: &mut App, config: &BodyParserConfig) {
    app.use_layer(
        "urlencoded",
        middleware::from_fn_with_state(Arc::new(config.urlencoded.clone()), parse_urlencoded),
    );
    app.use_layer(
        "json",
        middleware::from_fn_with_state(Arc::new(config.json.clone()), parse_json),
    );
}

/// Whether the request's media type matches one of `types`.
///
/// Patterns are `type/subtype` with `*` wildcards and `*+suffix` subtypes,
/// e.g. `*/*+json` matches `application/vnd.api+json`.
fn content_type_matches(request: &Request, types: &[String]) -> bool {
    let Some(media) = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
    else {
        return false;
    };
    let Some((kind, subtype)) = media.split_once('/') else {
        return false;
    };

    types.iter().any(|pattern| {
        let Some((p_kind, p_subtype)) = pattern.split_once('/') else {
            return false;
        };
        let kind_ok = p_kind == "*" || p_kind.eq_ignore_ascii_case(kind);
        let subtype_ok = match p_subtype.strip_prefix('*') {
            Some("") => true,
            Some(suffix) => subtype.ends_with(&suffix.to_ascii_lowercase()),
            None => p_subtype.eq_ignore_ascii_case(subtype),
        };
        kind_ok && subtype_ok
    })
}

fn should_parse(request: &Request, types: &[String]) -> bool {
    if request.extensions().get::<ParsedBody>().is_some() {
        return false;
    }
    let declared_empty = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "0");
    !declared_empty && content_type_matches(request, types)
}

/// Buffer the body up to `limit` bytes.
async fn read_body(request: Request, limit: usize) -> Result<(Parts, Bytes), Response> {
    let (parts, body) = request.into_parts();
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok((parts, collected.to_bytes())),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            tracing::debug!(limit, "request body over limit");
            Err(response::plain(StatusCode::PAYLOAD_TOO_LARGE, "request entity too large"))
        }
        Err(e) => {
            tracing::debug!(error = %e, "failed to read request body");
            Err(response::plain(StatusCode::BAD_REQUEST, "Bad request"))
        }
    }
}

fn restore(parts: Parts, bytes: Bytes, parsed: Option<Value>) -> Request {
    let mut request = Request::from_parts(parts, Body::from(bytes));
    if let Some(value) = parsed {
        request.extensions_mut().insert(ParsedBody(value));
    }
    request
}

async fn parse_urlencoded(
    State(config): State<Arc<UrlencodedConfig>>,
    request: Request,
    next: Next,
) -> Response {
    if !should_parse(&request, &config.types) {
        return next.run(request).await;
    }
    let (parts, bytes) = match read_body(request, config.limit).await {
        Ok(read) => read,
        Err(response) => return response,
    };
    if bytes.is_empty() {
        return next.run(restore(parts, bytes, None)).await;
    }

    let value = match decode_form(&bytes, config.parameter_limit) {
        Ok(value) => value,
        Err(response) => return response,
    };
    next.run(restore(parts, bytes, Some(value))).await
}

/// Decode a form body; repeated keys collect into arrays.
fn decode_form(bytes: &[u8], parameter_limit: usize) -> Result<Value, Response> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(bytes)
        .map_err(|_| response::plain(StatusCode::BAD_REQUEST, "invalid form body"))?;
    if pairs.len() > parameter_limit {
        return Err(response::plain(StatusCode::PAYLOAD_TOO_LARGE, "too many parameters"));
    }

    let mut object = Map::new();
    for (key, value) in pairs {
        let value = Value::String(value);
        match object.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
            Entry::Occupied(mut slot) => match slot.get_mut() {
                Value::Array(values) => values.push(value),
                existing => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
            },
        }
    }
    Ok(Value::Object(object))
}

async fn parse_json(
    State(config): State<Arc<JsonConfig>>,
    request: Request,
    next: Next,
) -> Response {
    if !should_parse(&request, &config.types) {
        return next.run(request).await;
    }
    let (parts, bytes) = match read_body(request, config.limit).await {
        Ok(read) => read,
        Err(response) => return response,
    };
    if bytes.is_empty() {
        return next.run(restore(parts, bytes, None)).await;
    }

    let value = match serde_json::from_slice::<Value>(&bytes) {
        Ok(value) if !config.strict || value.is_object() || value.is_array() => value,
        Ok(_) => return response::plain(StatusCode::BAD_REQUEST, "invalid json"),
        Err(e) => {
            tracing::debug!(error = %e, "malformed json body");
            return response::plain(StatusCode::BAD_REQUEST, "invalid json");
        }
    };
    next.run(restore(parts, bytes, Some(value))).await
}
