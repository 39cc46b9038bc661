//! Session registration.
//!
//! The pipeline hands the [`SessionRegistrar`] the application handle and the
//! configuration; what it attaches is its own business. The default
//! [`MemorySessions`] keeps session data in process memory, keyed by a
//! cookie, and exposes a [`Session`] handle as a request extension.
//!
//! A cookie is only issued once something was written to a new session, so
//! anonymous traffic never creates server-side state. With `max_age_secs`
//! set, a stored session expires together with its cookie: expired entries
//! read as unknown and are swept whenever a new session is stored.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::{self, Next},
    response::Response,
    BoxError,
};
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::HttpConfig;
use crate::http::App;

/// Registers session support on the application during init.
pub trait SessionRegistrar: Send + Sync + 'static {
    fn register(&self, app: &mut App, config: &HttpConfig) -> Result<(), BoxError>;
}

#[derive(Debug, Clone)]
struct StoredSession {
    data: Map<String, Value>,
    expires_at: Option<Instant>,
}

impl StoredSession {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

type Store = DashMap<String, StoredSession>;

/// Cookie-keyed in-memory session store.
#[derive(Debug, Clone, Default)]
pub struct MemorySessions {
    store: Arc<Store>,
}

impl MemorySessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Drop every expired session. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        sweep(&self.store, Instant::now())
    }
}

fn sweep(store: &Store, now: Instant) -> usize {
    let before = store.len();
    store.retain(|_, session| !session.is_expired(now));
    let removed = before.saturating_sub(store.len());
    if removed > 0 {
        tracing::debug!(removed, "expired sessions swept");
    }
    removed
}

impl SessionRegistrar for MemorySessions {
    fn register(&self, app: &mut App, config: &HttpConfig) -> Result<(), BoxError> {
        if !config.session.enabled {
            return Ok(());
        }
        let state = SessionState {
            store: self.store.clone(),
            cookie_name: Arc::from(config.session.cookie_name.as_str()),
            max_age_secs: config.session.max_age_secs,
        };
        app.use_layer("sessions", middleware::from_fn_with_state(state, load_session));
        Ok(())
    }
}

#[derive(Clone)]
struct SessionState {
    store: Arc<Store>,
    cookie_name: Arc<str>,
    max_age_secs: Option<u64>,
}

impl SessionState {
    fn expires_at(&self, now: Instant) -> Option<Instant> {
        self.max_age_secs.map(|secs| now + Duration::from_secs(secs))
    }
}

/// Session data for the current request.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    id: String,
    is_new: bool,
    dirty: AtomicBool,
    data: Mutex<Map<String, Value>>,
}

impl Session {
    fn new(id: String, is_new: bool, data: Map<String, Value>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id,
                is_new,
                dirty: AtomicBool::new(false),
                data: Mutex::new(data),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// True when the client did not present a known session cookie.
    pub fn is_new(&self) -> bool {
        self.inner.is_new
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let data = self.inner.data.lock().expect("session mutex poisoned");
        data.get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn insert<T: Serialize>(
        &self,
        key: impl Into<String>,
        value: T,
    ) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.inner
            .data
            .lock()
            .expect("session mutex poisoned")
            .insert(key.into(), value);
        self.inner.dirty.store(true, Ordering::Release);
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        let removed = self
            .inner
            .data
            .lock()
            .expect("session mutex poisoned")
            .remove(key);
        if removed.is_some() {
            self.inner.dirty.store(true, Ordering::Release);
        }
        removed
    }

    fn take_changes(&self) -> Option<Map<String, Value>> {
        if !self.inner.dirty.swap(false, Ordering::AcqRel) {
            return None;
        }
        Some(self.inner.data.lock().expect("session mutex poisoned").clone())
    }
}

/// Cookie values from every `Cookie` header, by name.
fn parse_cookies(headers: &HeaderMap) -> HashMap<&str, &str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .map(|(name, value)| (name.trim(), value.trim()))
        .collect()
}

async fn load_session(
    State(state): State<SessionState>,
    mut request: Request,
    next: Next,
) -> Response {
    let now = Instant::now();
    let known = parse_cookies(request.headers())
        .get(&*state.cookie_name)
        .and_then(|id| {
            let stored = state.store.get(*id)?.clone();
            if stored.is_expired(now) {
                state.store.remove(*id);
                return None;
            }
            Some((id.to_string(), stored.data))
        });

    let session = match known {
        Some((id, data)) => Session::new(id, false, data),
        None => Session::new(Uuid::new_v4().simple().to_string(), true, Map::new()),
    };
    request.extensions_mut().insert(session.clone());

    let mut response = next.run(request).await;

    let Some(data) = session.take_changes() else {
        return response;
    };

    if !session.is_new() {
        state
            .store
            .entry(session.id().to_owned())
            .and_modify(|stored| stored.data = data.clone())
            .or_insert_with(|| StoredSession {
                data,
                expires_at: state.expires_at(Instant::now()),
            });
        return response;
    }

    let now = Instant::now();
    sweep(&state.store, now);
    state.store.insert(
        session.id().to_owned(),
        StoredSession {
            data,
            expires_at: state.expires_at(now),
        },
    );

    let mut cookie = format!("{}={}; Path=/; HttpOnly", state.cookie_name, session.id());
    if let Some(max_age) = state.max_age_secs {
        cookie.push_str(&format!("; Max-Age={max_age}"));
    }
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::warn!(error = %e, "session cookie not representable"),
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, extract::Extension, routing::get, Router};
    use tower::ServiceExt;

    fn app(sessions: &MemorySessions, max_age: Option<u64>) -> crate::http::AppService {
        let mut config = HttpConfig::new(0);
        config.session.enabled = true;
        config.session.max_age_secs = max_age;

        let mut app = App::new();
        sessions.register(&mut app, &config).unwrap();
        app.mount(
            Router::new()
                .route(
                    "/login",
                    get(|Extension(session): Extension<Session>| async move {
                        session.insert("user", "ada").unwrap();
                        "ok"
                    }),
                )
                .route(
                    "/me",
                    get(|Extension(session): Extension<Session>| async move {
                        session.get::<String>("user").unwrap_or_else(|| "anonymous".into())
                    }),
                ),
        );
        app.into_service()
    }

    async fn text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 256).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn disabled_sessions_attach_nothing() {
        let mut app = App::new();
        MemorySessions::new()
            .register(&mut app, &HttpConfig::new(0))
            .unwrap();
        assert!(app.attached().is_empty());
    }

    #[tokio::test]
    async fn reads_do_not_create_sessions() {
        let sessions = MemorySessions::new();
        let response = app(&sessions, None)
            .oneshot(Request::builder().uri("/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(!response.headers().contains_key(header::SET_COOKIE));
        assert_eq!(text(response).await, "anonymous");
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn written_session_round_trips_through_cookie() {
        let sessions = MemorySessions::new();
        let service = app(&sessions, Some(60));

        let login = service
            .clone()
            .oneshot(Request::builder().uri("/login").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let set_cookie = login.headers()[header::SET_COOKIE].to_str().unwrap().to_owned();
        assert!(set_cookie.starts_with("sand.sid="));
        assert!(set_cookie.contains("HttpOnly"));
        assert!(set_cookie.ends_with("Max-Age=60"));
        assert_eq!(sessions.len(), 1);

        let cookie = set_cookie.split(';').next().unwrap().to_owned();
        let me = service
            .oneshot(
                Request::builder()
                    .uri("/me")
                    .header(header::COOKIE, format!("theme=dark; {cookie}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(!me.headers().contains_key(header::SET_COOKIE));
        assert_eq!(text(me).await, "ada");
    }

    #[tokio::test]
    async fn expired_sessions_are_forgotten_and_swept() {
        let sessions = MemorySessions::new();
        let service = app(&sessions, Some(1));

        let mut cookies = Vec::new();
        for _ in 0..20 {
            let login = service
                .clone()
                .oneshot(Request::builder().uri("/login").body(Body::empty()).unwrap())
                .await
                .unwrap();
            let set_cookie = login.headers()[header::SET_COOKIE].to_str().unwrap();
            cookies.push(set_cookie.split(';').next().unwrap().to_owned());
        }
        assert_eq!(sessions.len(), 20);

        tokio::time::sleep(Duration::from_millis(1100)).await;

        let me = service
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/me")
                    .header(header::COOKIE, cookies.last().unwrap().as_str())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(text(me).await, "anonymous");
        assert_eq!(sessions.len(), 19);

        // Storing a fresh session clears out the rest.
        service
            .oneshot(Request::builder().uri("/login").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn sessions_without_max_age_never_expire() {
        let sessions = MemorySessions::new();
        sessions.store.insert(
            "id".into(),
            StoredSession {
                data: Map::new(),
                expires_at: None,
            },
        );
        assert_eq!(sessions.sweep(), 0);
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn parses_multiple_cookie_headers() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("a=1; b=2"));
        headers.append(header::COOKIE, HeaderValue::from_static("c = 3"));
        let cookies = parse_cookies(&headers);
        assert_eq!(cookies.get("b"), Some(&"2"));
        assert_eq!(cookies.get("c"), Some(&"3"));
    }
}
