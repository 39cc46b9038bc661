//! The HTTP grain: lifecycle manager for one HTTP server.
//!
//! # Responsibilities
//! - Own the configuration, hooks, collaborators and event hub
//! - `init`: assemble the pipeline and freeze it into an [`AppService`]
//! - `start`: bind the listener and serve connections
//! - `shutdown`: close the listener and let open connections drain
//!
//! # Design Decisions
//! - Lifecycle state only moves forward; calling an operation in the wrong
//!   state is an [`HttpError::InvalidState`], except `shutdown` without a
//!   running server, which is a no-op
//! - A failed pipeline assembly leaves the grain `Failed`; a configuration
//!   rejected before assembly leaves it `Uninitialized`
//! - `kill` force-closes tracked connections but is never called by
//!   `shutdown`

use std::net::SocketAddr;
use std::sync::Arc;

use axum::BoxError;
use tokio::sync::broadcast;

use crate::config::HttpConfig;
use crate::error::HttpError;
use crate::http::pipeline::{self, Collaborators, Hooks};
use crate::http::router::RouteRegistrar;
use crate::http::{App, AppService};
use crate::lifecycle::{Events, LifecycleEvent, LifecycleState};
use crate::middleware::{ImageNegotiator, Profiler, SessionRegistrar, StaticAssets};
use crate::net::{ConnectionTracker, Listener, ServerHandle};
use crate::view::ViewEngine;

/// Identity of a grain, handed to route registrars.
#[derive(Debug, Clone)]
pub struct GrainInfo {
    name: String,
    version: String,
    config: Arc<HttpConfig>,
}

impl GrainInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>, config: HttpConfig) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            config: Arc::new(config),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version advertised in `X-Powered-By`.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }
}

/// Builder for [`HttpGrain`].
pub struct HttpGrainBuilder {
    config: HttpConfig,
    name: String,
    version: String,
    hooks: Hooks,
    collaborators: Collaborators,
    events: Events,
}

impl HttpGrainBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Hook run with the application handle before any built-in unit.
    pub fn before_all_middleware<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&mut App) -> Result<(), BoxError> + Send + 'static,
    {
        self.hooks.before_all_middleware = Some(Box::new(hook));
        self
    }

    /// Hook run after the body parsers.
    pub fn before_middleware<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&mut App) -> Result<(), BoxError> + Send + 'static,
    {
        self.hooks.before_middleware = Some(Box::new(hook));
        self
    }

    /// Hook run after `before_middleware` and before `router:before`.
    pub fn before_router_middleware<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&mut App) -> Result<(), BoxError> + Send + 'static,
    {
        self.hooks.before_router_middleware = Some(Box::new(hook));
        self
    }

    /// Listener run with the application handle on `router:before`.
    pub fn on_router_before<F>(mut self, listener: F) -> Self
    where
        F: FnMut(&mut App) -> Result<(), BoxError> + Send + 'static,
    {
        self.events.on_router_before(Box::new(listener));
        self
    }

    pub fn profiler(mut self, profiler: Arc<dyn Profiler>) -> Self {
        self.collaborators.profiler = Some(profiler);
        self
    }

    pub fn static_assets(mut self, assets: Arc<dyn StaticAssets>) -> Self {
        self.collaborators.static_assets = Some(assets);
        self
    }

    pub fn sessions(mut self, sessions: Arc<dyn SessionRegistrar>) -> Self {
        self.collaborators.sessions = sessions;
        self
    }

    pub fn image_negotiator(mut self, negotiator: Arc<dyn ImageNegotiator>) -> Self {
        self.collaborators.images = negotiator;
        self
    }

    pub fn view_engine(mut self, engine: Arc<dyn ViewEngine>) -> Self {
        self.collaborators.views = Some(engine);
        self
    }

    pub fn routes(mut self, routes: impl RouteRegistrar) -> Self {
        self.collaborators.routes = Arc::new(routes);
        self
    }

    pub fn build(self) -> HttpGrain {
        HttpGrain {
            info: GrainInfo::new(self.name, self.version, self.config),
            state: LifecycleState::Uninitialized,
            hooks: self.hooks,
            collaborators: self.collaborators,
            events: self.events,
            service: None,
            server: None,
            tracker: ConnectionTracker::new(),
        }
    }
}

/// An HTTP server with a fixed middleware pipeline and a forward-only
/// lifecycle.
pub struct HttpGrain {
    info: GrainInfo,
    state: LifecycleState,
    hooks: Hooks,
    collaborators: Collaborators,
    events: Events,
    service: Option<AppService>,
    server: Option<ServerHandle>,
    tracker: ConnectionTracker,
}

impl HttpGrain {
    pub fn builder(config: HttpConfig) -> HttpGrainBuilder {
        HttpGrainBuilder {
            config,
            name: "http".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            hooks: Hooks::default(),
            collaborators: Collaborators::default(),
            events: Events::new(),
        }
    }

    /// A grain with default collaborators and no routes.
    pub fn new(config: HttpConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn info(&self) -> &GrainInfo {
        &self.info
    }

    pub fn config(&self) -> &HttpConfig {
        self.info.config()
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Register a `router:before` listener. Only useful before `init`.
    pub fn on_router_before<F>(&mut self, listener: F)
    where
        F: FnMut(&mut App) -> Result<(), BoxError> + Send + 'static,
    {
        self.events.on_router_before(Box::new(listener));
    }

    /// The frozen pipeline, once initialized.
    pub fn service(&self) -> Option<AppService> {
        self.service.clone()
    }

    /// Address the listener is bound to while listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(ServerHandle::local_addr)
    }

    pub fn connections(&self) -> &ConnectionTracker {
        &self.tracker
    }

    pub fn open_connections(&self) -> usize {
        self.tracker.active_count()
    }

    /// Requests still being served, across all connections.
    pub fn in_flight_requests(&self) -> usize {
        self.tracker.in_flight()
    }

    /// Validate the configuration and assemble the request pipeline.
    pub fn init(&mut self) -> Result<(), HttpError> {
        self.state.expect(LifecycleState::Uninitialized, "init")?;
        self.info.config().validate()?;

        let app = pipeline::assemble(
            &self.info,
            &mut self.hooks,
            &self.collaborators,
            &mut self.events,
        );
        let app = match app {
            Ok(app) => app,
            Err(e) => {
                tracing::error!(grain = %self.info.name(), error = %e, "HTTP pipeline failed");
                self.state.advance(LifecycleState::Failed);
                return Err(e);
            }
        };
        self.service = Some(app.into_service());
        self.state.advance(LifecycleState::Initialized);

        tracing::info!(grain = %self.info.name(), "HTTP pipeline initialized");
        Ok(())
    }

    /// Bind the listener and start serving. Returns the bound address.
    pub async fn start(&mut self) -> Result<SocketAddr, HttpError> {
        self.state.expect(LifecycleState::Initialized, "start")?;
        let Some(service) = self.service.clone() else {
            return Err(HttpError::InvalidState {
                operation: "start",
                state: self.state,
            });
        };

        let address = self.info.config().bind_address();
        let bind_error = |source| HttpError::Bind {
            address: address.clone(),
            source,
        };
        let listener = Listener::bind(&address, self.info.config().max_connections)
            .await
            .map_err(bind_error)?;
        let server =
            ServerHandle::spawn(listener, service, self.tracker.clone()).map_err(bind_error)?;
        let local_addr = server.local_addr();

        self.server = Some(server);
        self.state.advance(LifecycleState::Listening);

        tracing::info!(
            port = local_addr.port(),
            address = %local_addr,
            "Listening on {}",
            local_addr.port()
        );
        self.events.emit(LifecycleEvent::Listening(local_addr));
        Ok(local_addr)
    }

    /// Close the listener. Open connections keep running until they finish.
    ///
    /// Without a running server this is a no-op.
    pub async fn shutdown(&mut self) -> Result<(), HttpError> {
        let Some(server) = self.server.take() else {
            tracing::debug!(state = %self.state, "shutdown without a running server");
            return Ok(());
        };

        self.state.advance(LifecycleState::ShuttingDown);
        self.events.emit(LifecycleEvent::ShuttingDown);

        server.close().await;

        self.state.advance(LifecycleState::Stopped);
        self.events.emit(LifecycleEvent::Stopped);
        tracing::info!(
            open_connections = self.tracker.active_count(),
            in_flight_requests = self.tracker.in_flight(),
            "HTTP server stopped accepting connections"
        );
        Ok(())
    }

    /// Force-close every open connection. Returns how many were closed.
    pub fn kill(&self) -> usize {
        self.tracker.kill()
    }
}

impl std::fmt::Debug for HttpGrain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGrain")
            .field("info", &self.info)
            .field("state", &self.state)
            .field("hooks", &self.hooks)
            .field("local_addr", &self.local_addr())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(port: u16) -> HttpConfig {
        let mut config = HttpConfig::new(port);
        config.host = "127.0.0.1".into();
        config
    }

    #[tokio::test]
    async fn full_lifecycle() {
        let mut grain = HttpGrain::new(local(0));
        let mut events = grain.subscribe();
        assert_eq!(grain.state(), LifecycleState::Uninitialized);

        grain.init().unwrap();
        assert_eq!(grain.state(), LifecycleState::Initialized);
        assert_eq!(events.recv().await.unwrap(), LifecycleEvent::RouterBefore);

        let addr = grain.start().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(grain.local_addr(), Some(addr));
        assert_eq!(events.recv().await.unwrap(), LifecycleEvent::Listening(addr));

        grain.shutdown().await.unwrap();
        assert_eq!(grain.state(), LifecycleState::Stopped);
        assert_eq!(events.recv().await.unwrap(), LifecycleEvent::ShuttingDown);
        assert_eq!(events.recv().await.unwrap(), LifecycleEvent::Stopped);
        assert!(grain.local_addr().is_none());
    }

    #[tokio::test]
    async fn shutdown_before_start_is_a_no_op() {
        let mut grain = HttpGrain::new(local(0));
        grain.shutdown().await.unwrap();
        assert_eq!(grain.state(), LifecycleState::Uninitialized);

        grain.init().unwrap();
        grain.shutdown().await.unwrap();
        assert_eq!(grain.state(), LifecycleState::Initialized);
    }

    #[tokio::test]
    async fn operations_out_of_order_are_rejected() {
        let mut grain = HttpGrain::new(local(0));
        assert!(matches!(
            grain.start().await,
            Err(HttpError::InvalidState { operation: "start", .. })
        ));

        grain.init().unwrap();
        assert!(matches!(
            grain.init(),
            Err(HttpError::InvalidState { operation: "init", .. })
        ));
    }

    #[tokio::test]
    async fn bind_failure_is_returned_from_start() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let mut grain = HttpGrain::new(local(port));
        grain.init().unwrap();
        let err = grain.start().await.unwrap_err();
        assert!(matches!(err, HttpError::Bind { .. }));
        assert_eq!(grain.state(), LifecycleState::Initialized);
    }

    #[test]
    fn failed_init_cannot_be_retried() {
        let mut grain = HttpGrain::builder(local(0))
            .before_all_middleware(|_| Ok(()))
            .before_middleware(|_| Err("not today".into()))
            .build();

        assert!(matches!(grain.init(), Err(HttpError::Hook { .. })));
        assert_eq!(grain.state(), LifecycleState::Failed);
        assert!(matches!(
            grain.init(),
            Err(HttpError::InvalidState {
                operation: "init",
                state: LifecycleState::Failed,
            })
        ));
        assert!(grain.service().is_none());
    }

    #[test]
    fn invalid_config_fails_init() {
        let mut config = local(0);
        config.host = "not-an-ip".into();
        let mut grain = HttpGrain::new(config);
        assert!(matches!(grain.init(), Err(HttpError::Config(_))));
        assert_eq!(grain.state(), LifecycleState::Uninitialized);
    }
}
