//! Lifecycle events observable by collaborators.
//!
//! Two channels:
//! - `router:before` listeners run synchronously with `&mut App`, so they can
//!   still attach middleware right before routes are registered.
//! - Every event is also broadcast as a [`LifecycleEvent`] for async observers.

use std::net::SocketAddr;

use axum::BoxError;
use tokio::sync::broadcast;

use crate::error::HttpError;
use crate::http::App;

/// Events emitted by the grain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Fired just before the router is attached.
    RouterBefore,
    /// The listener is accepting connections on this address.
    Listening(SocketAddr),
    /// `shutdown` started closing the listener.
    ShuttingDown,
    /// The listener is closed.
    Stopped,
}

/// Listener invoked with the application handle on `router:before`.
pub type RouterBeforeListener = Box<dyn FnMut(&mut App) -> Result<(), BoxError> + Send>;

/// Event hub owned by the grain.
pub struct Events {
    tx: broadcast::Sender<LifecycleEvent>,
    router_before: Vec<RouterBeforeListener>,
}

impl Events {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            tx,
            router_before: Vec::new(),
        }
    }

    /// Subscribe to the broadcast stream of lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }

    /// Register a synchronous `router:before` listener.
    pub fn on_router_before(&mut self, listener: RouterBeforeListener) {
        self.router_before.push(listener);
    }

    /// Run every `router:before` listener in registration order, then broadcast.
    pub(crate) fn emit_router_before(&mut self, app: &mut App) -> Result<(), HttpError> {
        for listener in &mut self.router_before {
            listener(app).map_err(|e| HttpError::hook("router:before listener", e))?;
        }
        self.emit(LifecycleEvent::RouterBefore);
        Ok(())
    }

    pub(crate) fn emit(&self, event: LifecycleEvent) {
        tracing::trace!(?event, "lifecycle event");
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}

impl Default for Events {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::layer::util::Identity;

    #[tokio::test]
    async fn router_before_runs_listeners_then_broadcasts() {
        let mut events = Events::new();
        let mut rx = events.subscribe();
        events.on_router_before(Box::new(|app: &mut App| {
            app.use_layer("listener", Identity::new());
            Ok(())
        }));

        let mut app = App::new();
        events.emit_router_before(&mut app).unwrap();

        assert_eq!(app.attached(), vec!["listener"]);
        assert_eq!(rx.recv().await.unwrap(), LifecycleEvent::RouterBefore);
    }

    #[test]
    fn failing_listener_is_a_hook_error() {
        let mut events = Events::new();
        events.on_router_before(Box::new(|_: &mut App| -> Result<(), BoxError> {
            Err("nope".into())
        }));
        let err = events.emit_router_before(&mut App::new()).unwrap_err();
        assert!(matches!(err, HttpError::Hook { .. }));
    }
}
