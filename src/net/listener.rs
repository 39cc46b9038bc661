//! TCP listener and accept loop.
//!
//! # Responsibilities
//! - Bind the configured address
//! - Accept incoming TCP connections
//! - Enforce `max_connections` via semaphore
//! - Serve each connection over HTTP/1.1 on its own task
//! - Stop accepting and close the socket on [`ServerHandle::close`]
//!
//! # Design Decisions
//! - Closing only stops the accept loop; connection tasks are detached and
//!   finish their in-flight requests on their own
//! - Every connection is registered with the [`ConnectionTracker`] so it can
//!   still be force-closed later, and every request is counted there until
//!   its response body is done
//! - The accept loop has exactly one stop signal, a `oneshot`; dropping the
//!   handle stops it too

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, extract::ConnectInfo};
use http_body_util::BodyExt;
use hyper::{body::Incoming, server::conn::http1, service::service_fn};
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tower::ServiceExt;

use crate::http::AppService;
use crate::net::connection::ConnectionTracker;

/// A bounded TCP listener that limits concurrent connections.
///
/// When the limit is reached, accepting waits until a slot frees up.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    connection_limit: Arc<Semaphore>,
    max_connections: usize,
}

impl Listener {
    /// Bind to `address` (`host:port`).
    pub async fn bind(address: &str, max_connections: usize) -> std::io::Result<Self> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        tracing::info!(
            address = %local_addr,
            max_connections,
            "Listener bound"
        );

        Ok(Self {
            inner: listener,
            connection_limit: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        })
    }

    /// Accept a connection, waiting for a free slot first.
    ///
    /// The permit must be held for the connection's lifetime.
    pub async fn accept(&self) -> std::io::Result<(TcpStream, SocketAddr, ConnectionPermit)> {
        let permit = self
            .connection_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(std::io::Error::other)?;

        let (stream, addr) = self.inner.accept().await?;

        tracing::debug!(
            peer_addr = %addr,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// A connection slot. Dropping it releases the slot, even if the connection
/// task panics.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: OwnedSemaphorePermit,
}

/// Handle to a running accept loop.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    stop: oneshot::Sender<()>,
    accept_task: JoinHandle<()>,
}

impl ServerHandle {
    /// Start accepting on `listener`, serving every connection with `app`.
    pub fn spawn(
        listener: Listener,
        app: AppService,
        tracker: ConnectionTracker,
    ) -> std::io::Result<Self> {
        let local_addr = listener.local_addr()?;
        let (stop, mut stopped) = oneshot::channel();

        let accept_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stopped => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer, permit)) => {
                            spawn_connection(stream, peer, permit, app.clone(), &tracker);
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to accept connection");
                            // Usually fd exhaustion; give teardown a moment.
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    },
                }
            }
            drop(listener);
            tracing::info!(address = %local_addr, "Listener closed");
        });

        Ok(Self {
            local_addr,
            stop,
            accept_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and close the listening socket.
    ///
    /// Returns once the socket is closed. Open connections are left alone.
    pub async fn close(self) {
        // The loop may already be gone; the join below reports why.
        let _ = self.stop.send(());
        if let Err(e) = self.accept_task.await {
            tracing::error!(error = %e, "Accept loop ended abnormally");
        }
    }
}

fn spawn_connection(
    stream: TcpStream,
    peer: SocketAddr,
    permit: ConnectionPermit,
    app: AppService,
    tracker: &ConnectionTracker,
) {
    let guard = tracker.track();
    let id = guard.id();
    let requests = tracker.clone();

    let task = tokio::spawn(async move {
        let _guard = guard;
        let _permit = permit;

        let service = service_fn(move |request: hyper::Request<Incoming>| {
            let in_flight = requests.begin_request();
            let mut request = request.map(Body::new);
            request.extensions_mut().insert(ConnectInfo(peer));
            let response = app.clone().oneshot(request);
            async move {
                let response = response.await?;
                // The guard rides along with the body until hyper drops it.
                Ok::<_, Infallible>(response.map(|body| {
                    Body::new(body.map_frame(move |frame| {
                        let _held = &in_flight;
                        frame
                    }))
                }))
            }
        });

        if let Err(e) = http1::Builder::new()
            .serve_connection(TokioIo::new(stream), service)
            .await
        {
            tracing::debug!(connection_id = %id, peer = %peer, error = %e, "Connection error");
        }
    });

    tracker.attach(id, task.abort_handle());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::App;
    use axum::{routing::get, Router};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn app() -> AppService {
        let mut app = App::new();
        app.mount(Router::new().route("/", get(|| async { "hi" })));
        app.into_service()
    }

    #[tokio::test]
    async fn serves_until_closed() {
        let listener = Listener::bind("127.0.0.1:0", 8).await.unwrap();
        let tracker = ConnectionTracker::new();
        let handle = ServerHandle::spawn(listener, app(), tracker.clone()).unwrap();
        let addr = handle.local_addr();

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nhost: test\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("hi"));

        handle.close().await;
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn permits_are_released_with_connections() {
        let listener = Listener::bind("127.0.0.1:0", 1).await.unwrap();
        assert_eq!(listener.max_connections(), 1);
        let addr = listener.local_addr().unwrap();

        let _client = TcpStream::connect(addr).await.unwrap();
        let (_stream, _, permit) = listener.accept().await.unwrap();
        assert_eq!(listener.available_permits(), 0);
        drop(permit);
        assert_eq!(listener.available_permits(), 1);
    }

    #[tokio::test]
    async fn bad_address_fails_to_bind() {
        assert!(Listener::bind("not an address", 1).await.is_err());
    }
}
