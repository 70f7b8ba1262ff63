//! Async TCP server using Tokio.
//!
//! Accepts TCP connections and dispatches HTTP/1.1 requests to a handler function.
//! Supports HTTP/1.1 persistent connections (keep-alive) and pipelining.
//!
//! Shutdown is cooperative: when the watch channel passed to
//! [`Server::serve`] flips to `true` the listener is closed, idle
//! connections are dropped, requests already being dispatched are given the
//! drain timeout to finish, and whatever is left after that is aborted.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::DEFAULT_MAX_REQUEST_SIZE;
use crate::http::{
    Method, StatusCode,
    request::{Frame, Request},
    response::Response,
};

pub mod stub;

pub use stub::{ServerState, StubServer};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid base URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// Interim response for clients that sent `Expect: 100-continue`.
const CONTINUE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// A bound HTTP/1.1 listener.
///
/// Binds to a TCP address and dispatches incoming HTTP/1.1 requests to a
/// handler function until told to stop.
///
/// # Examples
///
/// ```rust,no_run
/// use std::time::Duration;
/// use stub_http::server::Server;
/// use stub_http::http::{Request, Response, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = Server::bind("127.0.0.1:0").await?;
///     let (_stop, stopped) = tokio::sync::watch::channel(false);
///     server
///         .serve(
///             |_req: Request| async { Response::new(StatusCode::OK).body("Hello!") },
///             stopped,
///             Duration::from_secs(5),
///         )
///         .await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    max_request_size: usize,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
        })
    }

    /// Sets the largest request (head plus body) accepted before answering `413`.
    #[must_use]
    pub fn max_request_size(mut self, bytes: usize) -> Self {
        self.max_request_size = bytes;
        self
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections and dispatches requests to `handler` until
    /// `shutdown` becomes `true` (or its sender is dropped).
    ///
    /// The handler receives a [`Request`] with its body fully buffered and
    /// must return a [`Future`] that resolves to a [`Response`]. It is
    /// wrapped in an [`Arc`] and shared across all connection tasks.
    ///
    /// On shutdown the listening socket is closed first, then connections
    /// get up to `drain_timeout` to finish the request they are serving.
    ///
    /// # Errors
    ///
    /// Currently always returns `Ok(())`; accept failures are logged and
    /// the loop keeps going.
    pub async fn serve<H, F>(
        self,
        handler: H,
        mut shutdown: watch::Receiver<bool>,
        drain_timeout: Duration,
    ) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        let Server {
            listener,
            local_addr,
            max_request_size,
        } = self;
        let handler = Arc::new(handler);
        let mut connections = JoinSet::new();
        info!(address = %local_addr, "stub server listening");

        loop {
            tokio::select! {
                () = stopped(&mut shutdown) => break,
                accepted = listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                            continue;
                        }
                    };

                    debug!(peer = %peer_addr, "connection accepted");
                    let handler = Arc::clone(&handler);
                    let shutdown = shutdown.clone();

                    connections.spawn(async move {
                        if let Err(e) =
                            handle_connection(stream, peer_addr, handler, shutdown, max_request_size).await
                        {
                            warn!(peer = %peer_addr, error = %e, "connection closed with error");
                        }
                    });
                }
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = finished {
                        if e.is_panic() {
                            error!(error = %e, "connection task panicked");
                        }
                    }
                }
            }
        }

        drop(listener);
        info!(
            address = %local_addr,
            in_flight = connections.len(),
            "listener closed, draining connections"
        );

        let drain = async { while connections.join_next().await.is_some() {} };
        if tokio::time::timeout(drain_timeout, drain).await.is_err() {
            warn!(
                remaining = connections.len(),
                timeout_ms = drain_timeout.as_millis() as u64,
                "drain timed out, aborting connections"
            );
            connections.abort_all();
        }

        info!(address = %local_addr, "stub server stopped");
        Ok(())
    }
}

// Resolves once shutdown was requested or the controlling side went away.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Handles a single TCP connection over its lifetime.
///
/// HTTP/1.1 connections are persistent by default: every complete request
/// already in the buffer is served, then more bytes are read, until the peer
/// closes the connection, signals `Connection: close`, or shutdown begins.
///
/// A request whose head arrived but whose body cannot be read (malformed
/// framing, or the peer closing early) is still dispatched, with an empty
/// body, and the connection is closed afterwards.
async fn handle_connection<H, F>(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<H>,
    mut shutdown: watch::Receiver<bool>,
    max_request_size: usize,
) -> Result<(), std::io::Error>
where
    H: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);
    let mut continue_sent = false;

    loop {
        match Request::frame(&buf, max_request_size) {
            Ok(Frame::Complete { request, consumed }) => {
                let _ = buf.split_to(consumed);
                continue_sent = false;
                let keep_alive = request.is_keep_alive();
                respond(&mut stream, peer_addr, handler.as_ref(), request, keep_alive).await?;

                if !keep_alive {
                    debug!(peer = %peer_addr, "Connection: close — shutting down");
                    break;
                }
                continue;
            }
            Ok(Frame::Unreadable { request, reason }) => {
                warn!(peer = %peer_addr, error = %reason, "unreadable request body, dispatching it empty");
                respond(&mut stream, peer_addr, handler.as_ref(), request, false).await?;
                break;
            }
            Ok(Frame::TooLarge { request, max_bytes }) => {
                warn!(peer = %peer_addr, max_bytes, "request body too large, sending 413");
                let request = request.with_rejection(StatusCode::PAYLOAD_TOO_LARGE);
                respond(&mut stream, peer_addr, handler.as_ref(), request, false).await?;
                break;
            }
            Ok(Frame::BodyPending { expects_continue }) => {
                if expects_continue && !continue_sent {
                    debug!(peer = %peer_addr, "sending 100 Continue");
                    stream.write_all(CONTINUE).await?;
                    continue_sent = true;
                }
            }
            Ok(Frame::Incomplete) => {}
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request — sending 400");
                reject(&mut stream, StatusCode::BAD_REQUEST, &format!("Bad Request: {e}")).await?;
                break;
            }
        }

        // Guard against heads that never terminate.
        if buf.len() > max_request_size {
            warn!(peer = %peer_addr, "request too large — sending 413");
            reject(&mut stream, StatusCode::PAYLOAD_TOO_LARGE, "Request entity too large").await?;
            break;
        }

        let bytes_read = tokio::select! {
            read = stream.read_buf(&mut buf) => read?,
            () = stopped(&mut shutdown) => {
                debug!(peer = %peer_addr, "server stopping — closing connection");
                break;
            }
        };

        if bytes_read == 0 {
            if let Ok((request, _)) = Request::parse(&buf) {
                warn!(peer = %peer_addr, "connection closed before the request body arrived");
                // The peer may be gone entirely; the capture is what matters.
                let _ = respond(&mut stream, peer_addr, handler.as_ref(), request, false).await;
            }
            debug!(peer = %peer_addr, "connection closed by peer");
            break;
        }
    }

    Ok(())
}

async fn respond<H, F>(
    stream: &mut TcpStream,
    peer_addr: SocketAddr,
    handler: &H,
    request: Request,
    keep_alive: bool,
) -> Result<(), std::io::Error>
where
    H: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    debug!(
        peer = %peer_addr,
        method = %request.method(),
        path = %request.path(),
        version = request.version(),
        "dispatching request"
    );

    let head_only = request.method() == &Method::Head;
    let response = handler(request.with_remote_addr(peer_addr))
        .await
        .keep_alive(keep_alive)
        .head_only(head_only);

    stream.write_all(&response.into_bytes()).await?;
    stream.flush().await
}

async fn reject(
    stream: &mut TcpStream,
    status: StatusCode,
    message: &str,
) -> Result<(), std::io::Error> {
    let response = Response::new(status).body(message).keep_alive(false);
    stream.write_all(&response.into_bytes()).await?;
    stream.flush().await
}
