//! The stub server: a loopback HTTP listener wired to a route registry and a
//! request recorder.
//!
//! ```rust,no_run
//! use stub_http::{StatusCode, StubServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = StubServer::start().await?;
//!     server
//!         .setup_route("/hello")
//!         .get()
//!         .returns_status_code(StatusCode::OK)
//!         .with_text_content("HELLO WORLD");
//!
//!     // point the code under test at server.url_for("/hello") ...
//!
//!     for request in server.requests() {
//!         println!("{} {}", request.method(), request.url());
//!     }
//!     server.stop().await?;
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};
use url::Url;

use super::{Server, ServerError};
use crate::config::StubConfig;
use crate::dispatch::Dispatcher;
use crate::recorder::{CapturedRequest, RequestRecorder};
use crate::router::{RouteBuilder, RouteRegistry};

/// Whether a [`StubServer`] still accepts connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Running,
    Stopped,
}

/// An in-process HTTP server that answers with pre-configured responses and
/// records every request it receives.
///
/// Routes can be added or replaced at any time while the server runs.
/// [`stop`](Self::stop) shuts down gracefully; dropping the server without
/// stopping it aborts the listener task, which releases the port.
#[derive(Debug)]
pub struct StubServer {
    url: Url,
    local_addr: SocketAddr,
    registry: RouteRegistry,
    recorder: RequestRecorder,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<Result<(), ServerError>>>,
}

impl StubServer {
    /// Start a server on a free loopback port with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if no socket could be bound.
    pub async fn start() -> Result<Self, ServerError> {
        Self::start_with(StubConfig::default()).await
    }

    /// Start a server with the given settings.
    ///
    /// When this returns the socket is already listening, so requests sent
    /// right away are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if `config.bind_address` cannot be bound.
    pub async fn start_with(config: StubConfig) -> Result<Self, ServerError> {
        let server = Server::bind(&config.bind_address)
            .await?
            .max_request_size(config.max_request_size);
        let local_addr = server.local_addr();
        let url = Url::parse(&format!("http://{local_addr}/"))?;

        let registry = RouteRegistry::new();
        let recorder = RequestRecorder::new();
        let dispatcher = Dispatcher::new(
            registry.clone(),
            recorder.clone(),
            url.clone(),
            config.fallback_status,
        );

        let (shutdown, stopped) = watch::channel(false);
        let task = tokio::spawn(server.serve(
            move |request| std::future::ready(dispatcher.dispatch(request)),
            stopped,
            config.drain_timeout_duration(),
        ));

        info!(url = %url, "stub server started");
        Ok(Self {
            url,
            local_addr,
            registry,
            recorder,
            shutdown,
            task: Some(task),
        })
    }

    /// Base URL of the server, e.g. `http://127.0.0.1:49152/`. Always ends in `/`.
    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// The base URL as a parsed [`Url`], handy for [`Url::join`].
    pub fn base_url(&self) -> &Url {
        &self.url
    }

    /// Absolute URL for `path` on this server.
    ///
    /// ```rust,no_run
    /// # async fn demo() -> Result<(), stub_http::ServerError> {
    /// let server = stub_http::StubServer::start().await?;
    /// assert!(server.url_for("/hello").ends_with("/hello"));
    /// # Ok(())
    /// # }
    /// ```
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.url, path.trim_start_matches('/'))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Begin configuring the route for `path`. See [`RouteBuilder`].
    pub fn setup_route(&self, path: &str) -> RouteBuilder {
        self.registry.setup_route(path)
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<Arc<CapturedRequest>> {
        self.recorder.all()
    }

    pub fn recorder(&self) -> &RequestRecorder {
        &self.recorder
    }

    pub fn registry(&self) -> &RouteRegistry {
        &self.registry
    }

    pub fn state(&self) -> ServerState {
        match &self.task {
            Some(task) if !task.is_finished() => ServerState::Running,
            _ => ServerState::Stopped,
        }
    }

    /// Stop accepting connections, let in-flight requests finish within the
    /// drain timeout, and release the port. Calling it again is a no-op.
    ///
    /// The recorder stays readable after the server stopped.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Task`] if the server task panicked.
    pub async fn stop(&mut self) -> Result<(), ServerError> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };

        self.shutdown.send_replace(true);
        match task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => {
                error!(error = %e, "stub server task failed");
                Err(ServerError::Task(e))
            }
        }
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
