//! Per-invocation context handed to route callbacks.

use std::borrow::Cow;
use std::sync::Arc;

use crate::recorder::{BodyReader, CapturedRequest};
use crate::router::RouteKey;

/// What a route callback sees: the captured request and the route that
/// matched it.
///
/// The request is the same snapshot stored in the recorder. Its body can be
/// read through [`body`](Self::body) as many times as needed; each reader
/// starts at byte zero, regardless of what the capture or earlier readers
/// consumed.
///
/// # Examples
///
/// ```
/// use std::io::Read;
/// use std::sync::{Arc, Mutex};
///
/// use stub_http::router::RouteRegistry;
///
/// let copied = Arc::new(Mutex::new(Vec::new()));
/// let sink = Arc::clone(&copied);
///
/// RouteRegistry::new()
///     .setup_route("/upload")
///     .post()
///     .when_invoked(move |ctx| {
///         ctx.body().read_to_end(&mut sink.lock().unwrap()).unwrap();
///     })
///     .with_text_content("OK");
/// ```
#[derive(Debug, Clone)]
pub struct InvocationContext {
    request: Arc<CapturedRequest>,
    route: RouteKey,
}

impl InvocationContext {
    pub fn new(request: Arc<CapturedRequest>, route: RouteKey) -> Self {
        Self { request, route }
    }

    pub fn request(&self) -> &CapturedRequest {
        &self.request
    }

    /// The key of the route that matched.
    pub fn route(&self) -> &RouteKey {
        &self.route
    }

    /// A fresh reader over the request body, positioned at the start.
    pub fn body(&self) -> BodyReader {
        self.request.body_reader()
    }

    pub fn body_text(&self) -> Cow<'_, str> {
        self.request.body_text()
    }

    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        self.request.json()
    }
}
