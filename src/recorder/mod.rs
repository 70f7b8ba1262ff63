//! Request recording: an append-only log of every request the stub received.
//!
//! Each accepted request is turned into an immutable [`CapturedRequest`]
//! before any route logic runs, so the log also holds requests that matched
//! no route. The body is buffered once into [`Bytes`]; every call to
//! [`CapturedRequest::body_reader`] hands out a fresh reader positioned at
//! the start, so the body can be read any number of times.

use std::borrow::Cow;
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Serialize, Serializer};
use url::Url;

use crate::http::{Headers, Method, Request};
use crate::router::normalize_path;

/// A readable, seekable view over a captured body. Implements both
/// [`std::io::Read`] and [`tokio::io::AsyncRead`].
pub type BodyReader = Cursor<Bytes>;

/// Immutable snapshot of one incoming request.
#[derive(Debug, Clone, Serialize)]
pub struct CapturedRequest {
    sequence: usize,
    method: Method,
    url: Url,
    headers: Headers,
    #[serde(serialize_with = "serialize_body")]
    body: Bytes,
    remote_addr: Option<SocketAddr>,
    received_at: SystemTime,
}

impl CapturedRequest {
    /// Snapshot `request`, resolving its target against `base_url` to get an
    /// absolute URL.
    ///
    /// The `Host` header decides the authority when present, so the URL
    /// matches what the client asked for. Targets that cannot be combined
    /// with it fall back to `base_url`.
    pub fn from_request(request: &Request, base_url: &Url) -> Self {
        Self {
            sequence: 0,
            method: request.method().clone(),
            url: absolute_url(request, base_url),
            headers: request.headers().clone(),
            body: request.body().clone(),
            remote_addr: request.remote_addr(),
            received_at: SystemTime::now(),
        }
    }

    /// Position of this request in the recorder, starting at zero.
    pub fn sequence(&self) -> usize {
        self.sequence
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The absolute URL as seen by the server, including scheme, host, port,
    /// path and query.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Shorthand for `url().path()`, not normalized.
    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// First value of a header, looked up case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// The fully buffered request body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The body decoded as UTF-8, with invalid sequences replaced.
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// A new reader over the body, positioned at byte zero.
    ///
    /// Readers are independent: consuming one never affects another or the
    /// snapshot itself.
    pub fn body_reader(&self) -> BodyReader {
        Cursor::new(self.body.clone())
    }

    /// Deserialize the body as JSON.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(&self.body)
    }

    /// Address of the client that sent the request, when known.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn received_at(&self) -> SystemTime {
        self.received_at
    }
}

fn serialize_body<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(body))
}

fn absolute_url(request: &Request, base_url: &Url) -> Url {
    let target = request.target();
    if target.contains("://") {
        if let Ok(url) = Url::parse(target) {
            return url;
        }
    }

    if let Some(host) = request.headers().get("host").map(str::trim) {
        if !host.is_empty() {
            if let Ok(url) = Url::parse(&format!("{}://{host}{target}", base_url.scheme())) {
                return url;
            }
        }
    }

    base_url.join(target).unwrap_or_else(|_| base_url.clone())
}

/// Thread-safe, insertion-ordered log of [`CapturedRequest`]s.
///
/// Cloning is cheap and every clone appends to and reads from the same log.
/// Entries are never removed while the recorder is alive.
#[derive(Debug, Clone, Default)]
pub struct RequestRecorder {
    log: Arc<RwLock<Vec<Arc<CapturedRequest>>>>,
}

impl RequestRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a request, assigning it the next sequence number.
    ///
    /// The sequence number is assigned under the same lock as the push, so
    /// `sequence` always equals the entry's index in [`all`](Self::all).
    pub fn append(&self, mut request: CapturedRequest) -> Arc<CapturedRequest> {
        let mut log = self.log.write();
        request.sequence = log.len();
        let request = Arc::new(request);
        log.push(Arc::clone(&request));
        request
    }

    /// A consistent snapshot of everything appended so far, oldest first.
    pub fn all(&self) -> Vec<Arc<CapturedRequest>> {
        self.log.read().clone()
    }

    pub fn first(&self) -> Option<Arc<CapturedRequest>> {
        self.log.read().first().cloned()
    }

    pub fn last(&self) -> Option<Arc<CapturedRequest>> {
        self.log.read().last().cloned()
    }

    pub fn get(&self, index: usize) -> Option<Arc<CapturedRequest>> {
        self.log.read().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.log.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.read().is_empty()
    }

    /// Requests with the given method whose normalized path equals the
    /// normalized `path`.
    pub fn matching(&self, method: &Method, path: &str) -> Vec<Arc<CapturedRequest>> {
        let path = normalize_path(path);
        self.log
            .read()
            .iter()
            .filter(|r| &r.method == method && normalize_path(r.path()) == path)
            .cloned()
            .collect()
    }
}
