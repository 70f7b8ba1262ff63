//! HTTP/1.1 responses and their wire encoding.
//!
//! Framing headers (`Content-Length`, `Connection`) belong to the encoder:
//! values set for them through [`Response::header`] are ignored so a
//! configured route can never produce a response the client cannot delimit.

use std::fmt::Write as _;

use bytes::{BufMut, Bytes, BytesMut};

use super::{Headers, StatusCode};

const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// An HTTP/1.1 response, ready to be encoded and sent.
///
/// # Examples
///
/// ```
/// use stub_http::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::OK)
///     .header("Content-Type", "application/json")
///     .body(r#"{"status":"ok"}"#);
///
/// let bytes = response.into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("Content-Length: 15\r\n"));
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Bytes,
    keep_alive: bool,
    head_only: bool,
}

impl Response {
    /// A response with `status`, no headers and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Bytes::new(),
            keep_alive: true,
            head_only: false,
        }
    }

    /// Appends a header. Repeated names are sent as repeated lines.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Bytes::from(body.into());
        self
    }

    /// Sets the body from bytes. A `Bytes` argument is shared, not copied.
    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Whether the connection stays open after this response.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Encode headers only, as the answer to a `HEAD` request.
    ///
    /// `Content-Length` still reports the size the body would have had.
    #[must_use]
    pub fn head_only(mut self, head_only: bool) -> Self {
        self.head_only = head_only;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Headers set so far, without the framing headers the encoder adds.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn content(&self) -> &Bytes {
        &self.body
    }

    /// Encodes into a fresh buffer. See [`encode`](Self::encode).
    pub fn into_bytes(self) -> BytesMut {
        let mut dst = BytesMut::with_capacity(128 + self.headers.len() * 48 + self.body.len());
        self.encode(&mut dst);
        dst
    }

    /// Appends the HTTP/1.1 encoding of this response to `dst`.
    ///
    /// - `Content-Type: text/plain; charset=utf-8` is added when there is a
    ///   body and no content type was set.
    /// - `Connection` reflects [`keep_alive`](Self::keep_alive).
    /// - `Content-Length` comes last. It is omitted, together with the body,
    ///   for statuses that never carry content (`1xx`, `204`, `304`).
    pub fn encode(&self, dst: &mut BytesMut) {
        let bodyless = self.status.as_u16() < 200 || matches!(self.status.as_u16(), 204 | 304);

        // `fmt::Write` for `BytesMut` never fails.
        let _ = write!(
            dst,
            "HTTP/1.1 {} {}\r\n",
            self.status.as_u16(),
            self.status.canonical_reason().unwrap_or("")
        );

        for (name, value) in self.headers.iter() {
            if is_framing_header(name) {
                continue;
            }
            let _ = write!(dst, "{name}: {value}\r\n");
        }

        if !bodyless && !self.body.is_empty() && !self.headers.contains("content-type") {
            let _ = write!(dst, "Content-Type: {DEFAULT_CONTENT_TYPE}\r\n");
        }

        let connection = if self.keep_alive { "keep-alive" } else { "close" };
        let _ = write!(dst, "Connection: {connection}\r\n");

        if bodyless {
            dst.put_slice(b"\r\n");
            return;
        }

        let _ = write!(dst, "Content-Length: {}\r\n\r\n", self.body.len());
        if !self.head_only {
            dst.put_slice(&self.body);
        }
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}

fn is_framing_header(name: &str) -> bool {
    ["content-length", "connection", "transfer-encoding"]
        .iter()
        .any(|framing| name.eq_ignore_ascii_case(framing))
}
