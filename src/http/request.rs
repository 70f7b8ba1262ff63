//! HTTP/1.1 request parsing using the [`httparse`] crate.
//!
//! Parsing happens in two steps. [`Request::parse`] reads the request head;
//! [`Request::frame`] additionally waits for the full body (fixed
//! `Content-Length` or `Transfer-Encoding: chunked`) and reports how many
//! buffered bytes belong to the request.

use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use url::Url;

use super::{Headers, Method, StatusCode};

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete — more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("unsupported request target: {0}")]
    InvalidTarget(String),

    #[error("invalid Content-Length: {0}")]
    InvalidContentLength(String),

    #[error("malformed chunked body")]
    MalformedChunk,

    #[error("request body exceeds maximum allowed size of {max_bytes} bytes")]
    BodyTooLarge { max_bytes: usize },
}

/// Result of trying to cut one complete request out of a connection buffer.
#[derive(Debug)]
pub enum Frame {
    /// The head has not fully arrived yet.
    Incomplete,
    /// The head parsed and more body bytes are needed. `expects_continue`
    /// is set when the client sent `Expect: 100-continue`.
    BodyPending { expects_continue: bool },
    /// A complete request; the first `consumed` bytes of the buffer belong to it.
    Complete { request: Request, consumed: usize },
    /// The head parsed but the body cannot be delimited. The request carries
    /// an empty body and the connection must not be reused.
    Unreadable { request: Request, reason: RequestError },
    /// The head parsed but the declared or decoded body exceeds the size
    /// limit. The request carries an empty body.
    TooLarge { request: Request, max_bytes: usize },
}

// How the length of a request body is determined (RFC 9112 §6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyFraming {
    Length(usize),
    Chunked,
}

/// A fully parsed HTTP/1.1 request.
///
/// # Examples
///
/// ```
/// use stub_http::http::request::Request;
///
/// let raw = b"GET /hello?name=world HTTP/1.1\r\nHost: localhost\r\n\r\n";
/// let (request, _offset) = Request::parse(raw).unwrap();
///
/// assert_eq!(request.method().as_str(), "GET");
/// assert_eq!(request.path(), "/hello");
/// assert_eq!(request.query_string(), Some("name=world"));
/// assert_eq!(request.headers().get("host"), Some("localhost"));
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    /// The request-target exactly as it appeared on the request line.
    target: String,
    path: String,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    query: Option<String>,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
    /// Status the transport already decided on, e.g. `413` for an oversized body.
    rejection: Option<StatusCode>,
}

impl Request {
    /// Maximum number of headers we support per request.
    const MAX_HEADERS: usize = 64;

    /// Parse a raw HTTP/1.1 request head from a byte slice.
    ///
    /// Returns the parsed `Request` (with an empty body) and the byte offset
    /// at which the body begins in `buf`.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] — more data is needed to complete the request headers.
    /// - [`RequestError::Parse`] — the data is malformed and cannot be parsed.
    /// - [`RequestError::MissingField`] — a required field (method, path, version) is absent.
    /// - [`RequestError::InvalidTarget`] — the request-target is neither origin- nor absolute-form.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method: Method = match raw_req.method {
            Some(method) => method.parse().unwrap_or_else(|never| match never {}),
            None => return Err(RequestError::MissingField { field: "method" }),
        };

        let target = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;
        let (path, query) = split_target(target)?;

        let version = raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            header_map.insert(header.name, String::from_utf8_lossy(header.value));
        }

        Ok((
            Self {
                method,
                target: target.to_owned(),
                path,
                version,
                headers: header_map,
                query,
                body: Bytes::new(),
                remote_addr: None,
                rejection: None,
            },
            body_offset,
        ))
    }

    /// Try to cut one complete request (head and body) from the front of `buf`.
    ///
    /// `max_size` bounds the head plus the decoded body. A body over the
    /// limit yields [`Frame::TooLarge`] with the parsed head.
    ///
    /// # Errors
    ///
    /// Any head error from [`Request::parse`] other than `Incomplete`.
    pub fn frame(buf: &[u8], max_size: usize) -> Result<Frame, RequestError> {
        let (request, body_offset) = match Self::parse(buf) {
            Ok(pair) => pair,
            Err(RequestError::Incomplete) => return Ok(Frame::Incomplete),
            Err(e) => return Err(e),
        };
        let budget = max_size.saturating_sub(body_offset);

        let framing = match request.body_framing() {
            Ok(framing) => framing,
            Err(reason) => return Ok(Frame::Unreadable { request, reason }),
        };

        match framing {
            BodyFraming::Length(len) => {
                if len > budget {
                    return Ok(Frame::TooLarge {
                        request,
                        max_bytes: max_size,
                    });
                }
                let end = body_offset + len;
                if buf.len() < end {
                    let expects_continue = request.expects_continue();
                    return Ok(Frame::BodyPending { expects_continue });
                }
                let body = Bytes::copy_from_slice(&buf[body_offset..end]);
                Ok(Frame::Complete {
                    request: request.with_body(body),
                    consumed: end,
                })
            }
            BodyFraming::Chunked => match decode_chunked(&buf[body_offset..], budget) {
                Ok(Some((body, used))) => Ok(Frame::Complete {
                    request: request.with_body(body),
                    consumed: body_offset + used,
                }),
                Ok(None) => Ok(Frame::BodyPending {
                    expects_continue: request.expects_continue(),
                }),
                Err(RequestError::BodyTooLarge { .. }) => Ok(Frame::TooLarge {
                    request,
                    max_bytes: max_size,
                }),
                Err(reason) => Ok(Frame::Unreadable { request, reason }),
            },
        }
    }

    /// Replaces the request body.
    #[must_use]
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    /// Records the peer the request arrived from.
    #[must_use]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Marks the request as refused by the transport with `status`. It is
    /// still recorded, but never routed.
    #[must_use]
    pub fn with_rejection(mut self, status: StatusCode) -> Self {
        self.rejection = Some(status);
        self
    }

    pub fn rejection(&self) -> Option<StatusCode> {
        self.rejection
    }

    /// Returns the peer address, if the transport recorded one.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request-target as sent, e.g. `/hello?x=1` or `http://host/hello`.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns the request path (without the query string), also for
    /// absolute-form targets.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns the request body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns `true` if the connection should be kept alive after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive. HTTP/1.0 defaults to close unless
    /// `Connection: keep-alive` is explicitly set.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) if conn.eq_ignore_ascii_case("close") => false,
            Some(conn) if conn.eq_ignore_ascii_case("keep-alive") => true,
            _ => self.version == 1,
        }
    }

    /// Returns `true` if the client waits for `100 Continue` before sending the body.
    pub fn expects_continue(&self) -> bool {
        self.version == 1
            && self
                .headers
                .get("expect")
                .is_some_and(|value| value.trim().eq_ignore_ascii_case("100-continue"))
    }

    fn body_framing(&self) -> Result<BodyFraming, RequestError> {
        if let Some(coding) = self.headers.get_all("transfer-encoding").last() {
            let last = coding.rsplit(',').next().unwrap_or("").trim();
            if last.eq_ignore_ascii_case("chunked") {
                return Ok(BodyFraming::Chunked);
            }
        }

        let mut declared = None;
        for value in self.headers.get_all("content-length") {
            let len: usize = value
                .trim()
                .parse()
                .map_err(|_| RequestError::InvalidContentLength(value.to_owned()))?;
            match declared {
                Some(previous) if previous != len => {
                    return Err(RequestError::InvalidContentLength(value.to_owned()));
                }
                _ => declared = Some(len),
            }
        }
        Ok(BodyFraming::Length(declared.unwrap_or(0)))
    }
}

// Split a request-target into (path, query). Absolute-form targets are
// reduced to their path so routing never depends on how the client phrased it.
fn split_target(target: &str) -> Result<(String, Option<String>), RequestError> {
    if target.starts_with('/') || target == "*" {
        return Ok(match target.split_once('?') {
            Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
            None => (target.to_owned(), None),
        });
    }

    if target.contains("://") {
        let url = Url::parse(target).map_err(|_| RequestError::InvalidTarget(target.to_owned()))?;
        return Ok((url.path().to_owned(), url.query().map(str::to_owned)));
    }

    Err(RequestError::InvalidTarget(target.to_owned()))
}

/// Decodes a `Transfer-Encoding: chunked` body from the front of `buf`.
///
/// Returns `Ok(None)` while the terminating zero-size chunk and trailer
/// section have not fully arrived, otherwise the decoded body and the number
/// of bytes consumed. Trailer fields are skipped.
fn decode_chunked(buf: &[u8], max_body: usize) -> Result<Option<(Bytes, usize)>, RequestError> {
    let mut pos = 0;
    let mut body = BytesMut::new();

    loop {
        let (header_len, size) = match httparse::parse_chunk_size(&buf[pos..]) {
            Ok(httparse::Status::Complete(pair)) => pair,
            Ok(httparse::Status::Partial) => return Ok(None),
            Err(_) => return Err(RequestError::MalformedChunk),
        };
        pos += header_len;

        if size == 0 {
            loop {
                let rest = &buf[pos..];
                let Some(line_len) = rest.windows(2).position(|w| w == b"\r\n") else {
                    return Ok(None);
                };
                pos += line_len + 2;
                if line_len == 0 {
                    return Ok(Some((body.freeze(), pos)));
                }
            }
        }

        let size = usize::try_from(size).map_err(|_| RequestError::MalformedChunk)?;
        if body.len().saturating_add(size) > max_body {
            return Err(RequestError::BodyTooLarge {
                max_bytes: max_body,
            });
        }

        let end = pos + size;
        if buf.len() < end + 2 {
            return Ok(None);
        }
        if &buf[end..end + 2] != b"\r\n" {
            return Err(RequestError::MalformedChunk);
        }
        body.extend_from_slice(&buf[pos..end]);
        pos = end + 2;
    }
}
