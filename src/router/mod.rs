//! Route definitions: what the stub answers for a given path and method.
//!
//! A route is identified by a [`RouteKey`], an exact `(path, method)` pair.
//! Paths are normalized on both registration and lookup:
//!
//! | Registered / requested | Normalized |
//! |------------------------|------------|
//! | `/hello`               | `/hello`   |
//! | `hello`                | `/hello`   |
//! | `/hello/`              | `/hello/`  |
//! | `//hello`              | `/hello`   |
//! | `/a//b//`              | `/a/b/`    |
//! | `/hello?x=1`           | `/hello`   |
//! | *(empty)*              | `/`        |
//!
//! `/hello` and `/hello/` are distinct routes.
//!
//! There are no wildcards or parameters: a request either matches one key
//! exactly or matches nothing.
//!
//! Routes are configured with a [`RouteBuilder`] and stored in a
//! [`RouteRegistry`].

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::context::InvocationContext;
use crate::http::{Headers, Method, Response, StatusCode};

pub mod builder;
pub mod registry;

pub use builder::RouteBuilder;
pub use registry::RouteRegistry;

/// Side effect run for every request that matches a route, before the
/// response is written.
///
/// Callbacks run on the connection's task and should return quickly. A
/// panicking callback turns the response into `500 Internal Server Error`
/// without affecting other requests.
pub type Callback = Arc<dyn Fn(&InvocationContext) + Send + Sync + 'static>;

/// Canonical form of a path for route matching.
///
/// Drops any query or fragment, collapses runs of `/` and enforces a
/// leading slash. A trailing slash is kept.
pub fn normalize_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let mut normalized = String::with_capacity(path.len() + 1);
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        normalized.push('/');
        normalized.push_str(segment);
    }
    if path.ends_with('/') || normalized.is_empty() {
        normalized.push('/');
    }
    normalized
}

/// Identity of a route: a normalized path and a method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    path: String,
    method: Method,
}

impl RouteKey {
    /// Builds a key, normalizing `path`.
    pub fn new(path: &str, method: Method) -> Self {
        Self {
            path: normalize_path(path),
            method,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> &Method {
        &self.method
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// A response payload and its media type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Content {
    body: Bytes,
    content_type: Option<String>,
}

impl Content {
    /// No body and no `Content-Type`.
    pub fn empty() -> Self {
        Self::default()
    }

    /// UTF-8 text served as `text/plain; charset=utf-8`.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            body: Bytes::from(text.into()),
            content_type: Some("text/plain; charset=utf-8".to_owned()),
        }
    }

    /// A value serialized to JSON and served as `application/json`.
    pub fn json<T>(value: &T) -> Result<Self, serde_json::Error>
    where
        T: serde::Serialize + ?Sized,
    {
        Ok(Self {
            body: Bytes::from(serde_json::to_vec(value)?),
            content_type: Some("application/json".to_owned()),
        })
    }

    /// Arbitrary bytes with an explicit media type.
    pub fn binary(body: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            content_type: Some(content_type.into()),
        }
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }
}

/// Everything the stub needs to answer one route.
///
/// Definitions are immutable once registered; changing a route means
/// registering a whole new definition under the same key.
#[derive(Clone)]
pub struct RouteDefinition {
    key: RouteKey,
    status: StatusCode,
    content: Content,
    headers: Headers,
    on_invoked: Option<Callback>,
}

impl RouteDefinition {
    /// A `200 OK` route with an empty body and no callback.
    pub fn new(key: RouteKey) -> Self {
        Self {
            key,
            status: StatusCode::OK,
            content: Content::empty(),
            headers: Headers::new(),
            on_invoked: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_content(mut self, content: Content) -> Self {
        self.content = content;
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_callback(mut self, callback: Option<Callback>) -> Self {
        self.on_invoked = callback;
        self
    }

    pub fn key(&self) -> &RouteKey {
        &self.key
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn callback(&self) -> Option<&Callback> {
        self.on_invoked.as_ref()
    }

    /// The configured response. The body is shared with the definition.
    pub fn respond(&self) -> Response {
        let mut response = Response::new(self.status);
        for (name, value) in self.headers.iter() {
            response = response.header(name, value);
        }
        if let Some(content_type) = self.content.content_type() {
            response = response.header("Content-Type", content_type);
        }
        response.body_bytes(self.content.body.clone())
    }
}

impl fmt::Debug for RouteDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDefinition")
            .field("key", &self.key)
            .field("status", &self.status)
            .field("content", &self.content)
            .field("headers", &self.headers)
            .field("on_invoked", &self.on_invoked.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_root_and_empty() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("//"), "/");
    }

    #[test]
    fn normalize_keeps_trailing_slash() {
        assert_eq!(normalize_path("/users/"), "/users/");
        assert_eq!(normalize_path("/users//"), "/users/");
        assert_eq!(normalize_path("/users/?page=2"), "/users/");
        assert_ne!(normalize_path("/users/"), normalize_path("/users"));
    }

    #[test]
    fn normalize_collapses_repeated_slashes() {
        assert_eq!(normalize_path("//hello"), "/hello");
        assert_eq!(normalize_path("/a//b///c"), "/a/b/c");
    }

    #[test]
    fn normalize_adds_leading_slash() {
        assert_eq!(normalize_path("hello"), "/hello");
    }

    #[test]
    fn normalize_drops_query_and_fragment() {
        assert_eq!(normalize_path("/hello?x=1"), "/hello");
        assert_eq!(normalize_path("/hello#top"), "/hello");
    }

    #[test]
    fn keys_compare_after_normalization() {
        assert_eq!(
            RouteKey::new("/hello", Method::Get),
            RouteKey::new("//hello", Method::Get)
        );
        assert_ne!(
            RouteKey::new("/hello/", Method::Get),
            RouteKey::new("/hello", Method::Get)
        );
        assert_ne!(
            RouteKey::new("/hello", Method::Get),
            RouteKey::new("/hello", Method::Post)
        );
        assert_eq!(RouteKey::new("hello", Method::Put).to_string(), "PUT /hello");
    }

    #[test]
    fn text_content_sets_charset() {
        let content = Content::text("HELLO WORLD");
        assert_eq!(content.body().as_ref(), b"HELLO WORLD");
        assert_eq!(content.content_type(), Some("text/plain; charset=utf-8"));
    }

    #[test]
    fn json_content() {
        let content = Content::json(&serde_json::json!({ "ok": true })).unwrap();
        assert_eq!(content.body().as_ref(), br#"{"ok":true}"#);
        assert_eq!(content.content_type(), Some("application/json"));
    }

    #[test]
    fn respond_uses_configured_fields() {
        let definition = RouteDefinition::new(RouteKey::new("/hello", Method::Get))
            .with_status(StatusCode::CREATED)
            .with_content(Content::binary(vec![1u8, 2, 3], "application/octet-stream"))
            .with_headers([("X-Stub", "yes")].into_iter().collect());

        let response = definition.respond();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.content().as_ref(), &[1u8, 2, 3]);
        assert_eq!(response.headers().get("x-stub"), Some("yes"));
        assert_eq!(
            response.headers().get("content-type"),
            Some("application/octet-stream")
        );
    }
}
