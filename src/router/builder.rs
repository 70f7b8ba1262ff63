//! Fluent route configuration.
//!
//! ```
//! use stub_http::http::StatusCode;
//! use stub_http::router::RouteRegistry;
//!
//! let registry = RouteRegistry::new();
//! registry
//!     .setup_route("/hello")
//!     .post()
//!     .returns_status_code(StatusCode::CREATED)
//!     .when_invoked(|ctx| println!("{} bytes", ctx.request().body().len()))
//!     .with_text_content("HELLO WORLD");
//!
//! assert_eq!(registry.len(), 1);
//! ```

use std::sync::Arc;

use bytes::Bytes;

use super::{Callback, Content, RouteDefinition, RouteKey, RouteRegistry};
use crate::context::InvocationContext;
use crate::http::{Headers, Method, StatusCode};

/// Accumulates the configuration of one route and publishes it to a
/// [`RouteRegistry`].
///
/// Every `setup_route` call returns a fresh builder; builders are never
/// shared. The route is published by the first content-setting call
/// ([`with_text_content`](Self::with_text_content),
/// [`with_json_content`](Self::with_json_content),
/// [`with_binary_content`](Self::with_binary_content)) or by
/// [`publish`](Self::publish). Once published, every further setter
/// re-publishes, replacing the route under the builder's current key.
///
/// Defaults: method `GET`, status `200 OK`, empty body.
pub struct RouteBuilder {
    registry: RouteRegistry,
    path: String,
    method: Method,
    status: StatusCode,
    headers: Headers,
    on_invoked: Option<Callback>,
    content: Option<Content>,
}

impl RouteBuilder {
    pub(crate) fn new(registry: RouteRegistry, path: &str) -> Self {
        Self {
            registry,
            path: path.to_owned(),
            method: Method::default(),
            status: StatusCode::OK,
            headers: Headers::new(),
            on_invoked: None,
            content: None,
        }
    }

    #[must_use]
    pub fn get(self) -> Self {
        self.method(Method::Get)
    }

    #[must_use]
    pub fn post(self) -> Self {
        self.method(Method::Post)
    }

    #[must_use]
    pub fn put(self) -> Self {
        self.method(Method::Put)
    }

    #[must_use]
    pub fn delete(self) -> Self {
        self.method(Method::Delete)
    }

    #[must_use]
    pub fn patch(self) -> Self {
        self.method(Method::Patch)
    }

    #[must_use]
    pub fn head(self) -> Self {
        self.method(Method::Head)
    }

    #[must_use]
    pub fn options(self) -> Self {
        self.method(Method::Options)
    }

    /// Select any method, including extension methods.
    ///
    /// Select the method before setting content: changing it afterwards
    /// publishes under the new key and leaves the old route in place.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self.sync()
    }

    #[must_use]
    pub fn returns_status_code(mut self, status: StatusCode) -> Self {
        self.status = status;
        self.sync()
    }

    /// Add a response header. `Content-Type` comes from the content setters.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self.sync()
    }

    /// Run `callback` for every matching request, before the response is
    /// written.
    ///
    /// The callback receives an [`InvocationContext`] with the captured
    /// request; its body can be read from the start as often as needed.
    /// Replaces any callback set earlier on this builder.
    #[must_use]
    pub fn when_invoked<F>(mut self, callback: F) -> Self
    where
        F: Fn(&InvocationContext) + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(callback);
        self.on_invoked = Some(callback);
        self.sync()
    }

    /// Respond with `text` as `text/plain; charset=utf-8` and publish.
    pub fn with_text_content(self, text: impl Into<String>) -> Self {
        self.with_content(Content::text(text))
    }

    /// Respond with `value` serialized as JSON and publish.
    ///
    /// # Errors
    ///
    /// Returns the serialization error; nothing is published in that case.
    pub fn with_json_content<T>(self, value: &T) -> Result<Self, serde_json::Error>
    where
        T: serde::Serialize + ?Sized,
    {
        Ok(self.with_content(Content::json(value)?))
    }

    /// Respond with raw bytes of the given media type and publish.
    pub fn with_binary_content(
        self,
        body: impl Into<Bytes>,
        content_type: impl Into<String>,
    ) -> Self {
        self.with_content(Content::binary(body, content_type))
    }

    /// Publish now, with an empty body if no content was set.
    pub fn publish(mut self) -> Self {
        self.content.get_or_insert_with(Content::empty);
        self.sync()
    }

    /// The key this builder currently publishes under.
    pub fn key(&self) -> RouteKey {
        RouteKey::new(&self.path, self.method.clone())
    }

    fn with_content(mut self, content: Content) -> Self {
        self.content = Some(content);
        self.sync()
    }

    // Publish if content has been set; otherwise keep accumulating.
    fn sync(self) -> Self {
        if let Some(content) = &self.content {
            let definition = RouteDefinition::new(self.key())
                .with_status(self.status)
                .with_content(content.clone())
                .with_headers(self.headers.clone())
                .with_callback(self.on_invoked.clone());
            self.registry.upsert(definition);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn lookup(registry: &RouteRegistry, path: &str, method: Method) -> Arc<RouteDefinition> {
        registry
            .lookup(&RouteKey::new(path, method))
            .expect("route should be registered")
    }

    #[test]
    fn nothing_is_registered_before_content() {
        let registry = RouteRegistry::new();
        let _builder = registry
            .setup_route("/hello")
            .get()
            .returns_status_code(StatusCode::OK);
        assert!(registry.is_empty());
    }

    #[test]
    fn method_defaults_to_get() {
        let registry = RouteRegistry::new();
        registry.setup_route("/hello").with_text_content("HELLO");
        let route = lookup(&registry, "/hello", Method::Get);
        assert_eq!(route.status(), StatusCode::OK);
    }

    #[test]
    fn text_content_publishes_full_definition() {
        let registry = RouteRegistry::new();
        registry
            .setup_route("/hello")
            .post()
            .returns_status_code(StatusCode::ACCEPTED)
            .with_header("X-Stub", "1")
            .with_text_content("HELLO WORLD");

        let route = lookup(&registry, "/hello", Method::Post);
        assert_eq!(route.status(), StatusCode::ACCEPTED);
        assert_eq!(route.content().body().as_ref(), b"HELLO WORLD");
        assert_eq!(
            route.content().content_type(),
            Some("text/plain; charset=utf-8")
        );
        assert_eq!(route.headers().get("x-stub"), Some("1"));
        assert!(route.callback().is_none());
    }

    #[test]
    fn setters_after_content_republish() {
        let registry = RouteRegistry::new();
        let builder = registry.setup_route("/hello").with_text_content("HELLO");
        let _builder = builder.returns_status_code(StatusCode::IM_A_TEAPOT);

        let route = lookup(&registry, "/hello", Method::Get);
        assert_eq!(route.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(route.content().body().as_ref(), b"HELLO");
    }

    #[test]
    fn setting_up_again_replaces_route() {
        let registry = RouteRegistry::new();
        registry.setup_route("/hello").get().with_text_content("HELLO WORLD");
        registry.setup_route("/hello").get().with_text_content("GOODBYE WORLD");

        assert_eq!(registry.len(), 1);
        let route = lookup(&registry, "/hello", Method::Get);
        assert_eq!(route.content().body().as_ref(), b"GOODBYE WORLD");
    }

    #[test]
    fn publish_without_content() {
        let registry = RouteRegistry::new();
        registry
            .setup_route("/gone")
            .delete()
            .returns_status_code(StatusCode::NO_CONTENT)
            .publish();

        let route = lookup(&registry, "/gone", Method::Delete);
        assert_eq!(route.status(), StatusCode::NO_CONTENT);
        assert!(route.content().body().is_empty());
        assert_eq!(route.content().content_type(), None);
    }

    #[test]
    fn json_and_binary_content() {
        let registry = RouteRegistry::new();
        registry
            .setup_route("/json")
            .with_json_content(&serde_json::json!({ "id": 7 }))
            .unwrap();
        registry
            .setup_route("/bin")
            .put()
            .with_binary_content(Bytes::from_static(b"\x00\x01"), "application/octet-stream");

        let json = lookup(&registry, "/json", Method::Get);
        assert_eq!(json.content().content_type(), Some("application/json"));
        assert_eq!(json.content().body().as_ref(), br#"{"id":7}"#);

        let bin = lookup(&registry, "/bin", Method::Put);
        assert_eq!(bin.content().body().as_ref(), b"\x00\x01");
    }

    #[test]
    fn custom_method() {
        let registry = RouteRegistry::new();
        let builder = registry
            .setup_route("/cache")
            .method(Method::Custom("PURGE".to_owned()));
        assert_eq!(builder.key().to_string(), "PURGE /cache");
        builder.publish();
        assert!(
            registry
                .lookup(&RouteKey::new("/cache", Method::Custom("PURGE".to_owned())))
                .is_some()
        );
    }

    #[test]
    fn callback_is_attached() {
        let registry = RouteRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        registry
            .setup_route("/hello")
            .when_invoked(move |_ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .with_text_content("HELLO");

        let route = lookup(&registry, "/hello", Method::Get);
        assert!(route.callback().is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
