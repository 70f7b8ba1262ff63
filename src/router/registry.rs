//! The live route table shared between test code and the accept loop.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::{RouteBuilder, RouteDefinition, RouteKey};

/// Concurrent map from [`RouteKey`] to the route currently answering it.
///
/// Each entry holds an `Arc<RouteDefinition>`. Replacing a route swaps the
/// whole `Arc` in one step, and a lookup clones the `Arc` out before the
/// shard lock is released, so a request always sees either the old or the
/// new definition in full.
///
/// Cloning is cheap; clones share the same table.
///
/// # Examples
///
/// ```
/// use stub_http::http::{Method, StatusCode};
/// use stub_http::router::{RouteKey, RouteRegistry};
///
/// let registry = RouteRegistry::new();
/// registry
///     .setup_route("/hello")
///     .get()
///     .returns_status_code(StatusCode::OK)
///     .with_text_content("HELLO WORLD");
///
/// let route = registry.lookup(&RouteKey::new("/hello", Method::Get)).unwrap();
/// assert_eq!(route.content().body().as_ref(), b"HELLO WORLD");
/// ```
#[derive(Clone, Default)]
pub struct RouteRegistry {
    routes: Arc<DashMap<RouteKey, Arc<RouteDefinition>>>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start configuring the route at `path`. Nothing is registered until
    /// the builder publishes.
    pub fn setup_route(&self, path: &str) -> RouteBuilder {
        RouteBuilder::new(self.clone(), path)
    }

    /// Insert `definition` under its key, replacing whatever was there.
    ///
    /// Returns the replaced definition. Requests already holding the old
    /// definition finish with it; every later lookup sees the new one.
    pub fn upsert(&self, definition: RouteDefinition) -> Option<Arc<RouteDefinition>> {
        let key = definition.key().clone();
        debug!(route = %key, status = definition.status().as_u16(), "route registered");
        self.routes.insert(key, Arc::new(definition))
    }

    /// The definition currently registered for `key`, if any.
    pub fn lookup(&self, key: &RouteKey) -> Option<Arc<RouteDefinition>> {
        self.routes.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, key: &RouteKey) -> Option<Arc<RouteDefinition>> {
        self.routes.remove(key).map(|(_, definition)| definition)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Keys of all registered routes, in no particular order.
    pub fn keys(&self) -> Vec<RouteKey> {
        self.routes.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl fmt::Debug for RouteRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteRegistry")
            .field("routes", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    use super::*;
    use crate::http::{Method, StatusCode};
    use crate::router::Content;

    fn definition(path: &str, method: Method, body: &str) -> RouteDefinition {
        RouteDefinition::new(RouteKey::new(path, method)).with_content(Content::text(body))
    }

    #[test]
    fn starts_empty() {
        let registry = RouteRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.lookup(&RouteKey::new("/", Method::Get)).is_none());
    }

    #[test]
    fn upsert_then_lookup() {
        let registry = RouteRegistry::new();
        assert!(registry.upsert(definition("/hello", Method::Get, "HELLO")).is_none());

        let found = registry.lookup(&RouteKey::new("/hello", Method::Get)).unwrap();
        assert_eq!(found.content().body().as_ref(), b"HELLO");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn upsert_replaces_same_key() {
        let registry = RouteRegistry::new();
        registry.upsert(definition("/hello", Method::Get, "HELLO WORLD"));
        let previous = registry
            .upsert(definition("//hello", Method::Get, "GOODBYE WORLD"))
            .unwrap();

        assert_eq!(previous.content().body().as_ref(), b"HELLO WORLD");
        let current = registry.lookup(&RouteKey::new("/hello", Method::Get)).unwrap();
        assert_eq!(current.content().body().as_ref(), b"GOODBYE WORLD");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn lookup_is_exact_on_method() {
        let registry = RouteRegistry::new();
        registry.upsert(definition("/hello", Method::Get, "HELLO"));
        assert!(registry.lookup(&RouteKey::new("/hello", Method::Post)).is_none());
        assert!(registry.lookup(&RouteKey::new("/hello/world", Method::Get)).is_none());
        assert!(registry.lookup(&RouteKey::new("/hello/", Method::Get)).is_none());
    }

    #[test]
    fn held_definition_survives_replacement() {
        let registry = RouteRegistry::new();
        registry.upsert(definition("/hello", Method::Get, "OLD"));
        let in_flight = registry.lookup(&RouteKey::new("/hello", Method::Get)).unwrap();
        registry.upsert(definition("/hello", Method::Get, "NEW"));
        assert_eq!(in_flight.content().body().as_ref(), b"OLD");
    }

    #[test]
    fn remove_and_keys() {
        let registry = RouteRegistry::new();
        registry.upsert(definition("/a", Method::Get, "a"));
        registry.upsert(definition("/b", Method::Post, "b"));
        let mut keys: Vec<String> = registry.keys().iter().map(ToString::to_string).collect();
        keys.sort();
        assert_eq!(keys, vec!["GET /a", "POST /b"]);

        assert!(registry.remove(&RouteKey::new("/a", Method::Get)).is_some());
        assert!(registry.remove(&RouteKey::new("/a", Method::Get)).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn concurrent_replacement_never_tears() {
        let registry = RouteRegistry::new();
        let key = RouteKey::new("/race", Method::Get);
        registry.upsert(
            RouteDefinition::new(key.clone())
                .with_status(StatusCode::from_u16(200).unwrap())
                .with_content(Content::text("200")),
        );

        let done = Arc::new(AtomicBool::new(false));
        let writer = {
            let registry = registry.clone();
            let key = key.clone();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                for code in 200..600u16 {
                    registry.upsert(
                        RouteDefinition::new(key.clone())
                            .with_status(StatusCode::from_u16(code).unwrap())
                            .with_content(Content::text(code.to_string())),
                    );
                }
                done.store(true, Ordering::SeqCst);
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                let key = key.clone();
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    while !done.load(Ordering::SeqCst) {
                        let route = registry.lookup(&key).unwrap();
                        let body = std::str::from_utf8(route.content().body()).unwrap();
                        assert_eq!(body, route.status().as_u16().to_string());
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        let last = registry.lookup(&key).unwrap();
        assert_eq!(last.status().as_u16(), 599);
    }
}
