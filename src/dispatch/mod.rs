//! Request dispatch.
//!
//! For every complete request handed over by the transport the
//! [`Dispatcher`]:
//!
//! 1. snapshots the request into the [`RequestRecorder`] (always, even when
//!    nothing matches),
//! 2. looks up the route for the request's method and normalized path,
//! 3. runs the route's callback, if any,
//! 4. returns the route's configured response, or the fallback status when
//!    no route matches.
//!
//! Requests the transport already refused (see [`Request::with_rejection`])
//! are recorded and answered with that status, skipping route lookup.
//!
//! A panicking callback is contained here: it is logged and answered with
//! `500 Internal Server Error`, and the dispatcher keeps serving.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::{debug, error};
use url::Url;

use crate::context::InvocationContext;
use crate::http::{Request, Response, StatusCode};
use crate::recorder::{CapturedRequest, RequestRecorder};
use crate::router::{RouteKey, RouteRegistry};

/// Routes requests against a [`RouteRegistry`] and records them in a
/// [`RequestRecorder`]. Cheap to clone; clones share both.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: RouteRegistry,
    recorder: RequestRecorder,
    base_url: Url,
    fallback: StatusCode,
}

impl Dispatcher {
    /// `base_url` resolves relative targets into absolute captured URLs;
    /// `fallback` is the status for requests no route matches.
    pub fn new(
        registry: RouteRegistry,
        recorder: RequestRecorder,
        base_url: Url,
        fallback: StatusCode,
    ) -> Self {
        Self {
            registry,
            recorder,
            base_url,
            fallback,
        }
    }

    pub fn registry(&self) -> &RouteRegistry {
        &self.registry
    }

    pub fn recorder(&self) -> &RequestRecorder {
        &self.recorder
    }

    /// Capture `request`, then produce the response for it.
    pub fn dispatch(&self, request: Request) -> Response {
        let captured = self
            .recorder
            .append(CapturedRequest::from_request(&request, &self.base_url));
        if let Some(status) = request.rejection() {
            debug!(
                sequence = captured.sequence(),
                status = status.as_u16(),
                "request refused before routing"
            );
            return Response::new(status).body(status.canonical_reason().unwrap_or_default());
        }

        let key = RouteKey::new(request.path(), request.method().clone());

        let Some(route) = self.registry.lookup(&key) else {
            debug!(
                sequence = captured.sequence(),
                route = %key,
                status = self.fallback.as_u16(),
                "no route matched"
            );
            return Response::new(self.fallback);
        };

        if let Some(callback) = route.callback() {
            let ctx = InvocationContext::new(Arc::clone(&captured), key.clone());
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(&ctx))) {
                error!(
                    sequence = captured.sequence(),
                    route = %key,
                    reason = panic_message(panic.as_ref()),
                    "route callback panicked"
                );
                return Response::new(StatusCode::INTERNAL_SERVER_ERROR)
                    .body("route callback panicked");
            }
        }

        debug!(
            sequence = captured.sequence(),
            route = %key,
            status = route.status().as_u16(),
            "route matched"
        );
        route.respond()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
