//! # stub-http
//!
//! An in-process HTTP/1.1 stub server for tests. Start it on a free loopback
//! port, describe the responses it should give, point the code under test at
//! it, then inspect every request it received.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stub_http::{Method, StatusCode, StubServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = StubServer::start().await?;
//!     server
//!         .setup_route("/hello")
//!         .post()
//!         .returns_status_code(StatusCode::CREATED)
//!         .when_invoked(|ctx| println!("got {}", ctx.body_text()))
//!         .with_text_content("HELLO WORLD");
//!
//!     // ... exercise the client against server.url_for("/hello") ...
//!
//!     let posts = server.recorder().matching(&Method::Post, "/hello");
//!     println!("{} POSTs", posts.len());
//!     server.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod dispatch;
pub mod http;
pub mod recorder;
pub mod router;
pub mod server;

pub use config::StubConfig;
pub use context::InvocationContext;
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use recorder::{BodyReader, CapturedRequest, RequestRecorder};
pub use router::{RouteBuilder, RouteDefinition, RouteKey, RouteRegistry};
pub use server::{Server, ServerError, ServerState, StubServer};
