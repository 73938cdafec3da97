//! lu-core: Embeddable HTTP request router
//!
//! Routes requests by path and method, wraps handlers in an ordered
//! middleware chain and renders one pending [`Reply`] per request: text,
//! bytes, JSON/XML with content negotiation, template views, files and
//! redirects.
//!
//! The router is transport-neutral: [`Router::serve`] takes a [`Request`]
//! and returns a [`Response`]. Failures never escape it; handler errors and
//! panics become `500` responses.
//!
//! ## Features
//! - `native` - tokio/hyper HTTP/1.1 accept loop ([`server`])
//! - `tera` - [`Template`] implementation for `tera::Tera`
//!
//! ## Example
//! ```
//! use lu_core::{Context, Cors, Method, Recover, Request, Router};
//!
//! let mut router = Router::new();
//! router.use_middleware(Recover).use_middleware(Cors::permissive());
//! router.get("/ping", |ctx: &mut Context| {
//!     ctx.json(200, vec!["pong"]);
//!     Ok(())
//! });
//!
//! let res = router.serve(Request::new(Method::Get, "/ping"));
//! assert_eq!(res.body_string().as_deref(), Some(r#"["pong"]"#));
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod context;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod pool;
pub mod reply;
pub mod request;
pub mod response;
pub mod router;
pub mod template;

#[cfg(feature = "native")]
pub mod server;

// Re-exports
pub use context::Context;
pub use error::{Error, Result};
pub use request::{Method, Request, RequestBuilder};
pub use response::{Response, ResponseBuilder, StatusCode};
pub use reply::{Format, Payload, Reply};
pub use router::{HandlerFunc, PathHandler, Router};
pub use pool::{ContextPool, PooledContext};
pub use template::{Template, TemplateError};

// Middleware re-exports
pub use middleware::{Cors, CorsConfig, Middleware, MiddlewareChain, Recover};

// Handlers re-exports
pub use handlers::{Mount, MountTarget};

#[cfg(feature = "native")]
pub use server::{from_hyper_parts, serve, to_hyper_response, ServerConfig};
