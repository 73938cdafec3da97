//! Router and dispatcher
//!
//! A [`Router`] keeps three prefix trees keyed by normalized, lower-cased
//! paths:
//!
//! - `handlers`: exact routes, one [`PathHandler`] per path
//! - `groups`: child routers, matched by longest prefix
//! - `assets`: directory mounts, matched by longest prefix
//!
//! Dispatch tries them in that order. Exact routes always win over groups,
//! and a route whose path matches but has no handler for the method answers
//! `405` without falling through.
//!
//! Lookups go segment by segment and skip empty segments, so a request for
//! `/a//b` reaches the route registered as `/a/b`.
//!
//! ## Example
//! ```
//! use lu_core::{Context, Method, Request, Router, StatusCode};
//!
//! let mut router = Router::new();
//! router.get("/hello", |ctx: &mut Context| {
//!     ctx.string(200, "world");
//!     Ok(())
//! });
//! router.group("/api").post("/items", |ctx: &mut Context| {
//!     ctx.status_text(201);
//!     Ok(())
//! });
//!
//! let res = router.serve(Request::new(Method::Get, "/Hello/"));
//! assert_eq!(res.body_string().as_deref(), Some("world"));
//!
//! let res = router.serve(Request::new(Method::Post, "/api/items"));
//! assert_eq!(res.status, StatusCode::CREATED);
//! ```

use crate::context::{normalize_path, Context};
use crate::error::panic_message;
use crate::handlers::{Mount, MountTarget};
use crate::middleware::{Middleware, MiddlewareChain};
use crate::pool::{ContextPool, DEFAULT_POOL_CAPACITY};
use crate::reply::Reply;
use crate::template::Template;
use crate::{Method, Request, Response, Result, StatusCode};
use lu_radix::Tree;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

/// A request handler
pub type HandlerFunc = Arc<dyn Fn(&mut Context) -> Result<()> + Send + Sync>;

/// Handlers registered for one exact path
#[derive(Clone, Default)]
pub struct PathHandler {
    get: Option<HandlerFunc>,
    post: Option<HandlerFunc>,
    any: Option<HandlerFunc>,
}

impl PathHandler {
    fn set(&mut self, method: Option<Method>, handler: HandlerFunc) {
        let slot = match method {
            Some(Method::Get) => &mut self.get,
            Some(Method::Post) => &mut self.post,
            _ => &mut self.any,
        };
        *slot = Some(handler);
    }

    /// Handler for `method`, falling back to the catch-all slot
    pub fn find(&self, method: &Method) -> Option<&HandlerFunc> {
        let specific = match method {
            Method::Get => self.get.as_ref(),
            Method::Post => self.post.as_ref(),
            _ => None,
        };
        specific.or(self.any.as_ref())
    }
}

/// HTTP request router
pub struct Router {
    prefix: String,
    handlers: Tree<PathHandler>,
    groups: Tree<Box<Router>>,
    assets: Tree<Mount>,
    middlewares: MiddlewareChain,
    template: Option<Arc<dyn Template>>,
    pool: ContextPool,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("prefix", &self.prefix)
            .field("routes", &self.handlers.len())
            .field("groups", &self.groups.len())
            .field("assets", &self.assets.len())
            .field("middlewares", &self.middlewares.len())
            .finish()
    }
}

impl Router {
    /// Create a root router
    pub fn new() -> Self {
        Self::with_pool_capacity(DEFAULT_POOL_CAPACITY)
    }

    /// Create a root router keeping at most `capacity` idle contexts
    pub fn with_pool_capacity(capacity: usize) -> Self {
        Self {
            prefix: String::new(),
            handlers: Tree::new(),
            groups: Tree::new(),
            assets: Tree::new(),
            middlewares: MiddlewareChain::new(),
            template: None,
            pool: ContextPool::with_capacity(capacity),
        }
    }

    /// Normalized mount prefix (empty for the root)
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn set_template<T: Template + 'static>(&mut self, template: T) -> &mut Self {
        self.template = Some(Arc::new(template));
        self
    }

    /// Append a middleware. It wraps every route of this router, including
    /// routes registered earlier, but not groups that already exist.
    pub fn use_middleware<M: Middleware + 'static>(&mut self, middleware: M) -> &mut Self {
        self.middlewares.add(middleware);
        self
    }

    /// Create a child scope under `path`
    pub fn group(&mut self, path: &str) -> &mut Router {
        self.group_with(path, Vec::new())
    }

    /// Create a child scope under `path` with extra middleware.
    ///
    /// The child starts from a snapshot of this router's middleware and
    /// template. A group already registered at the same path is replaced.
    pub fn group_with<I>(&mut self, path: &str, middlewares: I) -> &mut Router
    where
        I: IntoIterator<Item = Arc<dyn Middleware>>,
    {
        let prefix = self.sub_path(path);
        let mut chain = self.middlewares.clone();
        chain.extend(middlewares);

        let group = Router {
            prefix: prefix.clone(),
            handlers: Tree::new(),
            groups: Tree::new(),
            assets: Tree::new(),
            middlewares: chain,
            template: self.template.clone(),
            // groups dispatch on the root's contexts
            pool: ContextPool::with_capacity(0),
        };
        tracing::debug!(prefix = %prefix, "group");
        self.groups.insert(&prefix, Box::new(group))
    }

    /// Register `handler` for `method` at `path`. GET and POST have their
    /// own slots; every other method, extension methods included, shares the
    /// catch-all slot.
    pub fn handle<H>(&mut self, method: Method, path: &str, handler: H) -> &mut Self
    where
        H: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.register(Some(method), path, Arc::new(handler))
    }

    pub fn get<H>(&mut self, path: &str, handler: H) -> &mut Self
    where
        H: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.handle(Method::Get, path, handler)
    }

    pub fn post<H>(&mut self, path: &str, handler: H) -> &mut Self
    where
        H: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.handle(Method::Post, path, handler)
    }

    /// Register a handler for every method without a dedicated handler
    pub fn any<H>(&mut self, path: &str, handler: H) -> &mut Self
    where
        H: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.register(None, path, Arc::new(handler))
    }

    fn register(&mut self, method: Option<Method>, path: &str, handler: HandlerFunc) -> &mut Self {
        let path = self.sub_path(path);
        tracing::debug!(
            method = method.as_ref().map(Method::as_str).unwrap_or("ANY"),
            path = %path,
            "handle"
        );
        self.handlers
            .get_or_insert_with(&path, PathHandler::default)
            .set(method, handler);
        self
    }

    /// Serve files under `dir` for requests below `path`
    pub fn assets(&mut self, path: &str, dir: impl Into<PathBuf>) -> &mut Self {
        self.mount(path, Mount::new(dir))
    }

    /// Like [`assets`](Self::assets), answering with `fallback` (relative to
    /// `dir`) when the requested file does not exist
    pub fn assets_with_fallback(
        &mut self,
        path: &str,
        dir: impl Into<PathBuf>,
        fallback: impl Into<PathBuf>,
    ) -> &mut Self {
        self.mount(path, Mount::new(dir).fallback(fallback))
    }

    fn mount(&mut self, path: &str, mount: Mount) -> &mut Self {
        let path = self.sub_path(path);
        tracing::debug!(path = %path, dir = %mount.dir.display(), "static");
        self.assets.insert(&path, mount);
        self
    }

    /// Dispatch one request.
    ///
    /// Never fails: handler errors and panics become a `500` carrying the
    /// failure text, with any pending headers and reply dropped.
    pub fn serve(&self, request: Request) -> Response {
        let mut ctx = self.pool.acquire(request, self.template.clone());

        let outcome = catch_unwind(AssertUnwindSafe(|| -> Result<Response> {
            self.serve_context(&mut ctx)?;
            Ok(ctx.finish())
        }));

        match outcome {
            Ok(Ok(res)) => res,
            Ok(Err(err)) => {
                tracing::warn!(path = %ctx.path(), error = %err, "handler failed");
                Response::internal_error(&err.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(path = %ctx.path(), panic = %message, "handler panicked");
                Response::internal_error(&format!("{}:{} {}", file!(), line!(), message))
            }
        }
    }

    fn serve_context(&self, ctx: &mut Context) -> Result<()> {
        let path = ctx.path();

        if let Some(item) = self.handlers.get(&path) {
            return match item.find(ctx.method()) {
                Some(handler) => self.middlewares.then(handler.clone())(ctx),
                None => {
                    ctx.status_text(StatusCode::METHOD_NOT_ALLOWED);
                    Ok(())
                }
            };
        }

        if let Some((_, group)) = self.groups.prefix(&path) {
            if let Some(template) = &group.template {
                ctx.set_template(template.clone());
            }
            return group.serve_context(ctx);
        }

        if let Some((prefix, mount)) = self.assets.prefix(&path) {
            match mount.resolve(&strip_segments(&path, &prefix)) {
                MountTarget::File(file) => ctx.set_reply(Reply::File {
                    path: file,
                    attachment: None,
                    fallback: mount.fallback_path(),
                }),
                MountTarget::Forbidden => ctx.status_text(StatusCode::FORBIDDEN),
                MountTarget::Invalid => ctx.status_text(StatusCode::NOT_FOUND),
            }
            return Ok(());
        }

        ctx.status_text(StatusCode::NOT_FOUND);
        Ok(())
    }

    /// Index key for `path` registered on this router
    fn sub_path(&self, path: &str) -> String {
        normalize_path(&format!("{}{}", self.prefix, normalize_path(path))).to_lowercase()
    }
}

/// Drop as many leading segments from `path` as `prefix` has, keeping the
/// original case of what remains
fn strip_segments(path: &str, prefix: &str) -> String {
    let depth = prefix.split('/').filter(|s| !s.is_empty()).count();
    path.split('/')
        .filter(|s| !s.is_empty())
        .skip(depth)
        .collect::<Vec<_>>()
        .join("/")
}
