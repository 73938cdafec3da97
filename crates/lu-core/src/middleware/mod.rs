//! Middleware
//!
//! A middleware turns a handler into a wrapped handler. Chains are folded
//! forward over the registration order, so the last middleware added is the
//! outermost wrapper: it runs first on the way in and last on the way out.

pub mod cors;
pub mod recover;

pub use cors::{Cors, CorsConfig};
pub use recover::Recover;

use crate::router::HandlerFunc;
use std::sync::Arc;

/// Wraps a handler
pub trait Middleware: Send + Sync {
    fn apply(&self, next: HandlerFunc) -> HandlerFunc;
}

impl<F> Middleware for F
where
    F: Fn(HandlerFunc) -> HandlerFunc + Send + Sync,
{
    fn apply(&self, next: HandlerFunc) -> HandlerFunc {
        self(next)
    }
}

/// Ordered middleware list
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<M: Middleware + 'static>(&mut self, middleware: M) {
        self.middlewares.push(Arc::new(middleware));
    }

    /// Append an already shared middleware
    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    pub fn extend<I>(&mut self, middlewares: I)
    where
        I: IntoIterator<Item = Arc<dyn Middleware>>,
    {
        self.middlewares.extend(middlewares);
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Wrap `handler` with every middleware in registration order
    pub fn then(&self, handler: HandlerFunc) -> HandlerFunc {
        self.middlewares
            .iter()
            .fold(handler, |next, middleware| middleware.apply(next))
    }
}

impl std::fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("len", &self.middlewares.len())
            .finish()
    }
}
