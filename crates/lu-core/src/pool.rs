//! Reusable request contexts
//!
//! Each dispatch takes a [`Context`] from the pool and hands it back when the
//! guard drops, after clearing every bit of request state. The free list is
//! bounded so a burst of concurrent requests does not pin memory forever.

use crate::context::Context;
use crate::template::Template;
use crate::Request;
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Idle contexts kept around by default
pub const DEFAULT_POOL_CAPACITY: usize = 256;

/// Bounded free list of contexts
#[derive(Debug)]
pub struct ContextPool {
    free: Mutex<Vec<Context>>,
    capacity: usize,
}

impl Default for ContextPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextPool {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_POOL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            capacity,
        }
    }

    /// Take a context bound to `request`, allocating one if the pool is empty
    pub fn acquire(
        &self,
        request: Request,
        template: Option<Arc<dyn Template>>,
    ) -> PooledContext<'_> {
        let mut ctx = self.free.lock().pop().unwrap_or_default();
        ctx.prepare(request, template);
        PooledContext { ctx, pool: self }
    }

    /// Number of idle contexts
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn release(&self, mut ctx: Context) {
        ctx.reset();
        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push(ctx);
        }
    }
}

/// A context on loan from a [`ContextPool`]
pub struct PooledContext<'a> {
    ctx: Context,
    pool: &'a ContextPool,
}

impl Deref for PooledContext<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        &self.ctx
    }
}

impl DerefMut for PooledContext<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }
}

impl Drop for PooledContext<'_> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.ctx));
    }
}
