//! Panic recovery middleware

use super::Middleware;
use crate::context::Context;
use crate::error::panic_message;
use crate::router::HandlerFunc;
use crate::StatusCode;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Turns a panicking handler into a `500` reply carrying the panic message
#[derive(Debug, Clone, Copy, Default)]
pub struct Recover;

impl Recover {
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for Recover {
    fn apply(&self, next: HandlerFunc) -> HandlerFunc {
        Arc::new(move |ctx: &mut Context| {
            match catch_unwind(AssertUnwindSafe(|| next(&mut *ctx))) {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::error!(path = %ctx.path(), panic = %message, "handler panicked");
                    ctx.string(StatusCode::INTERNAL_SERVER_ERROR, message);
                    Ok(())
                }
            }
        })
    }
}
