//! Template engine contract
//!
//! The router never parses templates itself. It hands a template name and
//! the reply data (as a JSON value) to whatever engine was registered with
//! [`Router::set_template`](crate::Router::set_template) and forwards any
//! failure as a `500`.
//!
//! Closures with the right shape implement [`Template`], and with the `tera`
//! feature enabled so does `tera::Tera`.

use std::io::Write;
use thiserror::Error;

/// Failure reported by a template engine
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TemplateError(String);

impl TemplateError {
    pub fn new(message: impl std::fmt::Display) -> Self {
        Self(message.to_string())
    }
}

/// Render a named template with `data` into `out`
pub trait Template: Send + Sync {
    fn execute_template(
        &self,
        out: &mut dyn Write,
        name: &str,
        data: &serde_json::Value,
    ) -> Result<(), TemplateError>;
}

impl<F> Template for F
where
    F: Fn(&mut dyn Write, &str, &serde_json::Value) -> Result<(), TemplateError> + Send + Sync,
{
    fn execute_template(
        &self,
        out: &mut dyn Write,
        name: &str,
        data: &serde_json::Value,
    ) -> Result<(), TemplateError> {
        self(out, name, data)
    }
}

#[cfg(feature = "tera")]
impl Template for tera::Tera {
    fn execute_template(
        &self,
        out: &mut dyn Write,
        name: &str,
        data: &serde_json::Value,
    ) -> Result<(), TemplateError> {
        let context = tera::Context::from_value(data.clone()).map_err(TemplateError::new)?;
        self.render_to(name, &context, out).map_err(TemplateError::new)
    }
}
