//! Error types for lu-core

use std::any::Any;
use thiserror::Error;

/// Result type alias for lu operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the lu router
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid HTTP method
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// Failure reported by a handler or middleware
    #[error("{0}")]
    Handler(String),

    /// JSON serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// XML serialization failure
    #[error("XML error: {0}")]
    Xml(String),

    /// Template engine failure
    #[error("Template error: {0}")]
    Template(#[from] crate::template::TemplateError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap any displayable failure as a handler error
    pub fn handler(message: impl std::fmt::Display) -> Self {
        Error::Handler(message.to_string())
    }
}

/// Extract a readable message from a `catch_unwind` payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let payload = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(&*payload), "boom");

        let payload = std::panic::catch_unwind(|| panic!("code {}", 7)).unwrap_err();
        assert_eq!(panic_message(&*payload), "code 7");
    }

    #[test]
    fn test_handler_error_display() {
        assert_eq!(Error::handler("db down").to_string(), "db down");
    }
}
