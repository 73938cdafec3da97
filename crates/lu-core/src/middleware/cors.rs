//! CORS (Cross-Origin Resource Sharing) middleware
//!
//! Adds the `Access-Control-Allow-*` headers for allowed origins and answers
//! preflight requests with `204` without running the wrapped handler.

use super::Middleware;
use crate::context::Context;
use crate::router::HandlerFunc;
use crate::{Method, StatusCode};
use glob::{MatchOptions, Pattern};
use smallvec::SmallVec;
use std::sync::Arc;

/// Methods advertised to a preflight when none are configured
static PREFLIGHT_METHODS: [Method; 5] = [
    Method::Get,
    Method::Post,
    Method::Options,
    Method::Put,
    Method::Patch,
];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// CORS configuration
#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Allowed origins: exact values, `*` or glob patterns (empty = all)
    pub origins: SmallVec<[String; 4]>,
    /// Allowed methods (empty = derived from each request)
    pub methods: SmallVec<[Method; 8]>,
    /// Allowed headers
    pub headers: SmallVec<[String; 8]>,
    /// Allow credentials
    pub credentials: bool,
    /// Max age (seconds)
    pub max_age: u32,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origins: SmallVec::new(),
            methods: SmallVec::new(),
            headers: SmallVec::new(),
            credentials: true,
            max_age: 600,
        }
    }
}

impl CorsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.origins.push(origin.into());
        self
    }

    pub fn allow_all_origins(mut self) -> Self {
        self.origins.clear();
        self
    }

    pub fn allow_method(mut self, method: Method) -> Self {
        if !self.methods.contains(&method) {
            self.methods.push(method);
        }
        self
    }

    pub fn allow_header(mut self, header: impl Into<String>) -> Self {
        self.headers.push(header.into());
        self
    }

    pub fn credentials(mut self, allow: bool) -> Self {
        self.credentials = allow;
        self
    }

    pub fn max_age(mut self, seconds: u32) -> Self {
        self.max_age = seconds;
        self
    }
}

/// CORS middleware
#[derive(Debug, Clone)]
pub struct Cors {
    inner: Arc<CorsInner>,
}

#[derive(Debug)]
struct CorsInner {
    config: CorsConfig,
    patterns: Vec<Pattern>,
}

impl Default for Cors {
    fn default() -> Self {
        Self::permissive()
    }
}

impl Cors {
    pub fn new(config: CorsConfig) -> Self {
        let patterns = config
            .origins
            .iter()
            .filter_map(|origin| match Pattern::new(origin) {
                Ok(pattern) => Some(pattern),
                Err(err) => {
                    tracing::warn!(origin = %origin, error = %err, "ignoring invalid CORS origin pattern");
                    None
                }
            })
            .collect();

        Self {
            inner: Arc::new(CorsInner { config, patterns }),
        }
    }

    /// Allow every origin with the default settings
    pub fn permissive() -> Self {
        Self::new(CorsConfig::default())
    }

    pub fn config(&self) -> &CorsConfig {
        &self.inner.config
    }

    fn is_origin_allowed(&self, origin: &str) -> bool {
        let config = &self.inner.config;
        if config.origins.is_empty() {
            return true;
        }
        config.origins.iter().any(|o| o == origin || o == "*")
            || self
                .inner
                .patterns
                .iter()
                .any(|p| p.matches_with(origin, MATCH_OPTIONS))
    }

    /// Configured methods, or the per-request default
    fn methods_string(&self, method: &Method) -> String {
        let configured = &self.inner.config.methods;
        let methods: &[Method] = if !configured.is_empty() {
            configured.as_slice()
        } else if *method == Method::Options {
            &PREFLIGHT_METHODS
        } else {
            std::slice::from_ref(method)
        };

        methods
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn add_cors_headers(&self, ctx: &mut Context, origin: String, method: &Method) {
        let config = &self.inner.config;

        ctx.set_header("Access-Control-Allow-Origin", [origin]);
        ctx.set_header(
            "Access-Control-Allow-Credentials",
            [config.credentials.to_string()],
        );
        ctx.set_header("Access-Control-Allow-Methods", [self.methods_string(method)]);
        if config.headers.is_empty() {
            ctx.remove_header("Access-Control-Allow-Headers");
        } else {
            ctx.set_header("Access-Control-Allow-Headers", [config.headers.join(", ")]);
        }
        ctx.set_header("Access-Control-Max-Age", [config.max_age.to_string()]);
    }

    /// Handle one request; returns `true` when the request was answered here
    fn preflight(&self, ctx: &mut Context) -> bool {
        let origin = match ctx.header("origin") {
            Some(origin) if !origin.is_empty() => origin.to_string(),
            _ => return false,
        };
        if !self.is_origin_allowed(&origin) {
            return false;
        }

        let method = ctx.method().clone();
        self.add_cors_headers(ctx, origin, &method);

        if method == Method::Options {
            ctx.status_text(StatusCode::NO_CONTENT);
            return true;
        }
        false
    }
}

impl Middleware for Cors {
    fn apply(&self, next: HandlerFunc) -> HandlerFunc {
        let cors = self.clone();
        Arc::new(move |ctx: &mut Context| {
            if cors.preflight(ctx) {
                return Ok(());
            }
            next(ctx)
        })
    }
}
