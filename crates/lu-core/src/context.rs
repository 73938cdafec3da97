//! Per-request context
//!
//! A [`Context`] is what every handler and middleware receives. It exposes
//! the inbound request, collects outbound headers and holds the single
//! pending [`Reply`]. Nothing is written anywhere until the dispatcher
//! renders the context after the handler chain returns.
//!
//! Contexts are drawn from a [`ContextPool`](crate::pool::ContextPool) and
//! reset between requests; handlers must not keep references past the call.

use crate::reply::{self, Format, Payload, Reply};
use crate::template::Template;
use crate::{Method, Request, Response, StatusCode};
use crate::response::TEXT_PLAIN;
use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Mutable state of one in-flight request
pub struct Context {
    request: Request,
    headers: Vec<(String, Vec<String>)>,
    reply: Option<Reply>,
    template: Option<Arc<dyn Template>>,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            request: Request::new(Method::Get, String::new()),
            headers: Vec::new(),
            reply: None,
            template: None,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("request", &self.request)
            .field("headers", &self.headers)
            .field("reply", &self.reply)
            .field("template", &self.template.is_some())
            .finish()
    }
}

impl Context {
    /// Bind a fresh request to this context
    pub(crate) fn prepare(&mut self, request: Request, template: Option<Arc<dyn Template>>) {
        self.reset();
        self.request = request;
        self.template = template;
    }

    /// Switch to the template engine of the router now handling the request
    pub(crate) fn set_template(&mut self, template: Arc<dyn Template>) {
        self.template = Some(template);
    }

    /// Drop every trace of the previous request
    pub(crate) fn reset(&mut self) {
        self.request = Request::new(Method::Get, String::new());
        self.headers.clear();
        self.reply = None;
        self.template = None;
    }

    /// Whether the context carries no request state
    pub fn is_clear(&self) -> bool {
        self.request.path.is_empty()
            && self.request.headers.is_empty()
            && self.headers.is_empty()
            && self.reply.is_none()
            && self.template.is_none()
    }

    /// Render the pending reply, consuming pending headers and reply
    pub(crate) fn finish(&mut self) -> Response {
        let mut res = Response::ok();
        for (name, values) in self.headers.drain(..) {
            for value in values {
                res.headers.push((name.clone(), value));
            }
        }

        match self.reply.take() {
            Some(pending) => reply::render(pending, &self.request, self.template.as_deref(), res),
            None => res,
        }
    }

    // ---- Request metadata ------------------------------------------------

    /// The inbound request
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Template engine of the router serving this request
    pub fn template(&self) -> Option<&dyn Template> {
        self.template.as_deref()
    }

    pub fn method(&self) -> &Method {
        &self.request.method
    }

    /// Normalized request path: spaces removed, single leading slash, no
    /// trailing slash. Case is preserved.
    pub fn path(&self) -> String {
        normalize_path(&self.request.path)
    }

    /// Host without port; IPv6 literals are returned without brackets
    pub fn host(&self) -> &str {
        let hostport = self.request.host().unwrap_or("");
        if let Some(rest) = hostport.strip_prefix('[') {
            return match rest.find(']') {
                Some(end) => &rest[..end],
                None => "",
            };
        }
        hostport.split(':').next().unwrap_or("")
    }

    /// Best-effort client address: first `X-Forwarded-For` entry, then
    /// `X-Real-Ip`, then the socket peer
    pub fn real_ip(&self) -> String {
        self.request
            .header("x-forwarded-for")
            .and_then(|h| h.split(',').map(str::trim).find(|s| !s.is_empty()))
            .or_else(|| {
                self.request
                    .header("x-real-ip")
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
            })
            .map(str::to_string)
            .or_else(|| self.request.remote_addr.map(|addr| addr.ip().to_string()))
            .unwrap_or_default()
    }

    /// Inbound header value (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    // ---- Outbound headers ------------------------------------------------

    /// Replace the pending values of an outbound header. An empty list
    /// removes the header.
    pub fn set_header<I, V>(&mut self, name: &str, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        let existing = self
            .headers
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name));

        match (existing, values.is_empty()) {
            (Some(i), true) => {
                self.headers.remove(i);
            }
            (Some(i), false) => self.headers[i].1 = values,
            (None, true) => {}
            (None, false) => self.headers.push((name.to_string(), values)),
        }
    }

    pub fn remove_header(&mut self, name: &str) {
        self.set_header(name, Vec::<String>::new());
    }

    /// Pending values of an outbound header
    pub fn response_header(&self, name: &str) -> Option<&[String]> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }

    // ---- Replies ---------------------------------------------------------

    /// The pending reply, if a handler has set one
    pub fn reply(&self) -> Option<&Reply> {
        self.reply.as_ref()
    }

    /// Replace the pending reply
    pub fn set_reply(&mut self, reply: Reply) {
        self.reply = Some(reply);
    }

    /// Reason phrase of `status` as plain text
    pub fn status_text(&mut self, status: impl Into<StatusCode>) {
        self.set_reply(Reply::StatusText {
            status: status.into(),
        });
    }

    /// Plain-text body
    pub fn string(&mut self, status: impl Into<StatusCode>, content: impl Into<String>) {
        let content: String = content.into();
        self.blob(status, content, TEXT_PLAIN, "");
    }

    /// Raw bytes with an explicit content type. A non-empty `name` marks the
    /// body as a download with that file name.
    pub fn blob(
        &mut self,
        status: impl Into<StatusCode>,
        data: impl Into<Bytes>,
        content_type: &str,
        name: &str,
    ) {
        self.set_reply(Reply::Binary {
            status: status.into(),
            body: data.into(),
            content_type: content_type.to_string(),
            attachment: non_empty(name),
        });
    }

    /// Payload encoded as XML, JSON or a debug dump depending on `Accept`
    pub fn auto_encode<T>(&mut self, status: impl Into<StatusCode>, data: T)
    where
        T: Serialize + fmt::Debug + Send + 'static,
    {
        self.encode(status.into(), Format::Auto, Box::new(data));
    }

    pub fn json<T>(&mut self, status: impl Into<StatusCode>, data: T)
    where
        T: Serialize + fmt::Debug + Send + 'static,
    {
        self.encode(status.into(), Format::Json, Box::new(data));
    }

    pub fn xml<T>(&mut self, status: impl Into<StatusCode>, data: T)
    where
        T: Serialize + fmt::Debug + Send + 'static,
    {
        self.encode(status.into(), Format::Xml, Box::new(data));
    }

    fn encode(&mut self, status: StatusCode, format: Format, data: Box<dyn Payload>) {
        self.set_reply(Reply::Encoded {
            status,
            format,
            data,
        });
    }

    /// Named template rendered with `data`; without a template engine or
    /// with an empty name the data is content-negotiated like
    /// [`auto_encode`](Self::auto_encode)
    pub fn view<T>(&mut self, status: impl Into<StatusCode>, name: &str, data: T)
    where
        T: Serialize + fmt::Debug + Send + 'static,
    {
        self.set_reply(Reply::View {
            status: status.into(),
            name: name.to_string(),
            data: Box::new(data),
        });
    }

    /// File from disk. A non-empty `name` is used for the content type and
    /// as the download file name.
    pub fn file(&mut self, path: impl Into<PathBuf>, name: &str) {
        self.set_reply(Reply::File {
            path: path.into(),
            attachment: non_empty(name),
            fallback: None,
        });
    }

    pub fn redirect(&mut self, status: impl Into<StatusCode>, to: impl Into<String>) {
        self.set_reply(Reply::Redirect {
            status: status.into(),
            to: to.into(),
        });
    }
}

fn non_empty(name: &str) -> Option<String> {
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Strip spaces and surrounding slashes, then prefix a single `/`
pub fn normalize_path(path: &str) -> String {
    let stripped = path.replace(' ', "");
    format!("/{}", stripped.trim_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RequestBuilder;
    use std::net::SocketAddr;

    fn context(request: Request) -> Context {
        let mut ctx = Context::default();
        ctx.prepare(request, None);
        ctx
    }

    fn with_host(host: &str) -> Context {
        context(RequestBuilder::new(Method::Get, "/").header("Host", host).build())
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("//a/b//"), "/a/b");
        assert_eq!(normalize_path(" /Users / List "), "/Users/List");
    }

    #[test]
    fn test_path_keeps_case() {
        let ctx = context(RequestBuilder::new(Method::Get, "/Docs/Intro/").build());
        assert_eq!(ctx.path(), "/Docs/Intro");
    }

    #[test]
    fn test_host() {
        assert_eq!(with_host("example.com:8080").host(), "example.com");
        assert_eq!(with_host("example.com").host(), "example.com");
        assert_eq!(with_host("[::1]:8080").host(), "::1");
        assert_eq!(with_host("[fe80::1]").host(), "fe80::1");
        assert_eq!(with_host("[broken").host(), "");
        assert_eq!(context(RequestBuilder::new(Method::Get, "/").build()).host(), "");
    }

    #[test]
    fn test_real_ip() {
        let peer: SocketAddr = "192.168.1.9:40000".parse().unwrap();

        let ctx = context(
            RequestBuilder::new(Method::Get, "/")
                .header("X-Forwarded-For", " 203.0.113.7, 10.0.0.1")
                .header("X-Real-Ip", "198.51.100.2")
                .remote_addr(peer)
                .build(),
        );
        assert_eq!(ctx.real_ip(), "203.0.113.7");

        let ctx = context(
            RequestBuilder::new(Method::Get, "/")
                .header("X-Real-Ip", "198.51.100.2")
                .remote_addr(peer)
                .build(),
        );
        assert_eq!(ctx.real_ip(), "198.51.100.2");

        let ctx = context(RequestBuilder::new(Method::Get, "/").remote_addr(peer).build());
        assert_eq!(ctx.real_ip(), "192.168.1.9");

        let ctx = context(RequestBuilder::new(Method::Get, "/").build());
        assert_eq!(ctx.real_ip(), "");
    }

    #[test]
    fn test_set_header() {
        let mut ctx = Context::default();
        ctx.set_header("X-Tags", ["a", "b"]);
        assert_eq!(
            ctx.response_header("x-tags"),
            Some(&["a".to_string(), "b".to_string()][..])
        );

        ctx.set_header("x-TAGS", ["c"]);
        assert_eq!(ctx.response_header("X-Tags"), Some(&["c".to_string()][..]));

        ctx.remove_header("X-Tags");
        assert!(ctx.response_header("X-Tags").is_none());

        // removing something absent is a no-op
        ctx.set_header("X-None", Vec::<String>::new());
        assert!(ctx.response_header("X-None").is_none());
    }

    #[test]
    fn test_last_reply_wins() {
        let mut ctx = Context::default();
        ctx.string(200, "first");
        ctx.status_text(404);

        assert!(matches!(
            ctx.reply(),
            Some(Reply::StatusText { status }) if *status == StatusCode::NOT_FOUND
        ));
    }

    #[test]
    fn test_finish_writes_headers_then_reply() {
        let mut ctx = context(RequestBuilder::new(Method::Get, "/").build());
        ctx.set_header("Vary", ["Origin", "Accept"]);
        ctx.string(201, "made");

        let res = ctx.finish();
        assert_eq!(res.status, StatusCode::CREATED);
        assert_eq!(res.header_values("vary"), vec!["Origin", "Accept"]);
        assert_eq!(res.body_string().as_deref(), Some("made"));
        assert!(ctx.reply().is_none());
        assert!(ctx.response_header("vary").is_none());
    }

    #[test]
    fn test_finish_without_reply() {
        let mut ctx = context(RequestBuilder::new(Method::Get, "/").build());
        ctx.set_header("X-Only", ["header"]);

        let res = ctx.finish();
        assert_eq!(res.status, StatusCode::OK);
        assert!(res.body.is_empty());
        assert_eq!(res.header("x-only"), Some("header"));
    }

    #[test]
    fn test_file_name_is_optional() {
        let mut ctx = Context::default();
        ctx.file("/tmp/a.txt", "");
        assert!(matches!(ctx.reply(), Some(Reply::File { attachment: None, .. })));

        ctx.file("/tmp/a.txt", "b.txt");
        assert!(matches!(
            ctx.reply(),
            Some(Reply::File { attachment: Some(name), .. }) if name == "b.txt"
        ));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut ctx = context(
            RequestBuilder::new(Method::Post, "/x")
                .header("Accept", "application/json")
                .build(),
        );
        ctx.set_header("X-A", ["1"]);
        ctx.json(200, vec![1, 2, 3]);
        assert!(!ctx.is_clear());

        ctx.reset();
        assert!(ctx.is_clear());
    }
}
