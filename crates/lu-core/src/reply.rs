//! Pending response descriptors and their rendering
//!
//! A handler never writes to the wire. It leaves exactly one [`Reply`] on
//! its [`Context`](crate::Context); once the handler chain has returned the
//! dispatcher feeds that reply through [`render`], which copies the pending
//! headers first and then writes status and body.

use crate::handlers::static_files;
use crate::response::TEXT_PLAIN;
use crate::template::Template;
use crate::{Error, Method, Request, Response, StatusCode};
use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

pub(crate) const APPLICATION_JSON: &str = "application/json; charset=utf-8";
pub(crate) const TEXT_XML: &str = "text/xml; charset=utf-8";
pub(crate) const TEXT_HTML: &str = "text/html; charset=utf-8";

/// Data carried by encoded and view replies.
///
/// Implemented for every `Serialize + Debug + Send` type, so handlers pass
/// their own structs straight in.
pub trait Payload: fmt::Debug + Send {
    fn to_json(&self) -> serde_json::Result<Vec<u8>>;

    fn to_xml(&self) -> Result<String, Error>;

    fn to_value(&self) -> serde_json::Result<serde_json::Value>;
}

impl<T> Payload for T
where
    T: Serialize + fmt::Debug + Send,
{
    fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    fn to_xml(&self) -> Result<String, Error> {
        quick_xml::se::to_string(self).map_err(|e| Error::Xml(e.to_string()))
    }

    fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

/// Serialization format of an encoded reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Decided at render time from the `Accept` header
    Auto,
    Json,
    Xml,
    /// `Debug` dump as plain text
    Debug,
}

impl Format {
    /// Pick a concrete format from an `Accept` header value
    pub fn from_accept(accept: &str) -> Format {
        if accept.contains("xml") {
            Format::Xml
        } else if accept.contains("json") || accept.contains("javascript") {
            Format::Json
        } else {
            Format::Debug
        }
    }

    fn resolve(self, req: &Request) -> Format {
        match self {
            Format::Auto => Format::from_accept(req.header("accept").unwrap_or("")),
            other => other,
        }
    }
}

/// The pending response a handler leaves on its context
#[derive(Debug)]
pub enum Reply {
    /// Reason phrase of `status` as a text body
    StatusText { status: StatusCode },
    /// Raw bytes with an explicit content type
    Binary {
        status: StatusCode,
        body: Bytes,
        content_type: String,
        attachment: Option<String>,
    },
    /// Serialized payload
    Encoded {
        status: StatusCode,
        format: Format,
        data: Box<dyn Payload>,
    },
    /// Named template, or negotiated encoding when no template applies
    View {
        status: StatusCode,
        name: String,
        data: Box<dyn Payload>,
    },
    /// File from disk, with an optional fallback tried once when missing
    File {
        path: PathBuf,
        attachment: Option<String>,
        fallback: Option<PathBuf>,
    },
    Redirect { status: StatusCode, to: String },
}

/// Render `reply` on top of `res`, which already carries the pending headers
pub(crate) fn render(
    reply: Reply,
    req: &Request,
    template: Option<&dyn Template>,
    mut res: Response,
) -> Response {
    match reply {
        Reply::StatusText { status } => write(res, status, TEXT_PLAIN, status.reason_phrase()),
        Reply::Binary {
            status,
            body,
            content_type,
            attachment,
        } => {
            if let Some(name) = attachment {
                res.set_header("Content-Disposition", content_disposition(&name));
            }
            write(res, status, &content_type, body)
        }
        Reply::Encoded {
            status,
            format,
            data,
        } => write_encoded(res, status, format.resolve(req), data.as_ref()),
        Reply::View { status, name, data } => match template {
            Some(engine) if !name.is_empty() => write_view(res, status, engine, &name, data.as_ref()),
            _ => write_encoded(res, status, Format::Auto.resolve(req), data.as_ref()),
        },
        Reply::File {
            path,
            attachment,
            fallback,
        } => static_files::serve(res, req, &path, attachment.as_deref(), fallback.as_deref()),
        Reply::Redirect { status, to } => write_redirect(res, req, status, &to),
    }
}

/// Set content type, status and body in one go
pub(crate) fn write(
    mut res: Response,
    status: StatusCode,
    content_type: &str,
    body: impl Into<Bytes>,
) -> Response {
    res.set_header("Content-Type", content_type);
    res.status = status;
    res.body = body.into();
    res
}

/// Plain-text error carrying a diagnostic message
pub(crate) fn fail(res: Response, status: StatusCode, message: impl fmt::Display) -> Response {
    write(res, status, TEXT_PLAIN, message.to_string())
}

pub(crate) fn content_disposition(name: &str) -> String {
    format!("attachment; filename=\"{}\"", name.replace('"', "\\\""))
}

fn encode(data: &dyn Payload, format: Format) -> Result<(Vec<u8>, &'static str), Error> {
    match format {
        Format::Json => Ok((data.to_json()?, APPLICATION_JSON)),
        Format::Xml => Ok((data.to_xml()?.into_bytes(), TEXT_XML)),
        Format::Auto | Format::Debug => Ok((format!("{:?}", data).into_bytes(), TEXT_PLAIN)),
    }
}

fn write_encoded(res: Response, status: StatusCode, format: Format, data: &dyn Payload) -> Response {
    match encode(data, format) {
        Ok((body, content_type)) => write(res, status, content_type, body),
        Err(err) => {
            tracing::warn!(error = %err, ?format, "failed to encode reply");
            fail(res, StatusCode::INTERNAL_SERVER_ERROR, err)
        }
    }
}

fn write_view(
    res: Response,
    status: StatusCode,
    engine: &dyn Template,
    name: &str,
    data: &dyn Payload,
) -> Response {
    let value = match data.to_value() {
        Ok(value) => value,
        Err(err) => return fail(res, StatusCode::INTERNAL_SERVER_ERROR, err),
    };

    let mut body = Vec::new();
    match engine.execute_template(&mut body, name, &value) {
        Ok(()) => write(res, status, TEXT_HTML, body),
        Err(err) => {
            tracing::warn!(error = %err, template = name, "template rendering failed");
            fail(res, StatusCode::INTERNAL_SERVER_ERROR, err)
        }
    }
}

fn write_redirect(mut res: Response, req: &Request, status: StatusCode, to: &str) -> Response {
    res.set_header("Location", to);
    match req.method {
        Method::Get | Method::Head => {
            let body = format!("<a href=\"{}\">{}</a>.\n", escape_html(to), status.reason_phrase());
            write(res, status, TEXT_HTML, body)
        }
        _ => {
            res.status = status;
            res.body = Bytes::new();
            res
        }
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::TemplateError;
    use crate::RequestBuilder;
    use serde::Serialize;
    use std::collections::HashMap;
    use std::io::Write;

    #[derive(Debug, Serialize)]
    struct Point {
        x: i32,
        y: i32,
    }

    fn get(accept: &str) -> Request {
        RequestBuilder::new(Method::Get, "/").header("Accept", accept).build()
    }

    fn encoded(format: Format) -> Reply {
        Reply::Encoded {
            status: StatusCode::OK,
            format,
            data: Box::new(Point { x: 1, y: 2 }),
        }
    }

    #[test]
    fn test_format_from_accept() {
        assert_eq!(Format::from_accept("application/xml"), Format::Xml);
        assert_eq!(Format::from_accept("application/json"), Format::Json);
        assert_eq!(Format::from_accept("text/javascript"), Format::Json);
        assert_eq!(Format::from_accept("text/html"), Format::Debug);
        assert_eq!(Format::from_accept(""), Format::Debug);
    }

    #[test]
    fn test_status_text() {
        let res = render(
            Reply::StatusText { status: StatusCode::METHOD_NOT_ALLOWED },
            &get(""),
            None,
            Response::ok(),
        );
        assert_eq!(res.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(res.body_string().as_deref(), Some("Method Not Allowed"));
    }

    #[test]
    fn test_binary_with_attachment() {
        let reply = Reply::Binary {
            status: StatusCode::CREATED,
            body: Bytes::from_static(b"\x00\x01"),
            content_type: "application/octet-stream".to_string(),
            attachment: Some("data.bin".to_string()),
        };
        let res = render(reply, &get(""), None, Response::ok());

        assert_eq!(res.status, StatusCode::CREATED);
        assert_eq!(&res.body[..], b"\x00\x01");
        assert_eq!(res.content_type(), Some("application/octet-stream"));
        assert_eq!(
            res.header("content-disposition"),
            Some("attachment; filename=\"data.bin\"")
        );
    }

    #[test]
    fn test_pending_headers_survive() {
        let mut pending = Response::ok();
        pending.headers.push(("X-Trace".to_string(), "abc".to_string()));

        let res = render(
            Reply::StatusText { status: StatusCode::OK },
            &get(""),
            None,
            pending,
        );
        assert_eq!(res.header("x-trace"), Some("abc"));
    }

    #[test]
    fn test_encoded_json() {
        let res = render(encoded(Format::Json), &get("text/html"), None, Response::ok());
        assert_eq!(res.content_type(), Some(APPLICATION_JSON));
        assert_eq!(res.body_string().as_deref(), Some(r#"{"x":1,"y":2}"#));
    }

    #[test]
    fn test_encoded_xml() {
        let res = render(encoded(Format::Xml), &get(""), None, Response::ok());
        assert_eq!(res.content_type(), Some(TEXT_XML));
        let body = res.body_string().unwrap();
        assert!(body.contains("<Point>"));
        assert!(body.contains("<x>1</x>"));
    }

    #[test]
    fn test_encoded_auto_negotiation() {
        let res = render(encoded(Format::Auto), &get("application/json"), None, Response::ok());
        assert_eq!(res.content_type(), Some(APPLICATION_JSON));

        let res = render(encoded(Format::Auto), &get("application/xml, */*"), None, Response::ok());
        assert_eq!(res.content_type(), Some(TEXT_XML));

        let res = render(encoded(Format::Auto), &get("text/html"), None, Response::ok());
        assert_eq!(res.content_type(), Some(TEXT_PLAIN));
        assert_eq!(res.body_string().as_deref(), Some("Point { x: 1, y: 2 }"));
    }

    #[test]
    fn test_encoding_failure_is_500() {
        // JSON object keys must be strings
        let mut data = HashMap::new();
        data.insert(vec![1u8], 1);
        let reply = Reply::Encoded {
            status: StatusCode::OK,
            format: Format::Json,
            data: Box::new(data),
        };

        let res = render(reply, &get(""), None, Response::ok());
        assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!res.body.is_empty());
    }

    fn engine() -> impl Template {
        |out: &mut dyn Write, name: &str, data: &serde_json::Value| {
            if name == "broken" {
                return Err(TemplateError::new("unexpected end of template"));
            }
            write!(out, "<p>{}</p>", data["x"]).map_err(TemplateError::new)
        }
    }

    fn view(name: &str) -> Reply {
        Reply::View {
            status: StatusCode::OK,
            name: name.to_string(),
            data: Box::new(Point { x: 5, y: 6 }),
        }
    }

    #[test]
    fn test_view_with_template() {
        let engine = engine();
        let res = render(view("page"), &get(""), Some(&engine), Response::ok());
        assert_eq!(res.content_type(), Some(TEXT_HTML));
        assert_eq!(res.body_string().as_deref(), Some("<p>5</p>"));
    }

    #[test]
    fn test_view_template_error() {
        let engine = engine();
        let res = render(view("broken"), &get(""), Some(&engine), Response::ok());
        assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body_string().as_deref(), Some("unexpected end of template"));
    }

    #[test]
    fn test_view_falls_back_to_negotiation() {
        let res = render(view("page"), &get("application/json"), None, Response::ok());
        assert_eq!(res.content_type(), Some(APPLICATION_JSON));

        let engine = engine();
        let res = render(view(""), &get("application/json"), Some(&engine), Response::ok());
        assert_eq!(res.body_string().as_deref(), Some(r#"{"x":5,"y":6}"#));
    }

    #[test]
    fn test_redirect() {
        let reply = Reply::Redirect {
            status: StatusCode::FOUND,
            to: "/login?next=<home>".to_string(),
        };
        let res = render(reply, &get(""), None, Response::ok());

        assert_eq!(res.status, StatusCode::FOUND);
        assert_eq!(res.header("location"), Some("/login?next=<home>"));
        assert!(res.body_string().unwrap().contains("&lt;home&gt;"));

        let post = RequestBuilder::new(Method::Post, "/").build();
        let reply = Reply::Redirect {
            status: StatusCode::SEE_OTHER,
            to: "/done".to_string(),
        };
        let res = render(reply, &post, None, Response::ok());
        assert_eq!(res.status, StatusCode::SEE_OTHER);
        assert!(res.body.is_empty());
    }
}
