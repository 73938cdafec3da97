//! HTTP Request types

use crate::{Error, Result};
use smallvec::SmallVec;
use std::net::SocketAddr;
use std::str::FromStr;

/// HTTP Methods
///
/// Any other valid method token parses to [`Method::Other`], which routes
/// through the catch-all handler slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    Connect,
    Trace,
    /// Extension method such as `PURGE`, stored as received
    Other(String),
}

impl Method {
    /// Convert to string
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Connect => "CONNECT",
            Method::Trace => "TRACE",
            Method::Other(name) => name,
        }
    }
}

impl FromStr for Method {
    type Err = Error;

    /// Parse from string. Standard methods match case-insensitively; any
    /// other token becomes [`Method::Other`].
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "PATCH" => Ok(Method::Patch),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            "CONNECT" => Ok(Method::Connect),
            "TRACE" => Ok(Method::Trace),
            _ if is_token(s) => Ok(Method::Other(s.to_string())),
            _ => Err(Error::InvalidMethod(s.to_string())),
        }
    }
}

/// RFC 9110 token: one or more visible ASCII characters other than delimiters
fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// HTTP Request as handed over by the transport
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Raw request path (without query string)
    pub path: String,
    /// Query string (without leading ?)
    pub query: Option<String>,
    /// Request headers (stack-allocated for small header counts)
    pub headers: SmallVec<[(String, String); 16]>,
    /// Request body
    pub body: bytes::Bytes,
    /// Socket peer address, when the transport knows it
    pub remote_addr: Option<SocketAddr>,
}

impl Request {
    /// Create a new request
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: SmallVec::new(),
            body: bytes::Bytes::new(),
            remote_addr: None,
        }
    }

    /// Get a header value (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Get the `Host` header
    pub fn host(&self) -> Option<&str> {
        self.header("host")
    }
}

/// Builder for constructing requests
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    /// Create a new builder
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            request: Request::new(method, path),
        }
    }

    /// Set query string
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.request.query = Some(query.into());
        self
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.headers.push((name.into(), value.into()));
        self
    }

    /// Set body
    pub fn body(mut self, body: impl Into<bytes::Bytes>) -> Self {
        self.request.body = body.into();
        self
    }

    /// Set the socket peer address
    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.request.remote_addr = Some(addr);
        self
    }

    /// Build the request
    pub fn build(self) -> Request {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse() {
        assert_eq!("GET".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("post".parse::<Method>().unwrap(), Method::Post);
        assert!("".parse::<Method>().is_err());
        assert!("GET /".parse::<Method>().is_err());
    }

    #[test]
    fn test_extension_method() {
        let method: Method = "PURGE".parse().unwrap();
        assert_eq!(method, Method::Other("PURGE".to_string()));
        assert_eq!(method.as_str(), "PURGE");
        assert_eq!(method.to_string(), "PURGE");

        // extension methods are case-sensitive
        assert_eq!(
            "purge".parse::<Method>().unwrap(),
            Method::Other("purge".to_string())
        );
    }

    #[test]
    fn test_request_header() {
        let req = RequestBuilder::new(Method::Get, "/")
            .header("Content-Type", "application/json")
            .build();

        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.header("CONTENT-TYPE"), Some("application/json"));
        assert_eq!(req.header("accept"), None);
    }

    #[test]
    fn test_request_builder() {
        let addr: SocketAddr = "10.0.0.1:5000".parse().unwrap();
        let req = RequestBuilder::new(Method::Post, "/upload")
            .query("a=1")
            .header("Host", "example.com")
            .body("payload")
            .remote_addr(addr)
            .build();

        assert_eq!(req.query.as_deref(), Some("a=1"));
        assert_eq!(req.host(), Some("example.com"));
        assert_eq!(&req.body[..], b"payload");
        assert_eq!(req.remote_addr, Some(addr));
    }
}
