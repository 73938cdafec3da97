//! Native HTTP/1.1 transport
//!
//! A small tokio + hyper accept loop that feeds requests into a shared
//! [`Router`]. Dispatch is synchronous, so every request runs on tokio's
//! blocking pool and connection tasks stay responsive.

use crate::{Method, Request, Response, Result, Router, StatusCode};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use percent_encoding::percent_decode_str;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub hostname: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            hostname: "0.0.0.0".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }
}

/// Bind to the configured address and serve `router` until the task is
/// dropped
pub async fn serve(config: ServerConfig, router: Arc<Router>) -> Result<()> {
    let listener = TcpListener::bind((config.hostname.as_str(), config.port)).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    serve_listener(listener, router).await
}

/// Serve `router` on an already bound listener
pub async fn serve_listener(listener: TcpListener, router: Arc<Router>) -> Result<()> {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(err) => {
                tracing::warn!(error = %err, "accept failed");
                continue;
            }
        };
        tracing::debug!(%peer, "accepted connection");

        let router = router.clone();
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(move |req| {
                let router = router.clone();
                async move { Ok::<_, Infallible>(handle(router, req, peer).await) }
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                tracing::debug!(%peer, error = %err, "connection closed with error");
            }
        });
    }
}

async fn handle(
    router: Arc<Router>,
    req: hyper::Request<Incoming>,
    peer: SocketAddr,
) -> hyper::Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            return to_hyper_response(Response::text(StatusCode::BAD_REQUEST, err.to_string()))
        }
    };

    let request = match from_hyper_parts(&parts, body, Some(peer)) {
        Ok(request) => request,
        Err(err) => {
            return to_hyper_response(Response::text(StatusCode::NOT_IMPLEMENTED, err.to_string()))
        }
    };

    let response = match tokio::task::spawn_blocking(move || router.serve(request)).await {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(error = %err, "dispatch task failed");
            Response::internal_error(&err.to_string())
        }
    };
    to_hyper_response(response)
}

/// Convert hyper request parts into a [`Request`].
///
/// The path is percent-decoded (invalid UTF-8 is replaced) before routing.
/// Extension methods map to [`Method::Other`]; header values that are not
/// valid UTF-8 are skipped.
pub fn from_hyper_parts(
    parts: &http::request::Parts,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
) -> Result<Request> {
    let method: Method = parts.method.as_str().parse()?;

    let path = percent_decode_str(parts.uri.path()).decode_utf8_lossy();

    let mut request = Request::new(method, path);
    request.query = parts.uri.query().map(str::to_string);
    request.body = body;
    request.remote_addr = remote_addr;

    for (name, value) in &parts.headers {
        if let Ok(v) = value.to_str() {
            request.headers.push((name.to_string(), v.to_string()));
        }
    }
    // HTTP/1.1 clients always send Host, but absolute-form URIs carry it in
    // the request line
    if request.host().is_none() {
        if let Some(authority) = parts.uri.authority() {
            request
                .headers
                .push(("host".to_string(), authority.as_str().to_string()));
        }
    }

    Ok(request)
}

/// Convert a [`Response`] into a hyper response
pub fn to_hyper_response(res: Response) -> hyper::Response<Full<Bytes>> {
    let mut builder = hyper::Response::builder().status(res.status.as_u16());
    for (name, value) in &res.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    match builder.body(Full::new(res.body)) {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(error = %err, "invalid response head");
            let mut fallback = hyper::Response::new(Full::new(Bytes::from(err.to_string())));
            *fallback.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        }
    }
}
