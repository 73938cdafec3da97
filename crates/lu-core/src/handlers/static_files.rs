//! Static file serving
//!
//! Resolves mount sub-paths to files on disk and renders file replies with
//! conditional-request support (ETag / If-Modified-Since).

use crate::reply::{content_disposition, fail, write};
use crate::{Method, Request, Response, StatusCode};
use std::fs::Metadata;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// File served when a request resolves to a directory
pub const INDEX_FILE: &str = "index.html";

/// A directory bound to a path prefix
#[derive(Debug, Clone)]
pub struct Mount {
    /// Root directory
    pub dir: PathBuf,
    /// File (relative to `dir`) served once when the resolved file is missing
    pub fallback: Option<PathBuf>,
}

/// Outcome of a mount lookup for a request sub-path
#[derive(Debug, PartialEq)]
pub enum MountTarget {
    File(PathBuf),
    /// Some segment names a hidden or private entry
    Forbidden,
    /// The sub-path escapes the mount
    Invalid,
}

impl Mount {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            fallback: None,
        }
    }

    pub fn fallback(mut self, file: impl Into<PathBuf>) -> Self {
        self.fallback = Some(file.into());
        self
    }

    /// Map the part of a request path below the mount prefix onto disk
    pub fn resolve(&self, rest: &str) -> MountTarget {
        match sanitize_path(rest) {
            None => MountTarget::Invalid,
            Some(path) if path.iter().any(|c| c.to_str().map_or(false, is_private_name)) => {
                MountTarget::Forbidden
            }
            Some(path) => MountTarget::File(self.dir.join(path)),
        }
    }

    /// Absolute location of the fallback file, if one is configured
    pub fn fallback_path(&self) -> Option<PathBuf> {
        self.fallback.as_ref().map(|f| self.dir.join(f))
    }
}

/// Sanitize request path to prevent directory traversal
fn sanitize_path(path: &str) -> Option<PathBuf> {
    let path = path.trim_start_matches('/');

    let mut result = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(c) => result.push(c),
            Component::ParentDir => return None, // Prevent ../
            _ => {}
        }
    }

    Some(result)
}

/// Names starting with `.` or `_` are never served
fn is_private_name(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('_')
}

fn is_private(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(is_private_name)
        .unwrap_or(false)
}

enum Resolved {
    File(PathBuf, Metadata),
    NotFound,
    Forbidden(String),
    Failed(String),
}

impl From<io::Error> for Resolved {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Resolved::NotFound,
            io::ErrorKind::PermissionDenied => Resolved::Forbidden(err.to_string()),
            _ => Resolved::Failed(err.to_string()),
        }
    }
}

/// Stat `path`, stepping into `index.html` for directories
fn resolve(path: &Path) -> Resolved {
    if is_private(path) {
        return Resolved::Forbidden(StatusCode::FORBIDDEN.reason_phrase().to_string());
    }

    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => {
            let index = path.join(INDEX_FILE);
            match std::fs::metadata(&index) {
                Ok(meta) if meta.is_file() => Resolved::File(index, meta),
                Ok(_) => Resolved::NotFound,
                Err(err) => err.into(),
            }
        }
        Ok(meta) => Resolved::File(path.to_path_buf(), meta),
        Err(err) => err.into(),
    }
}

/// Render a file reply.
///
/// The primary path is resolved first; only when it is missing and a
/// fallback is given is the fallback resolved, and its outcome is final.
pub(crate) fn serve(
    res: Response,
    req: &Request,
    path: &Path,
    attachment: Option<&str>,
    fallback: Option<&Path>,
) -> Response {
    let resolved = match (resolve(path), fallback) {
        (Resolved::NotFound, Some(fallback)) => resolve(fallback),
        (resolved, _) => resolved,
    };

    match resolved {
        Resolved::File(path, meta) => send(res, req, &path, &meta, attachment),
        other => reject(res, path, other),
    }
}

fn reject(res: Response, path: &Path, resolved: Resolved) -> Response {
    match resolved {
        Resolved::Forbidden(message) => fail(res, StatusCode::FORBIDDEN, message),
        Resolved::Failed(message) => {
            tracing::warn!(path = %path.display(), error = %message, "failed to read file");
            fail(res, StatusCode::INTERNAL_SERVER_ERROR, message)
        }
        Resolved::NotFound | Resolved::File(..) => {
            fail(res, StatusCode::NOT_FOUND, StatusCode::NOT_FOUND.reason_phrase())
        }
    }
}

fn send(
    mut res: Response,
    req: &Request,
    path: &Path,
    meta: &Metadata,
    attachment: Option<&str>,
) -> Response {
    let etag = generate_etag(meta);
    let modified = meta.modified().ok();

    res.set_header("ETag", etag.as_str());
    if let Some(modified) = modified {
        res.set_header("Last-Modified", httpdate::fmt_http_date(modified));
    }

    let conditional = matches!(req.method, Method::Get | Method::Head);
    if conditional && not_modified(req, &etag, modified) {
        res.status = StatusCode::NOT_MODIFIED;
        return res;
    }

    let content = match std::fs::read(path) {
        Ok(content) => content,
        Err(err) => return reject(res, path, err.into()),
    };

    let name = attachment.map(Path::new).unwrap_or(path);
    if let Some(name) = attachment {
        res.set_header("Content-Disposition", content_disposition(name));
    }

    let body = if req.method == Method::Head {
        Vec::new()
    } else {
        content
    };
    write(res, StatusCode::OK, &mime_type(name), body)
}

/// Whether the client's cached copy is still current
fn not_modified(req: &Request, etag: &str, modified: Option<SystemTime>) -> bool {
    if let Some(if_none_match) = req.header("if-none-match") {
        return if_none_match == "*"
            || if_none_match
                .split(',')
                .map(|tag| tag.trim().trim_start_matches("W/"))
                .any(|tag| tag == etag);
    }

    let since = req
        .header("if-modified-since")
        .and_then(|v| httpdate::parse_http_date(v).ok());
    match (since, modified) {
        (Some(since), Some(modified)) => unix_secs(modified) <= unix_secs(since),
        _ => false,
    }
}

fn unix_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn generate_etag(meta: &Metadata) -> String {
    let mtime = meta.modified().ok().map(unix_secs).unwrap_or(0);
    let size = meta.len();
    format!("\"{:x}-{:x}\"", mtime, size)
}

fn mime_type(path: &Path) -> String {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if mime.type_() == mime_guess::mime::TEXT {
        format!("{}; charset=utf-8", mime.essence_str())
    } else {
        mime.essence_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RequestBuilder;
    use std::fs;

    fn get() -> Request {
        RequestBuilder::new(Method::Get, "/").build()
    }

    fn tempdir() -> tempfile::TempDir {
        tempfile::Builder::new().prefix("lu").tempdir().unwrap()
    }

    fn serve_path(req: &Request, path: &Path, fallback: Option<&Path>) -> Response {
        serve(Response::ok(), req, path, None, fallback)
    }

    #[test]
    fn test_sanitize_path() {
        assert!(sanitize_path("/index.html").is_some());
        assert!(sanitize_path("/css/style.css").is_some());
        assert!(sanitize_path("/../etc/passwd").is_none());
        assert!(sanitize_path("a/../../b").is_none());
    }

    #[test]
    fn test_mount_resolve() {
        let mount = Mount::new("/srv/www");

        assert_eq!(
            mount.resolve("css/site.css"),
            MountTarget::File(PathBuf::from("/srv/www/css/site.css"))
        );
        assert_eq!(mount.resolve(""), MountTarget::File(PathBuf::from("/srv/www")));
        assert_eq!(mount.resolve(".env"), MountTarget::Forbidden);
        assert_eq!(mount.resolve(".git/config"), MountTarget::Forbidden);
        assert_eq!(mount.resolve("_drafts/post.md"), MountTarget::Forbidden);
        assert_eq!(mount.resolve("../secret"), MountTarget::Invalid);
    }

    #[test]
    fn test_mime_type() {
        assert_eq!(mime_type(Path::new("index.html")), "text/html; charset=utf-8");
        assert_eq!(mime_type(Path::new("style.css")), "text/css; charset=utf-8");
        assert_eq!(mime_type(Path::new("image.png")), "image/png");
        assert_eq!(mime_type(Path::new("unknown")), "application/octet-stream");
    }

    #[test]
    fn test_serve_file() {
        let dir = tempdir();
        let file = dir.path().join("hello.txt");
        fs::write(&file, "hello").unwrap();

        let res = serve_path(&get(), &file, None);
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body_string().as_deref(), Some("hello"));
        assert_eq!(res.content_type(), Some("text/plain; charset=utf-8"));
        assert!(res.header("etag").is_some());
        assert!(res.header("last-modified").is_some());
        assert!(res.header("content-disposition").is_none());
    }

    #[test]
    fn test_attachment_name_drives_type_and_disposition() {
        let dir = tempdir();
        let file = dir.path().join("blob");
        fs::write(&file, "{}").unwrap();

        let res = serve(Response::ok(), &get(), &file, Some("report.json"), None);
        assert_eq!(res.content_type(), Some("application/json"));
        assert_eq!(
            res.header("content-disposition"),
            Some("attachment; filename=\"report.json\"")
        );
    }

    #[test]
    fn test_private_names_forbidden() {
        let dir = tempdir();
        let hidden = dir.path().join(".env");
        fs::write(&hidden, "SECRET=1").unwrap();

        assert_eq!(serve_path(&get(), &hidden, None).status, StatusCode::FORBIDDEN);
        assert_eq!(
            serve_path(&get(), &dir.path().join("_missing"), None).status,
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir();
        let res = serve_path(&get(), &dir.path().join("nope.txt"), None);
        assert_eq!(res.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_fallback_served_once() {
        let dir = tempdir();
        let app = dir.path().join("app.html");
        fs::write(&app, "spa").unwrap();

        let res = serve_path(&get(), &dir.path().join("deep/link"), Some(&app));
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body_string().as_deref(), Some("spa"));

        let res = serve_path(
            &get(),
            &dir.path().join("deep/link"),
            Some(&dir.path().join("gone.html")),
        );
        assert_eq!(res.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_directory_index() {
        let dir = tempdir();
        let res = serve_path(&get(), dir.path(), None);
        assert_eq!(res.status, StatusCode::NOT_FOUND);

        fs::write(dir.path().join(INDEX_FILE), "<h1>home</h1>").unwrap();
        let res = serve_path(&get(), dir.path(), None);
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body_string().as_deref(), Some("<h1>home</h1>"));
        assert_eq!(res.content_type(), Some("text/html; charset=utf-8"));
    }

    #[test]
    fn test_if_none_match() {
        let dir = tempdir();
        let file = dir.path().join("a.css");
        fs::write(&file, "body{}").unwrap();

        let first = serve_path(&get(), &file, None);
        let etag = first.header("etag").unwrap().to_string();

        let req = RequestBuilder::new(Method::Get, "/")
            .header("If-None-Match", etag.as_str())
            .build();
        let res = serve_path(&req, &file, None);
        assert_eq!(res.status, StatusCode::NOT_MODIFIED);
        assert!(res.body.is_empty());

        let req = RequestBuilder::new(Method::Get, "/")
            .header("If-None-Match", "\"other\"")
            .build();
        assert_eq!(serve_path(&req, &file, None).status, StatusCode::OK);
    }

    #[test]
    fn test_if_modified_since() {
        let dir = tempdir();
        let file = dir.path().join("a.js");
        fs::write(&file, "1").unwrap();

        let later = SystemTime::now() + std::time::Duration::from_secs(3600);
        let req = RequestBuilder::new(Method::Get, "/")
            .header("If-Modified-Since", httpdate::fmt_http_date(later))
            .build();
        assert_eq!(serve_path(&req, &file, None).status, StatusCode::NOT_MODIFIED);

        let req = RequestBuilder::new(Method::Get, "/")
            .header("If-Modified-Since", httpdate::fmt_http_date(UNIX_EPOCH))
            .build();
        assert_eq!(serve_path(&req, &file, None).status, StatusCode::OK);
    }

    #[test]
    fn test_head_has_no_body() {
        let dir = tempdir();
        let file = dir.path().join("a.txt");
        fs::write(&file, "content").unwrap();

        let req = RequestBuilder::new(Method::Head, "/").build();
        let res = serve_path(&req, &file, None);
        assert_eq!(res.status, StatusCode::OK);
        assert!(res.body.is_empty());
        assert_eq!(res.content_type(), Some("text/plain; charset=utf-8"));
    }
}
