//! Filesystem-backed handler for a rendered preview.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{
        HeaderValue, Request, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, LOCATION},
    },
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use percent_encoding::percent_decode_str;
use tracing::error;

use crate::application::{error::HttpError, repos::SiteHandler};

const SOURCE: &str = "infra::static_site";
const INDEX_FILE: &str = "index.html";

#[derive(Debug, Clone)]
pub struct StaticSite {
    root: PathBuf,
}

impl StaticSite {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a request path onto a file below the root. Segments are
    /// percent-decoded before they are checked, so an encoded separator or
    /// parent reference is rejected like a literal one. Directory paths
    /// resolve to their index file.
    fn resolve(&self, request_path: &str) -> Option<PathBuf> {
        let mut resolved = self.root.clone();
        for segment in request_path.split('/') {
            let segment = percent_decode_str(segment).decode_utf8().ok()?;
            match &*segment {
                "" | "." => {}
                ".." => return None,
                name if name.contains(['/', '\\', '\0']) => return None,
                name => resolved.push(name),
            }
        }

        if request_path.is_empty() || request_path.ends_with('/') {
            resolved.push(INDEX_FILE);
        }

        Some(resolved)
    }

    async fn serve_path(&self, request_path: &str) -> Response {
        let Some(path) = self.resolve(request_path) else {
            return not_found();
        };

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => return redirect_to_directory(request_path),
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => return not_found(),
            Err(err) => return read_failure(&path, err),
        }

        match tokio::fs::read(&path).await {
            Ok(contents) => file_response(&path, Bytes::from(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => not_found(),
            Err(err) => read_failure(&path, err),
        }
    }
}

#[async_trait]
impl SiteHandler for StaticSite {
    async fn serve(&self, request: Request<Body>) -> Response {
        self.serve_path(request.uri().path()).await
    }
}

fn file_response(path: &Path, bytes: Bytes) -> Response {
    let length = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&length.to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    response
}

/// Redirect `/a/b` to `b/` relative to the request, which keeps the preview
/// prefix the client sees.
fn redirect_to_directory(request_path: &str) -> Response {
    let last = request_path.rsplit('/').next().unwrap_or_default();
    let mut response = StatusCode::MOVED_PERMANENTLY.into_response();
    if let Ok(value) = HeaderValue::from_str(&format!("{last}/")) {
        response.headers_mut().insert(LOCATION, value);
    }
    response
}

fn not_found() -> Response {
    HttpError::new(SOURCE, StatusCode::NOT_FOUND, "404 page not found").into_response()
}

fn read_failure(path: &Path, err: std::io::Error) -> Response {
    error!(
        target = SOURCE,
        path = %path.display(),
        error = %err,
        "failed to read rendered file"
    );
    HttpError::from_error(
        SOURCE,
        StatusCode::INTERNAL_SERVER_ERROR,
        "Failed to read rendered file",
        &err,
    )
    .into_response()
}
