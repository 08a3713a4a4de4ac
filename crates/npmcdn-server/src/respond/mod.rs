//! Turning pipeline outcomes into HTTP responses

use std::fs::Metadata;
use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

use bytes::Bytes;
use futures::TryStreamExt;
use http_body_util::{combinators::UnsyncBoxBody, BodyExt, Full, StreamBody};
use hyper::body::Frame;
use hyper::header::{ALLOW, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, ETAG, LOCATION};
use hyper::{Response, StatusCode};
use tokio_util::io::ReaderStream;

use npmcdn_core::error::CdnError;
use npmcdn_core::utils::get_content_type;

use crate::orchestrator::Outcome;

pub type ResponseBody = UnsyncBoxBody<Bytes, io::Error>;

fn full(body: impl Into<Bytes>) -> ResponseBody {
    Full::new(body.into()).map_err(|never| match never {}).boxed_unsync()
}

fn cache_control(max_age: u64) -> String {
    format!("public, max-age={}", max_age)
}

/// Response used when a proper one cannot be built
fn fallback(message: &str) -> Response<ResponseBody> {
    let mut response = Response::new(full(format!("Server error: {}", message)));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, hyper::header::HeaderValue::from_static("text/plain"));
    response
}

pub fn text(status: u16, body: String) -> Response<ResponseBody> {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain")
        .body(full(body))
        .unwrap_or_else(|e| fallback(&e.to_string()))
}

pub fn error(error: &CdnError) -> Response<ResponseBody> {
    let body = if error.is_server_error() {
        format!("Server error: {}", error)
    } else {
        error.to_string()
    };
    text(error.status_code(), body)
}

pub fn redirect(location: &str, max_age: u64) -> Response<ResponseBody> {
    let html = format!(
        "<p>You are being redirected to <a href=\"{0}\">{0}</a>",
        crate::index::escape_html(location)
    );

    Response::builder()
        .status(StatusCode::FOUND)
        .header(CONTENT_TYPE, "text/html")
        .header(CACHE_CONTROL, cache_control(max_age))
        .header(LOCATION, location.as_bytes())
        .body(full(html))
        .unwrap_or_else(|e| fallback(&e.to_string()))
}

pub fn json(body: &impl serde::Serialize, max_age: u64) -> Response<ResponseBody> {
    match serde_json::to_vec(body) {
        Ok(json) => Response::builder()
            .header(CONTENT_TYPE, "application/json")
            .header(CACHE_CONTROL, cache_control(max_age))
            .body(full(json))
            .unwrap_or_else(|e| fallback(&e.to_string())),
        Err(e) => fallback(&e.to_string()),
    }
}

pub fn html(body: String, max_age: u64) -> Response<ResponseBody> {
    Response::builder()
        .header(CONTENT_TYPE, "text/html")
        .header(CACHE_CONTROL, cache_control(max_age))
        .body(full(body))
        .unwrap_or_else(|e| fallback(&e.to_string()))
}

pub fn method_not_allowed() -> Response<ResponseBody> {
    Response::builder()
        .status(StatusCode::METHOD_NOT_ALLOWED)
        .header(CONTENT_TYPE, "text/plain")
        .header(ALLOW, "GET, HEAD")
        .body(full("Method not allowed"))
        .unwrap_or_else(|e| fallback(&e.to_string()))
}

/// Weak validator built from size and modification time
pub fn etag(metadata: &Metadata) -> String {
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();

    format!("W/\"{:x}-{:x}\"", metadata.len(), mtime)
}

/// Content type a file is served with; HTML is never served as HTML
pub fn served_content_type(package_path: &str) -> &'static str {
    match get_content_type(package_path) {
        "text/html" => "text/plain",
        content_type => content_type,
    }
}

/// Stream a file from disk
pub async fn file(
    path: &Path,
    package_path: &str,
    metadata: &Metadata,
    max_age: u64,
) -> Result<Response<ResponseBody>, CdnError> {
    let handle = tokio::fs::File::open(path)
        .await
        .map_err(|e| CdnError::io(format!("Failed to open {}", path.display()), e))?;

    let stream = ReaderStream::new(handle).map_ok(Frame::data);
    let body = StreamBody::new(stream).boxed_unsync();

    Response::builder()
        .header(CONTENT_TYPE, served_content_type(package_path))
        .header(CONTENT_LENGTH, metadata.len())
        .header(CACHE_CONTROL, cache_control(max_age))
        .header(ETAG, etag(metadata))
        .body(body)
        .map_err(|e| CdnError::server(e.to_string()))
}

/// Build the response for a pipeline outcome
pub async fn respond(outcome: Outcome) -> Response<ResponseBody> {
    match outcome {
        Outcome::Redirect { location, max_age } => redirect(&location, max_age),
        Outcome::Text { status, body } => text(status, body),
        Outcome::Json { body, max_age } => json(&body, max_age),
        Outcome::Html { body, max_age } => html(body, max_age),
        Outcome::File {
            path,
            package_path,
            metadata,
            max_age,
        } => match file(&path, &package_path, &metadata, max_age).await {
            Ok(response) => response,
            Err(e) => error(&e),
        },
        Outcome::Error(e) => error(&e),
    }
}
