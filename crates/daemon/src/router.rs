//! HTTP request router for dispatching requests to the file vault.
//!
//! This module provides the `Router` struct that authenticates every
//! request, maps it onto a [`Route`], and runs the matching vault operation.
//!
//! | Route | Method | Operation |
//! |---|---|---|
//! | `/api/files/{*path}?page&pageSize` | GET | list |
//! | `/api/files/download/{*path}` | GET | download |
//! | `/api/files/upload/{*path}` | POST | upload (multipart) |
//! | `/api/files/search?query&minSize&maxSize&page&pageSize` | GET | search |
//! | `/api/files/allowed-types` | GET | allow-list |
//! | anything else | GET | static UI asset |
//!
//! Blocking filesystem work runs on the blocking thread pool.

use std::collections::HashMap;
use std::convert::Infallible;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{stream, TryStreamExt};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Body, Frame};
use hyper::header::{self, HeaderValue};
use hyper::{Method, Request, Response, StatusCode, Uri};
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use protocol::messages::{to_json, ErrorCode, ErrorMessage, UploadResponse, API_VERSION};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::io::{ReaderStream, StreamReader, SyncIoBridge};
use tracing::{debug, error, warn};
use url::form_urlencoded;

use crate::auth::{AuthError, BasicAuth};
use crate::files::{
    ErrorKind, FileVault, PathResolver, SearchQuery, UploadOutcome, UploadTarget, VaultError,
};

/// Response body type produced by the router.
pub type ResponseBody = UnsyncBoxBody<Bytes, io::Error>;

/// Path prefix of the JSON API.
pub const API_PREFIX: &str = "/api/files";

/// Response header carrying the API version.
pub const API_VERSION_HEADER: &str = "x-filevault-api";

/// Body chunks buffered between the request and the file being written.
const UPLOAD_CHANNEL_DEPTH: usize = 8;

/// File served for directory requests to the static UI.
const INDEX_FILE: &str = "index.html";

/// Errors that can occur while handling a request.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Vault operation failed.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// Authentication failed.
    #[error("authentication failed: {0}")]
    Unauthorized(#[from] AuthError),

    /// Malformed request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No handler or asset for this path.
    #[error("not found: {0}")]
    NotFound(String),

    /// Method not supported on this route.
    #[error("method {0} not allowed")]
    MethodNotAllowed(Method),

    /// Request body exceeds the size limit.
    #[error("request body exceeds limit of {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RouterError {
    /// Convert the error to a wire error body.
    pub fn to_error_message(&self) -> ErrorMessage {
        match self {
            RouterError::Vault(e) => e.to_error_message(),
            RouterError::Unauthorized(_) => {
                ErrorMessage::new(ErrorCode::Unauthorized, "authentication required")
            }
            RouterError::InvalidRequest(_) => {
                ErrorMessage::new(ErrorCode::InvalidRequest, self.to_string())
            }
            RouterError::NotFound(_) => ErrorMessage::new(ErrorCode::NotFound, self.to_string()),
            RouterError::MethodNotAllowed(_) => {
                ErrorMessage::new(ErrorCode::MethodNotAllowed, self.to_string())
            }
            RouterError::PayloadTooLarge { .. } => {
                ErrorMessage::new(ErrorCode::PayloadTooLarge, self.to_string())
            }
            RouterError::Internal(_) => {
                ErrorMessage::new(ErrorCode::InternalError, "internal server error")
            }
        }
    }
}

/// A parsed request target. Paths are percent-decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// List a directory.
    List(String),
    /// Download a file.
    Download(String),
    /// Upload into a directory.
    Upload(String),
    /// Search the vault.
    Search,
    /// Report the upload allow-list.
    AllowedTypes,
    /// Serve a static UI asset.
    Static(String),
}

/// Map a method and raw (still percent-encoded) URI path onto a route.
pub fn parse_route(method: &Method, raw_path: &str) -> Result<Route, RouterError> {
    let api_path = strip_segment_prefix(raw_path, API_PREFIX);

    match (method, api_path) {
        (&Method::GET, Some("search")) => Ok(Route::Search),
        (&Method::GET, Some("allowed-types")) => Ok(Route::AllowedTypes),
        (&Method::GET, Some(rest)) => match strip_segment_prefix(rest, "download") {
            Some(file) => Ok(Route::Download(decode_path(file)?)),
            None => Ok(Route::List(decode_path(rest)?)),
        },
        (&Method::POST, Some(rest)) => match strip_segment_prefix(rest, "upload") {
            Some(target) => Ok(Route::Upload(decode_path(target)?)),
            None => Err(RouterError::MethodNotAllowed(method.clone())),
        },
        (&Method::GET, None) => Ok(Route::Static(decode_path(raw_path.trim_start_matches('/'))?)),
        _ => Err(RouterError::MethodNotAllowed(method.clone())),
    }
}

/// `prefix` itself maps to `""`, `prefix/rest` to `rest`, anything else to `None`.
fn strip_segment_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some(rest)
    } else {
        rest.strip_prefix('/')
    }
}

fn decode_path(raw: &str) -> Result<String, RouterError> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| RouterError::InvalidRequest("path is not valid UTF-8".to_string()))
}

/// Query parameters keyed case- and underscore-insensitively.
///
/// `pageSize`, `pagesize` and `page_size` all land on the same key.
#[derive(Debug, Default)]
struct QueryParams(HashMap<String, String>);

impl QueryParams {
    fn from_uri(uri: &Uri) -> Self {
        let params = uri
            .query()
            .map(|query| {
                form_urlencoded::parse(query.as_bytes())
                    .map(|(key, value)| (normalize_key(&key), value.into_owned()))
                    .collect()
            })
            .unwrap_or_default();
        Self(params)
    }

    fn text(&self, name: &str) -> Option<&str> {
        self.0.get(&normalize_key(name)).map(String::as_str)
    }

    /// Parse a numeric parameter. Absent and empty values are `None`.
    fn number<T: FromStr>(&self, name: &str) -> Result<Option<T>, RouterError> {
        match self.text(name).map(str::trim) {
            None | Some("") => Ok(None),
            Some(value) => value.parse().map(Some).map_err(|_| {
                RouterError::InvalidRequest(format!("invalid value for {}: {:?}", name, value))
            }),
        }
    }
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// HTTP router over one vault.
pub struct Router {
    /// The vault all API routes operate on.
    vault: Arc<FileVault>,
    /// Credential check applied to every request.
    auth: BasicAuth,
    /// Resolver for the static UI directory, if one exists.
    static_files: Option<PathResolver>,
}

impl Router {
    /// Create a router with no static UI.
    pub fn new(vault: Arc<FileVault>, auth: BasicAuth) -> Self {
        Self {
            vault,
            auth,
            static_files: None,
        }
    }

    /// Serve static UI assets from `resolver`'s root.
    pub fn with_static_files(mut self, resolver: PathResolver) -> Self {
        self.static_files = Some(resolver);
        self
    }

    /// Handle one request. Never fails; errors become JSON responses.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<ResponseBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        debug!(method = %method, path = %path, "Handling request");

        let authenticated = self.authenticate(&req);
        let mut response = match authenticated {
            Ok(()) => match self.route(req).await {
                Ok(response) => response,
                Err(e) => {
                    log_failure(&method, &path, &e);
                    error_response(&e)
                }
            },
            Err(e) => {
                warn!(method = %method, path = %path, error = %e, "Rejected unauthenticated request");
                unauthorized_response(e)
            }
        };

        response.headers_mut().insert(
            API_VERSION_HEADER,
            HeaderValue::from(u16::from(API_VERSION)),
        );
        debug!(method = %method, path = %path, status = response.status().as_u16(), "Request complete");
        response
    }

    fn authenticate<B>(&self, req: &Request<B>) -> Result<(), AuthError> {
        let header = req
            .headers()
            .get(header::AUTHORIZATION)
            .map(|value| value.to_str().unwrap_or(""));
        self.auth.verify(header).map(|_| ())
    }

    async fn route<B>(&self, req: Request<B>) -> Result<Response<ResponseBody>, RouterError>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let route = parse_route(req.method(), req.uri().path())?;
        let params = QueryParams::from_uri(req.uri());

        match route {
            Route::List(path) => self.handle_list(path, &params).await,
            Route::Download(path) => self.handle_download(path).await,
            Route::Upload(target) => self.handle_upload(target, req).await,
            Route::Search => self.handle_search(&params).await,
            Route::AllowedTypes => Ok(json_response(StatusCode::OK, &self.vault.allowed_types())),
            Route::Static(path) => self.handle_static(path).await,
        }
    }

    async fn handle_list(
        &self,
        path: String,
        params: &QueryParams,
    ) -> Result<Response<ResponseBody>, RouterError> {
        let page = params.number::<usize>("page")?;
        let page_size = params.number::<usize>("pageSize")?;
        debug!(path = %path, page = ?page, page_size = ?page_size, "Listing directory");

        let vault = Arc::clone(&self.vault);
        let entries = run_blocking(move || {
            let pagination = vault.pagination(page, page_size)?;
            vault.list(Some(&path), pagination)
        })
        .await?;

        Ok(json_response(StatusCode::OK, &entries))
    }

    async fn handle_download(&self, path: String) -> Result<Response<ResponseBody>, RouterError> {
        debug!(path = %path, "Downloading file");

        let vault = Arc::clone(&self.vault);
        let resolved = run_blocking(move || vault.get_file(&path)).await?;

        let file = tokio::fs::File::open(&resolved.absolute_path)
            .await
            .map_err(VaultError::from)?;
        let stream = ReaderStream::new(file).map_ok(Frame::data);
        let mut response = Response::new(StreamBody::new(stream).boxed_unsync());

        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );
        if let Some(size) = resolved.entry.size {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
        }
        headers.insert(
            header::CONTENT_DISPOSITION,
            content_disposition(&resolved.entry.name),
        );

        Ok(response)
    }

    async fn handle_search(&self, params: &QueryParams) -> Result<Response<ResponseBody>, RouterError> {
        let query = params.text("query").unwrap_or_default().to_string();
        let min_size = params.number::<u64>("minSize")?;
        let max_size = params.number::<u64>("maxSize")?;
        let page = params.number::<usize>("page")?;
        let page_size = params.number::<usize>("pageSize")?;
        debug!(query = %query, min_size = ?min_size, max_size = ?max_size, "Searching");

        let vault = Arc::clone(&self.vault);
        let results = run_blocking(move || {
            let mut search = SearchQuery::new(query).with_size_range(min_size, max_size);
            if page.is_some() || page_size.is_some() {
                search = search.with_pagination(vault.pagination(page, page_size)?);
            }
            vault.search(&search)
        })
        .await?;

        Ok(json_response(StatusCode::OK, &results))
    }

    async fn handle_upload<B>(
        &self,
        target: String,
        req: Request<B>,
    ) -> Result<Response<ResponseBody>, RouterError>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let boundary = {
            let content_type = req
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("");
            multer::parse_boundary(content_type).map_err(|_| {
                RouterError::InvalidRequest("expected a multipart/form-data body".to_string())
            })?
        };

        let limit = self.vault.max_request_size();
        let constraints =
            multer::Constraints::new().size_limit(multer::SizeLimit::new().whole_stream(limit));
        let mut multipart = multer::Multipart::with_constraints(
            req.into_body().into_data_stream(),
            boundary,
            constraints,
        );

        // Resolved on the first file part, so a request without files
        // creates nothing
        let mut upload_target: Option<UploadTarget> = None;
        let mut outcomes = Vec::new();

        while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
            // Plain form fields carry no file name
            let Some(file_name) = field.file_name().map(str::to_string) else {
                continue;
            };

            let dir = match upload_target.clone() {
                Some(dir) => dir,
                None => {
                    let vault = Arc::clone(&self.vault);
                    let target = target.clone();
                    debug!(target = %target, "Receiving upload");
                    let dir = run_blocking(move || vault.prepare_target(Some(&target))).await?;
                    upload_target = Some(dir.clone());
                    dir
                }
            };

            let result = self.stream_file(&mut field, dir, file_name.clone()).await?;
            outcomes.push(UploadOutcome { file_name, result });
        }

        if outcomes.is_empty() {
            return Err(RouterError::InvalidRequest(
                "No files were uploaded.".to_string(),
            ));
        }

        // Only report failure when nothing was stored
        let status = if outcomes.iter().any(|o| o.result.is_ok()) {
            StatusCode::OK
        } else {
            outcomes
                .iter()
                .find_map(|o| o.result.as_ref().err())
                .map(|e| status_for(e.code()))
                .unwrap_or(StatusCode::BAD_REQUEST)
        };

        let response = UploadResponse::from_results(
            outcomes.iter().map(|o| o.to_upload_result()).collect(),
        );
        Ok(json_response(status, &response))
    }

    /// Stream one file part to disk on the blocking pool.
    ///
    /// A rejected file stops the writer early; the rest of its part is
    /// drained so the following parts can still be read.
    async fn stream_file(
        &self,
        field: &mut multer::Field<'_>,
        target: UploadTarget,
        file_name: String,
    ) -> Result<Result<String, VaultError>, RouterError> {
        let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(UPLOAD_CHANNEL_DEPTH);
        let chunks = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        });
        let reader = SyncIoBridge::new(StreamReader::new(Box::pin(chunks)));

        let vault = Arc::clone(&self.vault);
        let writer =
            tokio::task::spawn_blocking(move || vault.save_in(&target, &file_name, reader));

        let mut writing = true;
        let received = loop {
            match field.chunk().await {
                Ok(Some(chunk)) => {
                    if writing && tx.send(Ok(chunk)).await.is_err() {
                        writing = false;
                    }
                }
                Ok(None) => break Ok(()),
                Err(e) => {
                    // Abort the writer so a truncated file is never stored
                    let _ = tx
                        .send(Err(io::Error::new(io::ErrorKind::UnexpectedEof, e.to_string())))
                        .await;
                    break Err(e);
                }
            }
        };
        drop(tx);

        let result = writer
            .await
            .map_err(|e| RouterError::Internal(format!("upload task failed: {}", e)))?;
        received.map_err(multipart_error)?;
        Ok(result)
    }

    async fn handle_static(&self, path: String) -> Result<Response<ResponseBody>, RouterError> {
        let resolver = self
            .static_files
            .clone()
            .ok_or_else(|| RouterError::NotFound(path.clone()))?;

        let file = run_blocking(move || locate_static(&resolver, &path)).await?;
        let contents = tokio::fs::read(&file).await.map_err(VaultError::from)?;

        let mut response = Response::new(full_body(contents));
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(content_type_for(&file)),
        );
        Ok(response)
    }
}

fn multipart_error(e: multer::Error) -> RouterError {
    match e {
        multer::Error::StreamSizeExceeded { limit } => RouterError::PayloadTooLarge { limit },
        e => RouterError::InvalidRequest(format!("malformed multipart body: {}", e)),
    }
}

fn locate_static(resolver: &PathResolver, path: &str) -> Result<PathBuf, VaultError> {
    let mut resolved = resolver.resolve(Some(path))?;
    if resolved.is_dir() {
        let dir = path.trim_matches('/');
        let index = if dir.is_empty() {
            INDEX_FILE.to_string()
        } else {
            format!("{}/{}", dir, INDEX_FILE)
        };
        resolved = resolver.resolve(Some(&index))?;
    }
    if !resolved.is_file() {
        return Err(VaultError::NotFound(path.to_string()));
    }
    Ok(resolved)
}

async fn run_blocking<T, F>(f: F) -> Result<T, RouterError>
where
    F: FnOnce() -> Result<T, VaultError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RouterError::Internal(format!("blocking task failed: {}", e)))?
        .map_err(RouterError::from)
}

fn log_failure(method: &Method, path: &str, e: &RouterError) {
    match e {
        RouterError::Vault(v) if v.kind() == ErrorKind::Generic => {
            error!(method = %method, path = %path, error = %e, "Request failed");
        }
        RouterError::Internal(_) => {
            error!(method = %method, path = %path, error = %e, "Request failed");
        }
        _ => {
            debug!(method = %method, path = %path, error = %e, "Request rejected");
        }
    }
}

/// Content type for a static asset, by extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "webp" => "image/webp",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}

/// `Content-Disposition` for a download, with an ASCII fallback name and
/// the exact name in RFC 5987 form.
fn content_disposition(name: &str) -> HeaderValue {
    let fallback: String = name
        .chars()
        .map(|c| {
            if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let value = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        utf8_percent_encode(name, NON_ALPHANUMERIC)
    );
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// HTTP status for a wire error code.
pub fn status_for(code: ErrorCode) -> StatusCode {
    StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn full_body(data: impl Into<Bytes>) -> ResponseBody {
    Full::new(data.into())
        .map_err(|never: Infallible| match never {})
        .boxed_unsync()
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<ResponseBody> {
    let (status, bytes) = match to_json(value) {
        Ok(bytes) => (status, bytes),
        Err(e) => {
            error!(error = %e, "Failed to serialize response");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                br#"{"code":"internal_error","message":"internal server error"}"#.to_vec(),
            )
        }
    };

    let mut response = Response::new(full_body(bytes));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

fn error_response(e: &RouterError) -> Response<ResponseBody> {
    let message = e.to_error_message();
    json_response(status_for(message.code), &message)
}

fn unauthorized_response(e: AuthError) -> Response<ResponseBody> {
    let mut response = error_response(&RouterError::Unauthorized(e));
    if let Ok(challenge) = HeaderValue::from_str(&BasicAuth::challenge()) {
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, challenge);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VaultConfig;
    use protocol::messages::{from_json, AllowedTypes, FileEntry};
    use protocol::Credentials;
    use std::fs;
    use tempfile::TempDir;

    const BOUNDARY: &str = "X-FILEVAULT-TEST-BOUNDARY";

    fn create_router() -> (TempDir, Router) {
        let temp_dir = TempDir::new().unwrap();
        let config = VaultConfig {
            root: temp_dir.path().join("files"),
            allowed_extensions: vec![".pdf".to_string(), ".txt".to_string()],
            max_upload_size: 1024,
            max_request_size: 64 * 1024,
            default_page_size: 50,
            max_page_size: 100,
        };
        let vault = Arc::new(FileVault::new(&config).unwrap());

        let static_dir = temp_dir.path().join("wwwroot");
        fs::create_dir_all(static_dir.join("css")).unwrap();
        fs::write(static_dir.join("index.html"), "<h1>FileVault</h1>").unwrap();
        fs::write(static_dir.join("css/site.css"), "body {}").unwrap();

        let router = Router::new(vault, BasicAuth::new("admin", "secret"))
            .with_static_files(PathResolver::new(&static_dir).unwrap());
        (temp_dir, router)
    }

    fn root(router: &Router) -> &Path {
        router.vault.root()
    }

    /// Every entry in the vault root, staging files included.
    fn vault_names(router: &Router) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(root(router))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn request(method: Method, uri: &str) -> hyper::http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(
                header::AUTHORIZATION,
                Credentials::new("admin", "secret").to_authorization_header(),
            )
    }

    fn get(uri: &str) -> Request<Full<Bytes>> {
        request(Method::GET, uri).body(Full::new(Bytes::new())).unwrap()
    }

    fn multipart_body(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, content) in files {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"files\"; filename=\"{}\"\r\n",
                    name
                )
                .as_bytes(),
            );
            body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn upload(uri: &str, files: &[(&str, &[u8])]) -> Request<Full<Bytes>> {
        request(Method::POST, uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Full::new(Bytes::from(multipart_body(files))))
            .unwrap()
    }

    async fn body_bytes(response: Response<ResponseBody>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    async fn error_code(response: Response<ResponseBody>) -> ErrorCode {
        from_json::<ErrorMessage>(&body_bytes(response).await)
            .unwrap()
            .code
    }

    // ========================================================================
    // Route parsing
    // ========================================================================

    #[test]
    fn test_parse_route() {
        let cases = [
            (Method::GET, "/api/files", Route::List(String::new())),
            (Method::GET, "/api/files/", Route::List(String::new())),
            (Method::GET, "/api/files/docs/a", Route::List("docs/a".to_string())),
            (Method::GET, "/api/files/search", Route::Search),
            (Method::GET, "/api/files/allowed-types", Route::AllowedTypes),
            (
                Method::GET,
                "/api/files/download/docs/a.txt",
                Route::Download("docs/a.txt".to_string()),
            ),
            (
                Method::GET,
                "/api/files/downloads",
                Route::List("downloads".to_string()),
            ),
            (Method::POST, "/api/files/upload", Route::Upload(String::new())),
            (
                Method::POST,
                "/api/files/upload/in/here",
                Route::Upload("in/here".to_string()),
            ),
            (Method::GET, "/", Route::Static(String::new())),
            (Method::GET, "/css/site.css", Route::Static("css/site.css".to_string())),
            (Method::GET, "/api/filesx", Route::Static("api/filesx".to_string())),
        ];

        for (method, path, expected) in cases {
            assert_eq!(parse_route(&method, path).unwrap(), expected, "{method} {path}");
        }
    }

    #[test]
    fn test_parse_route_decodes_percent_encoding() {
        assert_eq!(
            parse_route(&Method::GET, "/api/files/download/my%20file.txt").unwrap(),
            Route::Download("my file.txt".to_string())
        );
        assert_eq!(
            parse_route(&Method::GET, "/api/files/%2E%2E%5C%2E%2E%5Csecret").unwrap(),
            Route::List("..\\..\\secret".to_string())
        );
        assert!(matches!(
            parse_route(&Method::GET, "/api/files/%FF"),
            Err(RouterError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_parse_route_method_not_allowed() {
        for (method, path) in [
            (Method::PUT, "/api/files/x"),
            (Method::DELETE, "/api/files/x"),
            (Method::POST, "/api/files/docs"),
            (Method::POST, "/index.html"),
            (Method::HEAD, "/api/files"),
        ] {
            assert!(
                matches!(
                    parse_route(&method, path),
                    Err(RouterError::MethodNotAllowed(_))
                ),
                "{method} {path}"
            );
        }
    }

    #[test]
    fn test_query_params_aliases() {
        for query in ["pageSize=7", "pagesize=7", "page_size=7", "PAGESIZE=7"] {
            let uri: Uri = format!("/api/files?{}", query).parse().unwrap();
            let params = QueryParams::from_uri(&uri);
            assert_eq!(params.number::<usize>("pageSize").unwrap(), Some(7), "{query}");
        }

        let uri: Uri = "/api/files?page=abc&pageSize=".parse().unwrap();
        let params = QueryParams::from_uri(&uri);
        assert!(params.number::<usize>("page").is_err());
        assert_eq!(params.number::<usize>("pageSize").unwrap(), None);
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(
            content_type_for(Path::new("index.html")),
            "text/html; charset=utf-8"
        );
        assert_eq!(content_type_for(Path::new("app.JS")), "text/javascript; charset=utf-8");
        assert_eq!(content_type_for(Path::new("blob")), "application/octet-stream");
    }

    #[test]
    fn test_content_disposition() {
        let value = content_disposition("report.pdf");
        assert_eq!(
            value.to_str().unwrap(),
            "attachment; filename=\"report.pdf\"; filename*=UTF-8''report%2Epdf"
        );

        let value = content_disposition("résumé \"final\".txt");
        let text = value.to_str().unwrap();
        assert!(text.starts_with("attachment; filename=\"r_sum_ _final_.txt\""));
        assert!(text.contains("filename*=UTF-8''r%C3%A9sum%C3%A9"));
    }

    // ========================================================================
    // Authentication
    // ========================================================================

    #[tokio::test]
    async fn test_missing_credentials_rejected() {
        let (_temp_dir, router) = create_router();
        let req = Request::builder()
            .uri("/api/files")
            .body(Full::new(Bytes::new()))
            .unwrap();

        let response = router.handle(req).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[header::WWW_AUTHENTICATE],
            "Basic realm=\"FileVault\""
        );
        assert_eq!(error_code(response).await, ErrorCode::Unauthorized);
    }

    #[tokio::test]
    async fn test_wrong_credentials_rejected() {
        let (_temp_dir, router) = create_router();
        for uri in ["/api/files", "/"] {
            let req = Request::builder()
                .uri(uri)
                .header(
                    header::AUTHORIZATION,
                    Credentials::new("admin", "guess").to_authorization_header(),
                )
                .body(Full::new(Bytes::new()))
                .unwrap();
            let response = router.handle(req).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_api_version_header() {
        let (_temp_dir, router) = create_router();
        let response = router.handle(get("/api/files")).await;
        assert_eq!(response.headers()[API_VERSION_HEADER], "1");
    }

    // ========================================================================
    // Listing, download and search
    // ========================================================================

    #[tokio::test]
    async fn test_list_root() {
        let (_temp_dir, router) = create_router();
        let root = root(&router);
        fs::write(root.join("b.txt"), "b").unwrap();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::create_dir(root.join("A")).unwrap();

        let response = router.handle(get("/api/files")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");

        let entries: Vec<FileEntry> = from_json(&body_bytes(response).await).unwrap();
        assert_eq!(
            entries,
            vec![
                FileEntry::directory("A", "A"),
                FileEntry::file("a.txt", "a.txt", 1),
                FileEntry::file("b.txt", "b.txt", 1),
            ]
        );
    }

    #[tokio::test]
    async fn test_list_pagination() {
        let (_temp_dir, router) = create_router();
        for i in 1..=5 {
            fs::write(root(&router).join(format!("f{}.txt", i)), "x").unwrap();
        }

        let response = router.handle(get("/api/files/?page=2&pageSize=2")).await;
        let entries: Vec<FileEntry> = from_json(&body_bytes(response).await).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["f3.txt", "f4.txt"]);

        let response = router.handle(get("/api/files?page=10&page_size=2")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let entries: Vec<FileEntry> = from_json(&body_bytes(response).await).unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_list_invalid_pagination() {
        let (_temp_dir, router) = create_router();
        for uri in [
            "/api/files?page=0",
            "/api/files?pageSize=0",
            "/api/files?pageSize=101",
            "/api/files?page=-1",
            "/api/files?page=abc",
        ] {
            let response = router.handle(get(uri)).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(error_code(response).await, ErrorCode::InvalidRequest);
        }
    }

    #[tokio::test]
    async fn test_list_missing_directory() {
        let (_temp_dir, router) = create_router();
        let response = router.handle(get("/api/files/nope")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(error_code(response).await, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_traversal_forbidden() {
        let (temp_dir, router) = create_router();
        fs::write(temp_dir.path().join("secret"), "s").unwrap();

        for uri in [
            "/api/files/..%2F..%2Fsecret",
            "/api/files/%2E%2E%5C%2E%2E%5Csecret",
            "/api/files/download/..%2Fsecret",
            "/api/files/download/%2E%2E%5Csecret",
        ] {
            let response = router.handle(get(uri)).await;
            assert_eq!(response.status(), StatusCode::FORBIDDEN, "{uri}");
            let message: ErrorMessage = from_json(&body_bytes(response).await).unwrap();
            assert_eq!(message.code, ErrorCode::AccessDenied);
            assert!(!message.message.contains(&temp_dir.path().display().to_string()));
        }
    }

    #[tokio::test]
    async fn test_download() {
        let (_temp_dir, router) = create_router();
        fs::create_dir(root(&router).join("docs")).unwrap();
        fs::write(root(&router).join("docs/a.txt"), "hello world").unwrap();

        let response = router.handle(get("/api/files/download/docs/a.txt")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/octet-stream"
        );
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "11");
        assert!(response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .starts_with("attachment; filename=\"a.txt\""));
        assert_eq!(body_bytes(response).await, Bytes::from_static(b"hello world"));
    }

    #[tokio::test]
    async fn test_download_directory_not_found() {
        let (_temp_dir, router) = create_router();
        fs::create_dir(root(&router).join("docs")).unwrap();

        let response = router.handle(get("/api/files/download/docs")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_search() {
        let (_temp_dir, router) = create_router();
        let root = root(&router);
        fs::create_dir(root.join("reports")).unwrap();
        fs::write(root.join("Annual_Report.pdf"), vec![0u8; 2000]).unwrap();
        fs::write(root.join("small.txt"), vec![0u8; 500]).unwrap();

        let response = router.handle(get("/api/files/search?query=report")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let entries: Vec<FileEntry> = from_json(&body_bytes(response).await).unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["reports", "Annual_Report.pdf"]);

        let response = router.handle(get("/api/files/search?minSize=1000")).await;
        let entries: Vec<FileEntry> = from_json(&body_bytes(response).await).unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["Annual_Report.pdf"]);
    }

    #[tokio::test]
    async fn test_search_invalid_bounds() {
        let (_temp_dir, router) = create_router();
        for uri in [
            "/api/files/search?query=a&minSize=10&maxSize=5",
            "/api/files/search?min_size=big",
        ] {
            let response = router.handle(get(uri)).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_allowed_types() {
        let (_temp_dir, router) = create_router();
        let response = router.handle(get("/api/files/allowed-types")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let types: AllowedTypes = from_json(&body_bytes(response).await).unwrap();
        assert_eq!(types.allowed_extensions, vec![".pdf", ".txt"]);
        assert!(!types.allow_all);
    }

    // ========================================================================
    // Upload
    // ========================================================================

    #[tokio::test]
    async fn test_upload_and_collision() {
        let (_temp_dir, router) = create_router();

        let response = router
            .handle(upload("/api/files/upload/docs", &[("notes.txt", b"one")]))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: UploadResponse = from_json(&body_bytes(response).await).unwrap();
        assert_eq!(body.message, "Files uploaded successfully.");
        assert_eq!(body.files[0].saved_name.as_deref(), Some("notes.txt"));

        let response = router
            .handle(upload("/api/files/upload/docs", &[("notes.txt", b"two")]))
            .await;
        let body: UploadResponse = from_json(&body_bytes(response).await).unwrap();
        let second = body.files[0].saved_name.clone().unwrap();
        assert_ne!(second, "notes.txt");

        let docs = root(&router).join("docs");
        assert_eq!(fs::read(docs.join("notes.txt")).unwrap(), b"one");
        assert_eq!(fs::read(docs.join(second)).unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_upload_partial_batch() {
        let (_temp_dir, router) = create_router();
        let response = router
            .handle(upload(
                "/api/files/upload",
                &[("a.txt", b"a"), ("x.exe", b"MZ")],
            ))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body: UploadResponse = from_json(&body_bytes(response).await).unwrap();
        assert_eq!(body.message, "1 of 2 files uploaded.");
        assert!(body.files[0].is_saved());
        assert_eq!(
            body.files[1].error.as_ref().unwrap().code,
            ErrorCode::InvalidRequest
        );
        assert!(!root(&router).join("x.exe").exists());
    }

    #[tokio::test]
    async fn test_upload_disallowed_only() {
        let (_temp_dir, router) = create_router();
        let response = router
            .handle(upload("/api/files/upload", &[("x.exe", b"MZ")]))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_too_large() {
        let (_temp_dir, router) = create_router();
        let big = vec![0u8; 2048];
        let response = router
            .handle(upload("/api/files/upload", &[("big.txt", &big)]))
            .await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(!root(&router).join("big.txt").exists());
    }

    #[tokio::test]
    async fn test_upload_body_over_limit() {
        let (_temp_dir, router) = create_router();
        let huge = vec![0u8; 64 * 1024 + 1];
        let response = router
            .handle(upload("/api/files/upload", &[("huge.txt", &huge)]))
            .await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(error_code(response).await, ErrorCode::PayloadTooLarge);
        assert!(vault_names(&router).is_empty());
    }

    #[tokio::test]
    async fn test_upload_batch_larger_than_file_limit() {
        let (_temp_dir, router) = create_router();
        let names: Vec<String> = (0..40).map(|i| format!("part_{:02}.txt", i)).collect();
        let content = vec![b'x'; 1000];
        let files: Vec<(&str, &[u8])> = names
            .iter()
            .map(|n| (n.as_str(), content.as_slice()))
            .collect();

        let response = router.handle(upload("/api/files/upload", &files)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: UploadResponse = from_json(&body_bytes(response).await).unwrap();
        assert_eq!(body.message, "Files uploaded successfully.");
        assert_eq!(vault_names(&router), names);
    }

    #[tokio::test]
    async fn test_upload_oversize_file_keeps_siblings() {
        let (_temp_dir, router) = create_router();
        let big = vec![0u8; 8 * 1024];
        let response = router
            .handle(upload(
                "/api/files/upload",
                &[("first.txt", b"1"), ("big.txt", &big), ("last.txt", b"3")],
            ))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body: UploadResponse = from_json(&body_bytes(response).await).unwrap();
        assert_eq!(body.message, "2 of 3 files uploaded.");
        assert_eq!(
            body.files[1].error.as_ref().unwrap().code,
            ErrorCode::PayloadTooLarge
        );
        assert_eq!(vault_names(&router), vec!["first.txt", "last.txt"]);
        assert_eq!(fs::read(root(&router).join("last.txt")).unwrap(), b"3");
    }

    #[tokio::test]
    async fn test_upload_truncated_body_stores_nothing_partial() {
        let (_temp_dir, router) = create_router();
        let mut body = multipart_body(&[("cut.txt", b"complete content")]);
        body.truncate(body.len() - 40);
        let req = request(Method::POST, "/api/files/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Full::new(Bytes::from(body)))
            .unwrap();

        let response = router.handle(req).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(vault_names(&router).is_empty());
    }

    #[tokio::test]
    async fn test_upload_without_files() {
        let (_temp_dir, router) = create_router();
        let response = router.handle(upload("/api/files/upload", &[])).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_requires_multipart() {
        let (_temp_dir, router) = create_router();
        let req = request(Method::POST, "/api/files/upload")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from_static(b"{}")))
            .unwrap();
        let response = router.handle(req).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_target_traversal_forbidden() {
        let (temp_dir, router) = create_router();
        let response = router
            .handle(upload("/api/files/upload/..%2Fescape", &[("a.txt", b"a")]))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(!temp_dir.path().join("escape").exists());
    }

    // ========================================================================
    // Static files and methods
    // ========================================================================

    #[tokio::test]
    async fn test_static_index() {
        let (_temp_dir, router) = create_router();
        let response = router.handle(get("/")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/html; charset=utf-8"
        );
        assert_eq!(body_bytes(response).await, Bytes::from_static(b"<h1>FileVault</h1>"));
    }

    #[tokio::test]
    async fn test_static_asset_and_missing() {
        let (_temp_dir, router) = create_router();
        let response = router.handle(get("/css/site.css")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/css; charset=utf-8");

        let response = router.handle(get("/missing.js")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = router.handle(get("/css")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_static_without_directory() {
        let (_temp_dir, router) = create_router();
        let router = Router::new(Arc::clone(&router.vault), BasicAuth::new("admin", "secret"));
        let response = router.handle(get("/")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let (_temp_dir, router) = create_router();
        let req = request(Method::DELETE, "/api/files/a.txt")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = router.handle(req).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(error_code(response).await, ErrorCode::MethodNotAllowed);
    }
}
