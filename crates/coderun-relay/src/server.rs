//! The relay HTTP server.
//!
//! Two surfaces: `POST /serverAxios` forwards a [`RelayCall`] and answers
//! with the remote body, and every other path serves the runner's static
//! assets.
//!
//! The forwarding endpoint answers `200` whatever happens to the call,
//! including a body it cannot decode. Only the token and the allow-list
//! refuse with another status.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
};
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use tokio::net::TcpListener;

use crate::call::RelayCall;
use crate::error::RelayError;
use crate::forward::Forwarder;

/// Path of the forwarding endpoint
pub const RELAY_PATH: &str = "/serverAxios";

const CACHE_NO_CACHE: &str = "no-cache, no-store, must-revalidate";
const CACHE_SHORT: &str = "public, max-age=3600";

/// Shared state behind every handler
pub struct RelayState {
    forwarder: Forwarder,
    token: Option<String>,
    assets_dir: Utf8PathBuf,
}

impl RelayState {
    pub fn new(forwarder: Forwarder, token: Option<String>, assets_dir: Utf8PathBuf) -> Self {
        if forwarder.allowed_hosts().is_empty() {
            tracing::warn!("relay has no host allow-list; any URL will be forwarded");
        }
        if token.is_none() {
            tracing::warn!("relay has no token; any local client may use it");
        }
        Self {
            forwarder,
            token,
            assets_dir,
        }
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<(), RelayError> {
        let Some(expected) = &self.token else {
            return Ok(());
        };
        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if presented == Some(expected.as_str()) {
            Ok(())
        } else {
            Err(RelayError::Unauthorized)
        }
    }
}

pub fn build_router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route(RELAY_PATH, post(relay_handler))
        .fallback(asset_handler)
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

/// Serve until the listener fails or `shutdown` resolves
pub async fn serve(
    listener: TcpListener,
    state: Arc<RelayState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("relay listening on http://{}", addr);
    }
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn relay_handler(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(e) = state.authorize(&headers) {
        return policy_response(StatusCode::UNAUTHORIZED, e);
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let call = match RelayCall::decode(content_type, &body) {
        Ok(call) => call,
        Err(e) => {
            tracing::warn!("relay call not decoded: {e}");
            return failure_response(e);
        }
    };

    match state.forwarder.forward(&call).await {
        Ok(forwarded) => {
            let mut response = Body::from(forwarded.body).into_response();
            if let Some(value) = forwarded
                .content_type
                .and_then(|ct| HeaderValue::from_str(&ct).ok())
            {
                response.headers_mut().insert(header::CONTENT_TYPE, value);
            }
            response
        }
        Err(e) if e.is_policy() => policy_response(StatusCode::FORBIDDEN, e),
        Err(e) => {
            tracing::warn!(url = %call.url, "relay call failed: {e}");
            failure_response(e)
        }
    }
}

/// A failed call still answers `200`, with the message as the body
fn failure_response(error: RelayError) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        error.to_string(),
    )
        .into_response()
}

fn policy_response(status: StatusCode, error: RelayError) -> Response {
    tracing::warn!("relay call refused: {error}");
    (status, error.to_string()).into_response()
}

async fn asset_handler(State(state): State<Arc<RelayState>>, request: Request) -> Response {
    if !matches!(*request.method(), Method::GET | Method::HEAD) {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let Some(relative) = asset_path(request.uri().path()) else {
        return not_found();
    };
    let full = state.assets_dir.join(&relative);

    match tokio::fs::read(&full).await {
        Ok(content) => {
            let mime = mime_from_extension(relative.as_str());
            let cache = if mime.starts_with("text/html") {
                CACHE_NO_CACHE
            } else {
                CACHE_SHORT
            };
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, mime), (header::CACHE_CONTROL, cache)],
                content,
            )
                .into_response()
        }
        Err(e) => {
            tracing::debug!(path = %full, "asset not served: {e}");
            not_found()
        }
    }
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        "Not Found",
    )
        .into_response()
}

/// Map a request path to a path under the assets directory.
///
/// Directory paths resolve to their `index.html`. Anything that could climb
/// out of the directory is refused.
fn asset_path(uri_path: &str) -> Option<Utf8PathBuf> {
    let trimmed = uri_path.trim_start_matches('/');
    let mut relative = Utf8PathBuf::from(trimmed);
    if trimmed.is_empty() || trimmed.ends_with('/') {
        relative.push("index.html");
    }
    let safe = Utf8Path::new(&relative)
        .components()
        .all(|c| matches!(c, Utf8Component::Normal(_)));
    safe.then_some(relative)
}

/// Guess MIME type from file extension
pub fn mime_from_extension(path: &str) -> &'static str {
    match path.rsplit('.').next() {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") | Some("mjs") => "application/javascript; charset=utf-8",
        Some("json") | Some("map") => "application/json; charset=utf-8",
        Some("rhai") | Some("txt") => "text/plain; charset=utf-8",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}

/// Logging middleware
async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

    if status >= 500 {
        tracing::error!("{} {} -> {} in {:.1}ms", method, path, status, latency_ms);
    } else if status >= 400 {
        tracing::warn!("{} {} -> {} in {:.1}ms", method, path, status, latency_ms);
    } else {
        tracing::info!("{} {} -> {} in {:.1}ms", method, path, status, latency_ms);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_paths() {
        assert_eq!(asset_path("/").unwrap(), "index.html");
        assert_eq!(asset_path("").unwrap(), "index.html");
        assert_eq!(asset_path("/js/app.js").unwrap(), "js/app.js");
        assert_eq!(asset_path("/docs/").unwrap(), "docs/index.html");
        assert!(asset_path("/../secret").is_none());
        assert!(asset_path("/a/../../etc/passwd").is_none());
        assert!(asset_path("/./x").is_none());
    }

    #[test]
    fn mime_types() {
        assert_eq!(mime_from_extension("index.html"), "text/html; charset=utf-8");
        assert_eq!(
            mime_from_extension("app.mjs"),
            "application/javascript; charset=utf-8"
        );
        assert_eq!(mime_from_extension("blob"), "application/octet-stream");
    }
}
