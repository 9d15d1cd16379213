//! Forwarding of `/api/core/*` requests to the downstream file service.
//!
//! The downstream service authenticates requests with the session's access
//! token as a bearer credential. Its status code is passed back unchanged,
//! so a 401 from it reaches the session guard and triggers a refresh.

use axum::{
    body::Bytes,
    extract::{OriginalUri, Path, State},
    http::{HeaderMap, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use reqwest::Url;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::auth::{AppState, RequireSession};

/// Downstream service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL, e.g. `http://core.internal/v1`.
    pub base_url: String,

    /// Timeout for forwarded requests in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// HTTP client for the downstream service.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    base_url: Url,
    http: reqwest::Client,
}

impl UpstreamClient {
    /// Creates a client for `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client cannot be built.
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| UpstreamError::Config(format!("invalid base URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(UpstreamError::Config(format!(
                "base URL cannot carry a path: {base_url}"
            )));
        }

        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| UpstreamError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { base_url, http })
    }

    /// Returns the downstream URL for the decoded `path` and raw `query`.
    ///
    /// Each segment is re-encoded below the base path. `.` and `..`
    /// segments are rejected so a request cannot leave the base path.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::InvalidPath`] for dot segments.
    pub fn url_for(&self, path: &str, query: Option<&str>) -> Result<Url, UpstreamError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                UpstreamError::Config("base URL cannot carry a path".to_string())
            })?;
            segments.pop_if_empty();
            for segment in path.split('/').filter(|s| !s.is_empty()) {
                if segment == "." || segment == ".." {
                    return Err(UpstreamError::InvalidPath(path.to_string()));
                }
                segments.push(segment);
            }
        }
        url.set_query(query);
        Ok(url)
    }
}

/// Errors reaching the downstream service.
#[derive(Debug)]
pub enum UpstreamError {
    /// No downstream service is configured.
    NotConfigured,
    /// The client could not be built.
    Config(String),
    /// The path would leave the base path.
    InvalidPath(String),
    /// The request failed before a response arrived.
    Request(String),
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured => write!(f, "no upstream service configured"),
            Self::Config(msg) => write!(f, "upstream configuration error: {msg}"),
            Self::InvalidPath(path) => write!(f, "invalid upstream path: {path}"),
            Self::Request(msg) => write!(f, "upstream request failed: {msg}"),
        }
    }
}

impl std::error::Error for UpstreamError {}

impl IntoResponse for UpstreamError {
    fn into_response(self) -> Response {
        match self {
            Self::NotConfigured => StatusCode::NOT_FOUND.into_response(),
            Self::InvalidPath(path) => {
                debug!(path = %path, "rejected upstream path");
                (StatusCode::BAD_REQUEST, "Invalid path").into_response()
            }
            other => {
                warn!(error = %other, "upstream unavailable");
                (StatusCode::BAD_GATEWAY, "Upstream service unavailable").into_response()
            }
        }
    }
}

/// Forwards the request to the downstream service with the session's bearer token.
#[instrument(skip_all, fields(method = %method, path = %path))]
pub async fn forward(
    State(state): State<Arc<AppState>>,
    RequireSession(session): RequireSession,
    Path(path): Path<String>,
    OriginalUri(original_uri): OriginalUri,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, UpstreamError> {
    let upstream = state.upstream.as_ref().ok_or(UpstreamError::NotConfigured)?;
    let url = upstream.url_for(&path, original_uri.query())?;

    let mut request = upstream
        .http
        .request(method, url)
        .bearer_auth(&session.access_token)
        .body(body);
    if let Some(content_type) = headers.get(header::CONTENT_TYPE) {
        request = request.header(header::CONTENT_TYPE, content_type);
    }

    let response = request
        .send()
        .await
        .map_err(|e| UpstreamError::Request(e.to_string()))?;

    let status = response.status();
    debug!(status = %status, "upstream responded");
    let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
    let body = response
        .bytes()
        .await
        .map_err(|e| UpstreamError::Request(e.to_string()))?;

    let mut reply = (status, body).into_response();
    if let Some(content_type) = content_type {
        reply.headers_mut().insert(header::CONTENT_TYPE, content_type);
    } else {
        reply.headers_mut().remove(header::CONTENT_TYPE);
    }
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app;
    use crate::auth::testing::{ScriptedIdentity, cookie_header, store, tokens};
    use axum::{
        Router,
        body::Body,
        extract::Request,
        http::{HeaderValue, Uri},
        routing::any,
    };
    use rstore_gateway_access::RouteTable;
    use tower::ServiceExt;

    /// Accepts both tokens, except under `strict/` where only the
    /// refreshed one is valid.
    async fn fake_core(
        method: Method,
        uri: Uri,
        Path(path): Path<String>,
        headers: HeaderMap,
        body: Bytes,
    ) -> Response {
        let auth = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let accepted = match auth.as_str() {
            "Bearer new_accessToken" => true,
            "Bearer accessToken" => !path.starts_with("strict/"),
            _ => false,
        };
        if !accepted {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        let reply = format!("{method} {uri} {}", String::from_utf8_lossy(&body));
        (
            StatusCode::CREATED,
            [(header::CONTENT_TYPE, HeaderValue::from_static("text/x-test"))],
            reply,
        )
            .into_response()
    }

    async fn spawn_core() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let base = format!("http://{}/v1", listener.local_addr().expect("addr"));
        let app = Router::new().route("/v1/{*path}", any(fake_core));
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });
        base
    }

    fn gateway(identity: Arc<ScriptedIdentity>, base_url: String) -> Router {
        let upstream = UpstreamClient::new(&UpstreamConfig {
            base_url,
            request_timeout_secs: 5,
        })
        .expect("client");
        let state = Arc::new(AppState {
            identity,
            token_store: store(),
            public_routes: RouteTable::default(),
            max_replay_body_bytes: 1024,
            post_logout_redirect_uri: "/login".to_string(),
            upstream: Some(upstream),
        });
        app::router(state, Router::new())
    }

    fn core_client() -> UpstreamClient {
        UpstreamClient::new(&UpstreamConfig {
            base_url: "http://core.internal/v1/".to_string(),
            request_timeout_secs: 5,
        })
        .expect("client")
    }

    fn get(uri: &str) -> Request {
        Request::builder()
            .uri(uri)
            .header(header::COOKIE, cookie_header(&tokens()))
            .body(Body::empty())
            .expect("request")
    }

    #[test]
    fn url_for_joins_paths() {
        let client = core_client();
        let url = |path: &str, query: Option<&str>| {
            client.url_for(path, query).expect("url").to_string()
        };

        assert_eq!(url("files/a.txt", None), "http://core.internal/v1/files/a.txt");
        assert_eq!(url("/files", None), "http://core.internal/v1/files");
        assert_eq!(url("files/a b.txt", None), "http://core.internal/v1/files/a%20b.txt");
        assert_eq!(
            url("files", Some("page=2&sort=name")),
            "http://core.internal/v1/files?page=2&sort=name"
        );
    }

    #[test]
    fn url_for_rejects_dot_segments() {
        let client = core_client();

        for path in ["../admin", "files/../../admin", "./files", ".."] {
            let err = client.url_for(path, None).expect_err(path);
            assert!(matches!(err, UpstreamError::InvalidPath(_)), "{path}");
        }
    }

    #[test]
    fn base_url_must_be_absolute() {
        let err = UpstreamClient::new(&UpstreamConfig {
            base_url: "core.internal/v1".to_string(),
            request_timeout_secs: 5,
        })
        .expect_err("relative");

        assert!(matches!(err, UpstreamError::Config(_)));
    }

    #[tokio::test]
    async fn forwards_with_bearer_token_and_body() {
        let base = spawn_core().await;
        let identity = Arc::new(ScriptedIdentity::new());
        let router = gateway(identity, base);

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/core/files/upload")
            .header(header::COOKIE, cookie_header(&tokens()))
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(Body::from("payload"))
            .expect("request");
        let response = router.oneshot(request).await.expect("response");

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).expect("type"),
            "text/x-test"
        );
        let body = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .expect("body");
        assert_eq!(&body[..], b"POST /v1/files/upload payload");
    }

    #[tokio::test]
    async fn forwards_query_string() {
        let base = spawn_core().await;
        let router = gateway(Arc::new(ScriptedIdentity::new()), base);

        let response = router
            .oneshot(get("/api/core/files?page=2&sort=name"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .expect("body");
        assert_eq!(&body[..], b"GET /v1/files?page=2&sort=name ");
    }

    #[tokio::test]
    async fn encoded_traversal_is_rejected() {
        let base = spawn_core().await;
        let router = gateway(Arc::new(ScriptedIdentity::new()), base);

        for uri in [
            "/api/core/..%2F..%2Fadmin%2Fusers",
            "/api/core/files/%2E%2E/%2E%2E/admin",
        ] {
            let response = router.clone().oneshot(get(uri)).await.expect("response");
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        }
    }

    #[tokio::test]
    async fn upstream_401_triggers_refresh() {
        let base = spawn_core().await;
        let identity = Arc::new(ScriptedIdentity::new());
        let router = gateway(identity.clone(), base);

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/core/strict/files")
                    .header(header::COOKIE, cookie_header(&tokens()))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(identity.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn unreachable_upstream_is_bad_gateway() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let base = format!("http://{}", listener.local_addr().expect("addr"));
        drop(listener);

        let router = gateway(Arc::new(ScriptedIdentity::new()), base);
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/core/files")
                    .header(header::COOKIE, cookie_header(&tokens()))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
