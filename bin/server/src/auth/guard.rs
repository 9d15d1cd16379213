//! Session guard middleware.
//!
//! Every request passes through [`SessionGuard::run`]. Public routes are
//! forwarded untouched. Protected routes need an access token that the
//! identity provider accepts; an expired session is refreshed once and the
//! request replayed with the new tokens. A second rejection in the same
//! request ends the session.

use axum::{
    body::{Body, Bytes},
    extract::{FromRequestParts, Request, State},
    http::{Extensions, HeaderMap, Method, StatusCode, Uri, Version, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use rstore_gateway_access::{IdentityError, RouteTable};
use rstore_gateway_core::UserInfo;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use super::AppState;
use super::cookies::TokenStore;
use super::identity::IdentityProvider;

/// Where rejected requests are sent.
pub const LOGIN_PATH: &str = "/login";

/// The authenticated session, attached to forwarded requests.
#[derive(Clone)]
pub struct SessionContext {
    pub user: UserInfo,
    pub access_token: String,
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("user", &self.user.sub)
            .field("access_token", &"[redacted]")
            .finish()
    }
}

/// Final decision for one request.
#[derive(Debug)]
pub enum GuardOutcome {
    /// The request reached the inner service.
    Forwarded { jar: CookieJar, response: Response },
    /// The session is missing or unusable.
    Redirect { jar: CookieJar },
    /// The identity provider could not be consulted.
    Provider { jar: CookieJar, error: IdentityError },
    /// The body is too large to buffer for a replay.
    PayloadTooLarge,
}

impl IntoResponse for GuardOutcome {
    fn into_response(self) -> Response {
        match self {
            Self::Forwarded { jar, response } => (jar, response).into_response(),
            Self::Redirect { jar } => (jar, Redirect::temporary(LOGIN_PATH)).into_response(),
            Self::Provider { jar, error } => {
                error!(error = %error, "identity provider unavailable");
                (
                    jar,
                    (StatusCode::BAD_GATEWAY, "Identity provider unavailable"),
                )
                    .into_response()
            }
            Self::PayloadTooLarge => {
                (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response()
            }
        }
    }
}

/// Request held in memory so it can be sent a second time.
struct ReplayableRequest {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    extensions: Extensions,
    body: Bytes,
}

impl ReplayableRequest {
    fn new(parts: Parts, body: Bytes) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            extensions: parts.extensions,
            body,
        }
    }

    /// Builds a fresh request. After a refresh the `Cookie` header is
    /// rewritten so the inner service sees the new tokens.
    fn build(&self, jar: &CookieJar, session: SessionContext, refreshed: bool) -> Request {
        let mut request = Request::new(Body::from(self.body.clone()));
        *request.method_mut() = self.method.clone();
        *request.uri_mut() = self.uri.clone();
        *request.version_mut() = self.version;
        *request.headers_mut() = self.headers.clone();
        *request.extensions_mut() = self.extensions.clone();

        if refreshed {
            let headers = request.headers_mut();
            headers.remove(header::COOKIE);
            if let Some(value) = TokenStore::request_header(jar) {
                headers.insert(header::COOKIE, value);
            }
        }

        request.extensions_mut().insert(session);
        request
    }
}

/// Per-request session state machine.
pub struct SessionGuard<'a> {
    identity: &'a dyn IdentityProvider,
    store: &'a TokenStore,
    routes: &'a RouteTable,
    max_body_bytes: usize,
}

impl<'a> SessionGuard<'a> {
    #[must_use]
    pub fn new(state: &'a AppState) -> Self {
        Self {
            identity: state.identity.as_ref(),
            store: &state.token_store,
            routes: &state.public_routes,
            max_body_bytes: state.max_replay_body_bytes,
        }
    }

    /// Decides what happens to `request`, calling `forward` to reach the
    /// inner service. `forward` runs at most twice.
    #[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
    pub async fn run<F, Fut>(&self, request: Request, mut forward: F) -> GuardOutcome
    where
        F: FnMut(Request) -> Fut,
        Fut: Future<Output = Response>,
    {
        if self
            .routes
            .is_public(request.method().as_str(), request.uri().path())
        {
            debug!("public route");
            let response = forward(request).await;
            return GuardOutcome::Forwarded {
                jar: CookieJar::new(),
                response,
            };
        }

        let (parts, body) = request.into_parts();
        let mut jar = CookieJar::from_headers(&parts.headers);

        if self.store.read(&jar).access_token().is_none() {
            debug!("no access token");
            return GuardOutcome::Redirect { jar };
        }

        let body = match axum::body::to_bytes(body, self.max_body_bytes).await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, limit = self.max_body_bytes, "request body not buffered");
                return GuardOutcome::PayloadTooLarge;
            }
        };
        let replay = ReplayableRequest::new(parts, body);

        let mut retried = false;
        loop {
            let tokens = self.store.read(&jar);
            let Some(access_token) = tokens.access_token() else {
                return GuardOutcome::Redirect { jar };
            };

            match self.identity.userinfo(access_token).await {
                Ok(user) => {
                    debug!(user = %user.sub, retried, "session valid");
                    let session = SessionContext {
                        user,
                        access_token: access_token.to_string(),
                    };
                    let response = forward(replay.build(&jar, session, retried)).await;
                    if retried || response.status() != StatusCode::UNAUTHORIZED {
                        return GuardOutcome::Forwarded { jar, response };
                    }
                    debug!("inner service rejected the access token");
                }
                Err(IdentityError::Unauthorized) => {
                    debug!(retried, "access token rejected");
                }
                Err(error) => return GuardOutcome::Provider { jar, error },
            }

            if retried {
                info!("refreshed session rejected, clearing tokens");
                return GuardOutcome::Redirect {
                    jar: self.store.clear(jar),
                };
            }

            // Only a complete token set is presented for refresh.
            let Some(current) = tokens.complete() else {
                info!("session expired without a complete token set");
                return GuardOutcome::Redirect {
                    jar: self.store.clear(jar),
                };
            };

            match self.identity.refresh(&current).await {
                Ok(refreshed) => {
                    info!("session refreshed");
                    jar = self.store.write(jar, &refreshed);
                    retried = true;
                }
                Err(error) => {
                    warn!(error = %error, "refresh failed, clearing tokens");
                    return GuardOutcome::Redirect {
                        jar: self.store.clear(jar),
                    };
                }
            }
        }
    }
}

/// Axum middleware running the [`SessionGuard`] in front of every route.
pub async fn session_guard(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    SessionGuard::new(&state)
        .run(request, move |request| next.clone().run(request))
        .await
        .into_response()
}

/// Extractor for the session attached by the guard.
///
/// Rejects with 401 when the route was not guarded, e.g. a public route.
pub struct RequireSession(pub SessionContext);

impl<S> FromRequestParts<S> for RequireSession
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionContext>()
            .cloned()
            .map(RequireSession)
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}
