//! Authentication routes for login, callback, and logout.

use axum::{
    Form, Json,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use rstore_gateway_access::IdentityError;
use rstore_gateway_core::UserInfo;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use super::AppState;
use super::guard::RequireSession;

const LOGIN_FAILED_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>Login failed</title></head>
<body>
<h1>Login failed</h1>
<p>We could not complete your sign-in. <a href="/login">Try again</a>.</p>
</body>
</html>
"#;

/// Query parameters for the OIDC callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Legacy login form.
#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginInit {
    #[serde(rename = "authUrl")]
    auth_url: String,
}

/// Returns the identity provider URL the browser should visit.
#[instrument(skip_all)]
pub async fn login_init(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<LoginInit>), LoginError> {
    let request = state.identity.authorization_url().await?;

    let jar = state
        .token_store
        .store_auth_state(jar, &request.state)
        .map_err(|e| LoginError::Internal(format!("failed to serialize auth state: {e}")))?;

    Ok((jar, Json(LoginInit {
        auth_url: request.url,
    })))
}

/// Handles the OIDC callback after the user authenticates with the identity provider.
#[instrument(skip_all)]
pub async fn login_callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), LoginError> {
    if let Some(error) = query.error {
        return Err(LoginError::callback(format!("provider returned '{error}'")));
    }

    let code = query
        .code
        .filter(|code| !code.is_empty())
        .ok_or_else(|| LoginError::callback("missing authorization code"))?;

    let auth_state = state
        .token_store
        .read_auth_state(&jar)
        .ok_or_else(|| LoginError::callback("missing auth state"))?;

    if query.state.as_deref() != Some(auth_state.csrf_token.as_str()) {
        return Err(LoginError::callback("CSRF token mismatch"));
    }

    let tokens = state.identity.exchange_code(&code, &auth_state).await?;
    info!("login completed");

    let jar = state.token_store.write(jar, &tokens);
    let jar = state.token_store.clear_auth_state(jar);

    Ok((jar, Redirect::to("/")))
}

/// Form login through the resource-owner password grant.
#[instrument(skip_all)]
pub async fn password_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<(CookieJar, Redirect), LoginError> {
    let username = form.username.trim();
    if username.is_empty() || form.password.trim().is_empty() {
        return Err(LoginError::Validation);
    }

    let tokens = state
        .identity
        .password_grant(username, &form.password)
        .await?;
    info!("password login completed");

    Ok((state.token_store.write(jar, &tokens), Redirect::to("/")))
}

/// Clears the session cookies.
pub async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    (
        state.token_store.clear(jar),
        Redirect::to(&state.post_logout_redirect_uri),
    )
}

/// Returns the user the guard verified for this request.
pub async fn me(RequireSession(session): RequireSession) -> Json<UserInfo> {
    Json(session.user)
}

/// Login handler errors.
#[derive(Debug)]
pub enum LoginError {
    /// Blank username or password.
    Validation,
    /// The provider rejected the credentials.
    InvalidCredentials,
    /// The authorization-code callback could not be completed.
    Callback { reason: String },
    /// The identity provider could not be consulted.
    Identity(IdentityError),
    /// The gateway failed to build its own response.
    Internal(String),
}

impl LoginError {
    fn callback(reason: impl Into<String>) -> Self {
        Self::Callback {
            reason: reason.into(),
        }
    }
}

impl From<IdentityError> for LoginError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::CallbackFailed { reason } => Self::Callback { reason },
            IdentityError::Unauthorized => Self::InvalidCredentials,
            other => Self::Identity(other),
        }
    }
}

impl IntoResponse for LoginError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation => {
                (StatusCode::BAD_REQUEST, Json(json!({ "invalid": true }))).into_response()
            }
            Self::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, Json(json!({ "invalid": true }))).into_response()
            }
            Self::Callback { reason } => {
                warn!(reason = %reason, "login callback failed");
                (StatusCode::UNAUTHORIZED, Html(LOGIN_FAILED_PAGE)).into_response()
            }
            Self::Identity(err) => {
                error!(error = %err, "identity provider error during login");
                (StatusCode::BAD_GATEWAY, "Identity provider unavailable").into_response()
            }
            Self::Internal(msg) => {
                error!("login failed: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}
