//! In-memory identity provider and cookie helpers for handler tests.

use async_trait::async_trait;
use axum::http::header;
use axum::response::Response;
use axum_extra::extract::cookie::Cookie;
use rstore_gateway_access::{IdentityError, RouteTable};
use rstore_gateway_core::{TokenSet, UserInfo};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::AppState;
use super::cookies::TokenStore;
use super::identity::{AuthState, AuthorizationRequest, IdentityProvider};

pub const PREFIX: &str = "rstoreui";
pub const CALLBACK_CODE: &str = "good-code";
pub const CSRF_TOKEN: &str = "csrf-1";

pub fn tokens() -> TokenSet {
    TokenSet::new("accessToken", "idToken", "refreshToken").expect("complete")
}

pub fn refreshed_tokens() -> TokenSet {
    TokenSet::new("new_accessToken", "new_idToken", "new_refreshToken").expect("complete")
}

/// Identity provider driven by a fixed script that records its calls.
pub struct ScriptedIdentity {
    accepted: Mutex<HashSet<String>>,
    userinfo_error: Option<IdentityError>,
    refresh_result: Result<TokenSet, IdentityError>,
    accept_refreshed: bool,
    userinfo_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    exchange_calls: AtomicUsize,
    password_calls: AtomicUsize,
}

impl ScriptedIdentity {
    /// Accepts `accessToken`; refresh yields [`refreshed_tokens`].
    pub fn new() -> Self {
        Self::accepting(&["accessToken"])
    }

    pub fn accepting(tokens: &[&str]) -> Self {
        Self {
            accepted: Mutex::new(tokens.iter().map(|t| t.to_string()).collect()),
            userinfo_error: None,
            refresh_result: Ok(refreshed_tokens()),
            accept_refreshed: true,
            userinfo_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            exchange_calls: AtomicUsize::new(0),
            password_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_refresh(mut self, result: Result<TokenSet, IdentityError>) -> Self {
        self.refresh_result = result;
        self
    }

    pub fn with_userinfo_error(mut self, error: IdentityError) -> Self {
        self.userinfo_error = Some(error);
        self
    }

    /// Stops accepting access tokens issued by refresh.
    pub fn reject_refreshed(mut self) -> Self {
        self.accept_refreshed = false;
        self
    }

    pub fn userinfo_calls(&self) -> usize {
        self.userinfo_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    pub fn password_calls(&self) -> usize {
        self.password_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for ScriptedIdentity {
    async fn userinfo(&self, access_token: &str) -> Result<UserInfo, IdentityError> {
        self.userinfo_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.userinfo_error {
            return Err(error.clone());
        }
        let accepted = self.accepted.lock().expect("lock");
        if accepted.contains(access_token) {
            Ok(UserInfo::new("user-1").with_email(Some("alice@example.com".to_string())))
        } else {
            Err(IdentityError::Unauthorized)
        }
    }

    async fn refresh(&self, _current: &TokenSet) -> Result<TokenSet, IdentityError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let result = self.refresh_result.clone();
        if let (Ok(tokens), true) = (&result, self.accept_refreshed) {
            self.accepted
                .lock()
                .expect("lock")
                .insert(tokens.access_token().to_string());
        }
        result
    }

    async fn authorization_url(&self) -> Result<AuthorizationRequest, IdentityError> {
        Ok(AuthorizationRequest {
            url: format!("http://idp.test/authorize?state={CSRF_TOKEN}"),
            state: AuthState {
                csrf_token: CSRF_TOKEN.to_string(),
                pkce_verifier: "verifier".to_string(),
                nonce: "nonce".to_string(),
            },
        })
    }

    async fn exchange_code(
        &self,
        code: &str,
        _state: &AuthState,
    ) -> Result<TokenSet, IdentityError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        if code == CALLBACK_CODE {
            Ok(tokens())
        } else {
            Err(IdentityError::CallbackFailed {
                reason: "invalid_grant".to_string(),
            })
        }
    }

    async fn password_grant(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TokenSet, IdentityError> {
        self.password_calls.fetch_add(1, Ordering::SeqCst);
        if username == "alice" && password == "pw" {
            Ok(tokens())
        } else {
            Err(IdentityError::Unauthorized)
        }
    }
}

pub fn store() -> TokenStore {
    TokenStore::new(PREFIX, true)
}

pub fn state(identity: Arc<ScriptedIdentity>) -> Arc<AppState> {
    Arc::new(AppState {
        identity,
        token_store: store(),
        public_routes: RouteTable::default(),
        max_replay_body_bytes: 1024,
        post_logout_redirect_uri: "/login".to_string(),
        upstream: None,
    })
}

/// Renders a token set as a `Cookie` request header value.
pub fn cookie_header(tokens: &TokenSet) -> String {
    format!(
        "{PREFIX}.access_token={}; {PREFIX}.refresh_token={}; {PREFIX}.id_token={}",
        tokens.access_token(),
        tokens.refresh_token(),
        tokens.id_token()
    )
}

/// Parses every `Set-Cookie` header of a response.
pub fn set_cookies(response: &Response) -> Vec<Cookie<'static>> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| {
            Cookie::parse(value.to_str().expect("ascii").to_string()).expect("valid Set-Cookie")
        })
        .collect()
}

/// Returns the value set for `name`, if the response sets it.
pub fn set_cookie_value(response: &Response, name: &str) -> Option<String> {
    set_cookies(response)
        .into_iter()
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
}

/// Like [`state`], with a custom public route table.
pub fn state_with_routes(identity: Arc<ScriptedIdentity>, routes: &str) -> Arc<AppState> {
    Arc::new(AppState {
        identity,
        token_store: store(),
        public_routes: routes.parse().expect("route table"),
        max_replay_body_bytes: 1024,
        post_logout_redirect_uri: "/login".to_string(),
        upstream: None,
    })
}
