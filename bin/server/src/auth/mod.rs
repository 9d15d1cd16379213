//! Authentication module for the gateway.
//!
//! This module provides:
//! - the cookie-backed token store
//! - the OIDC client and its lazily connected handle
//! - the session guard middleware and the [`RequireSession`] extractor
//! - login, callback and logout routes
//!
//! # Session model
//!
//! The gateway keeps no server-side session. The access, refresh and ID
//! tokens travel in HTTP-only cookies and every protected request is checked
//! against the provider's userinfo endpoint. When the provider or the inner
//! service rejects the access token, the guard refreshes it once and replays
//! the request; a second rejection clears the cookies and sends the browser
//! to `/login`.
//!
//! A provider outage during validation is reported as 502 and keeps the
//! session. A failed refresh always ends it.

pub mod cookies;
pub mod guard;
pub mod identity;
pub mod oidc;
pub mod routes;

#[cfg(test)]
pub(crate) mod testing;

use rstore_gateway_access::RouteTable;
use std::sync::Arc;

use crate::config::SessionConfig;
use crate::upstream::UpstreamClient;

pub use cookies::TokenStore;
pub use guard::{RequireSession, SessionContext, SessionGuard, session_guard};
pub use identity::{AuthState, AuthorizationRequest, Connect, IdentityHandle, IdentityProvider};
pub use oidc::OidcClient;
pub use routes::{login_callback, login_init, logout, me, password_login};

/// Shared application state.
pub struct AppState {
    /// Identity provider used to verify and refresh sessions.
    pub identity: Arc<dyn IdentityProvider>,
    /// Cookie names and attributes.
    pub token_store: TokenStore,
    /// Routes that need no session.
    pub public_routes: RouteTable,
    /// Largest body buffered for a replay after refresh.
    pub max_replay_body_bytes: usize,
    /// Where logout sends the browser.
    pub post_logout_redirect_uri: String,
    /// Downstream service reached through `/api/core`.
    pub upstream: Option<UpstreamClient>,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        session: &SessionConfig,
        public_routes: RouteTable,
        post_logout_redirect_uri: String,
    ) -> Self {
        Self {
            identity,
            token_store: TokenStore::new(&session.cookie_prefix, session.secure_cookies),
            public_routes,
            max_replay_body_bytes: session.max_replay_body_bytes,
            post_logout_redirect_uri,
            upstream: None,
        }
    }

    /// Enables forwarding to the downstream service.
    #[must_use]
    pub fn with_upstream(mut self, upstream: UpstreamClient) -> Self {
        self.upstream = Some(upstream);
        self
    }
}
