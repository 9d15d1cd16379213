//! Cookie-backed token store.
//!
//! The session lives entirely in the browser: three HTTP-only cookies hold
//! the access, refresh and ID tokens. The jar is taken and returned by
//! value, so a write is committed only when the caller uses the returned
//! jar, and all three cookies are replaced together.

use axum::http::HeaderValue;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use rstore_gateway_core::{StoredTokens, TokenSet};
use time::Duration as TimeDuration;

use super::identity::AuthState;

/// Lifetime of the cookie carrying the in-flight authorization state.
const AUTH_STATE_MAX_AGE_MINUTES: i64 = 10;

/// Reads and writes session credentials in a cookie jar.
#[derive(Debug, Clone)]
pub struct TokenStore {
    access_token: String,
    refresh_token: String,
    id_token: String,
    auth_state: String,
    secure: bool,
}

impl TokenStore {
    /// Creates a store whose cookie names start with `<prefix>.`.
    #[must_use]
    pub fn new(prefix: &str, secure: bool) -> Self {
        Self {
            access_token: format!("{prefix}.access_token"),
            refresh_token: format!("{prefix}.refresh_token"),
            id_token: format!("{prefix}.id_token"),
            auth_state: format!("{prefix}.auth_state"),
            secure,
        }
    }

    /// Returns the access token cookie name.
    #[must_use]
    pub fn access_token_cookie(&self) -> &str {
        &self.access_token
    }

    /// Returns the refresh token cookie name.
    #[must_use]
    pub fn refresh_token_cookie(&self) -> &str {
        &self.refresh_token
    }

    /// Returns the ID token cookie name.
    #[must_use]
    pub fn id_token_cookie(&self) -> &str {
        &self.id_token
    }

    /// Returns the authorization state cookie name.
    #[must_use]
    pub fn auth_state_cookie(&self) -> &str {
        &self.auth_state
    }

    /// Extracts the three credentials. Missing cookies become empty strings.
    #[must_use]
    pub fn read(&self, jar: &CookieJar) -> StoredTokens {
        let value = |name: &str| {
            jar.get(name)
                .map(|cookie| cookie.value().to_string())
                .unwrap_or_default()
        };

        StoredTokens {
            access_token: value(&self.access_token),
            id_token: value(&self.id_token),
            refresh_token: value(&self.refresh_token),
        }
    }

    /// Replaces all three credential cookies.
    #[must_use]
    pub fn write(&self, jar: CookieJar, tokens: &TokenSet) -> CookieJar {
        jar.add(self.session_cookie(&self.access_token, tokens.access_token()))
            .add(self.session_cookie(&self.id_token, tokens.id_token()))
            .add(self.session_cookie(&self.refresh_token, tokens.refresh_token()))
    }

    /// Deletes all three credential cookies.
    #[must_use]
    pub fn clear(&self, jar: CookieJar) -> CookieJar {
        jar.add(self.removal_cookie(&self.access_token))
            .add(self.removal_cookie(&self.id_token))
            .add(self.removal_cookie(&self.refresh_token))
    }

    /// Stores the authorization state for the login callback.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be serialized.
    pub fn store_auth_state(
        &self,
        jar: CookieJar,
        state: &AuthState,
    ) -> Result<CookieJar, serde_json::Error> {
        let value = serde_json::to_string(state)?;
        let cookie = Cookie::build((self.auth_state.clone(), value))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            // The provider redirect is a cross-site navigation, so Strict
            // would withhold this cookie from the callback.
            .same_site(SameSite::Lax)
            .max_age(TimeDuration::minutes(AUTH_STATE_MAX_AGE_MINUTES));
        Ok(jar.add(cookie))
    }

    /// Reads the authorization state stored by [`Self::store_auth_state`].
    #[must_use]
    pub fn read_auth_state(&self, jar: &CookieJar) -> Option<AuthState> {
        jar.get(&self.auth_state)
            .filter(|cookie| !cookie.value().is_empty())
            .and_then(|cookie| serde_json::from_str(cookie.value()).ok())
    }

    /// Deletes the authorization state cookie.
    #[must_use]
    pub fn clear_auth_state(&self, jar: CookieJar) -> CookieJar {
        jar.add(self.removal_cookie(&self.auth_state))
    }

    /// Renders the jar's current cookies as a `Cookie` request header.
    ///
    /// Deleted (empty) cookies are left out.
    #[must_use]
    pub fn request_header(jar: &CookieJar) -> Option<HeaderValue> {
        let pairs: Vec<String> = jar
            .iter()
            .filter(|cookie| !cookie.value().is_empty())
            .map(|cookie| format!("{}={}", cookie.name(), cookie.value()))
            .collect();

        if pairs.is_empty() {
            return None;
        }

        HeaderValue::from_str(&pairs.join("; ")).ok()
    }

    fn session_cookie(&self, name: &str, value: &str) -> Cookie<'static> {
        Cookie::build((name.to_string(), value.to_string()))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Strict)
            .build()
    }

    fn removal_cookie(&self, name: &str) -> Cookie<'static> {
        Cookie::build((name.to_string(), String::new()))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Strict)
            .max_age(TimeDuration::ZERO)
            .build()
    }
}
