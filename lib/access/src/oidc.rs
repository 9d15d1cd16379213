//! OIDC (OpenID Connect) configuration.
//!
//! This module provides configuration types for connecting to the external
//! identity provider that issues the gateway's session tokens.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::IdentityError;

/// Configuration for the OIDC identity provider.
///
/// Fields with defaults can be omitted when loading from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcConfig {
    /// The authority (issuer) URL, used for OIDC discovery.
    authority_url: String,
    /// The OAuth2 client ID registered with the provider.
    client_id: String,
    /// The OAuth2 client secret.
    client_secret: String,
    /// The redirect URI for the authorization-code callback.
    redirect_uri: String,
    /// Where the browser is sent after logout.
    /// Default: "/login"
    #[serde(default = "default_post_logout_redirect_uri")]
    post_logout_redirect_uri: String,
    /// OAuth2 response type. Only the authorization-code flow is supported.
    /// Default: "code"
    #[serde(default = "default_response_type")]
    response_type: String,
    /// Base scopes as a comma-separated string.
    /// Default: "openid,email,roles"
    #[serde(default = "default_scopes")]
    scopes: String,
    /// Deployment-specific scopes appended to the base scopes,
    /// separated by commas or whitespace.
    #[serde(default)]
    additional_scopes: String,
    /// Upper bound for every call to the provider, in seconds.
    /// Default: 10
    #[serde(default = "default_request_timeout_secs")]
    request_timeout_secs: u64,
}

fn default_post_logout_redirect_uri() -> String {
    "/login".to_string()
}

fn default_response_type() -> String {
    "code".to_string()
}

fn default_scopes() -> String {
    "openid,email,roles".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl OidcConfig {
    /// Creates a new OIDC configuration with defaults for optional fields.
    #[must_use]
    pub fn new(
        authority_url: String,
        client_id: String,
        client_secret: String,
        redirect_uri: String,
    ) -> Self {
        Self {
            authority_url,
            client_id,
            client_secret,
            redirect_uri,
            post_logout_redirect_uri: default_post_logout_redirect_uri(),
            response_type: default_response_type(),
            scopes: default_scopes(),
            additional_scopes: String::new(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }

    /// Creates a configuration builder for more customization.
    #[must_use]
    pub fn builder(
        authority_url: String,
        client_id: String,
        client_secret: String,
        redirect_uri: String,
    ) -> OidcConfigBuilder {
        OidcConfigBuilder::new(authority_url, client_id, client_secret, redirect_uri)
    }

    /// Checks the settings that discovery cannot catch.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Configuration`] for an unsupported response
    /// type, a zero timeout, or a blank client ID.
    pub fn validate(&self) -> Result<(), IdentityError> {
        if self.response_type != "code" {
            return Err(IdentityError::Configuration {
                reason: format!(
                    "unsupported response type '{}', only 'code' is supported",
                    self.response_type
                ),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(IdentityError::Configuration {
                reason: "request timeout must be at least one second".to_string(),
            });
        }
        if self.client_id.trim().is_empty() {
            return Err(IdentityError::Configuration {
                reason: "client id is empty".to_string(),
            });
        }
        Ok(())
    }

    /// Returns the authority URL.
    #[must_use]
    pub fn authority_url(&self) -> &str {
        &self.authority_url
    }

    /// Returns the OAuth2 client ID.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the OAuth2 client secret.
    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Returns the OAuth2 redirect URI.
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Returns the post-logout redirect URI.
    #[must_use]
    pub fn post_logout_redirect_uri(&self) -> &str {
        &self.post_logout_redirect_uri
    }

    /// Returns the OAuth2 response type.
    #[must_use]
    pub fn response_type(&self) -> &str {
        &self.response_type
    }

    /// Returns the scopes to request: base scopes followed by additional
    /// scopes, without duplicates.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        let mut scopes: Vec<&str> = Vec::new();
        let base = self.scopes.split(',');
        let additional = self
            .additional_scopes
            .split(|c: char| c == ',' || c.is_whitespace());
        for scope in base.chain(additional).map(str::trim) {
            if !scope.is_empty() && !scopes.contains(&scope) {
                scopes.push(scope);
            }
        }
        scopes
    }

    /// Returns the timeout applied to every provider call.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Builder for `OidcConfig`.
#[derive(Debug)]
pub struct OidcConfigBuilder {
    authority_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    post_logout_redirect_uri: String,
    scopes: Vec<String>,
    request_timeout_secs: u64,
}

impl OidcConfigBuilder {
    /// Creates a new builder with required fields.
    #[must_use]
    pub fn new(
        authority_url: String,
        client_id: String,
        client_secret: String,
        redirect_uri: String,
    ) -> Self {
        Self {
            authority_url,
            client_id,
            client_secret,
            redirect_uri,
            post_logout_redirect_uri: default_post_logout_redirect_uri(),
            scopes: vec![
                "openid".to_string(),
                "email".to_string(),
                "roles".to_string(),
            ],
            request_timeout_secs: default_request_timeout_secs(),
        }
    }

    /// Adds a scope to the list of scopes to request.
    #[must_use]
    pub fn add_scope(mut self, scope: String) -> Self {
        if !self.scopes.contains(&scope) {
            self.scopes.push(scope);
        }
        self
    }

    /// Sets the post-logout redirect URI.
    #[must_use]
    pub fn post_logout_redirect_uri(mut self, uri: String) -> Self {
        self.post_logout_redirect_uri = uri;
        self
    }

    /// Sets the provider call timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Builds the `OidcConfig`.
    #[must_use]
    pub fn build(self) -> OidcConfig {
        OidcConfig {
            authority_url: self.authority_url,
            client_id: self.client_id,
            client_secret: self.client_secret,
            redirect_uri: self.redirect_uri,
            post_logout_redirect_uri: self.post_logout_redirect_uri,
            response_type: default_response_type(),
            scopes: self.scopes.join(","),
            additional_scopes: String::new(),
            request_timeout_secs: self.request_timeout_secs,
        }
    }
}
