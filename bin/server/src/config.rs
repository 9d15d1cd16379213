//! Centralized gateway configuration.
//!
//! This module provides strongly-typed configuration for the gateway,
//! loaded via the `config` crate from environment variables. Nested keys
//! use a double underscore, e.g. `OIDC__CLIENT_ID` or
//! `SESSION__PUBLIC_ROUTES`.
//!
//! See [`OidcConfig`](rstore_gateway_access::OidcConfig) for the identity
//! provider settings.

use rstore_gateway_access::{OidcConfig, ParseRouteError, RouteTable};
use serde::Deserialize;

use crate::upstream::UpstreamConfig;

/// Gateway configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Session cookie and routing configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// OIDC identity provider configuration.
    pub oidc: OidcConfig,

    /// Downstream file service, if requests should be forwarded to it.
    #[serde(default)]
    pub upstream: Option<UpstreamConfig>,
}

/// Session-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Prefix for the credential cookie names (`<prefix>.access_token`, ...).
    #[serde(default = "default_cookie_prefix")]
    pub cookie_prefix: String,

    /// Whether to set the Secure flag on cookies (requires HTTPS).
    /// Defaults to true for production safety; set to false for local HTTP development.
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,

    /// Comma-separated `METHOD /path` entries reachable without a session.
    /// A trailing `*` makes an entry match by prefix.
    /// Unset means the built-in login routes.
    #[serde(default)]
    pub public_routes: Option<String>,

    /// Largest request body the guard buffers so it can replay the request
    /// after refreshing the session.
    #[serde(default = "default_max_replay_body_bytes")]
    pub max_replay_body_bytes: usize,
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_cookie_prefix() -> String {
    "rstoreui".to_string()
}

fn default_secure_cookies() -> bool {
    true
}

fn default_max_replay_body_bytes() -> usize {
    16 * 1024 * 1024
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_prefix: default_cookie_prefix(),
            secure_cookies: default_secure_cookies(),
            public_routes: None,
            max_replay_body_bytes: default_max_replay_body_bytes(),
        }
    }
}

impl SessionConfig {
    /// Builds the public route table.
    ///
    /// # Errors
    ///
    /// Returns an error if an entry in `public_routes` is malformed.
    pub fn route_table(&self) -> Result<RouteTable, ParseRouteError> {
        match &self.public_routes {
            Some(routes) => routes.parse(),
            None => Ok(RouteTable::default()),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
