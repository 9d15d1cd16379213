//! Identity returned by the provider's userinfo endpoint.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Claims describing the user behind a verified access token.
///
/// Attached to the request after validation and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Subject identifier issued by the provider.
    pub sub: String,
    /// Email address, if released by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Full name, if released by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Preferred username, if released by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    /// Any other claims returned by the provider (roles, groups, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserInfo {
    /// Creates user info with only a subject.
    #[must_use]
    pub fn new(sub: impl Into<String>) -> Self {
        Self {
            sub: sub.into(),
            email: None,
            name: None,
            preferred_username: None,
            extra: Map::new(),
        }
    }

    /// Sets the email claim.
    #[must_use]
    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email = email;
        self
    }
}
