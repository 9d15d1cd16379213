//! Error types for identity provider operations.
//!
//! The variants split into two groups that callers must treat differently:
//! - session failures (`Unauthorized`, `RefreshFailed`, `CallbackFailed`)
//!   mean the credentials are bad and the user has to log in again
//! - infrastructure failures (`Provider`, `Configuration`) say nothing about
//!   the credentials and must not cause them to be discarded

use std::fmt;

/// Errors from calls to the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// The access token is missing, invalid or expired.
    Unauthorized,
    /// The provider rejected the refresh token.
    RefreshFailed { reason: String },
    /// The authorization-code callback could not be completed.
    CallbackFailed { reason: String },
    /// Network failure, timeout or unexpected response from the provider.
    Provider { reason: String },
    /// The gateway is misconfigured for this provider.
    Configuration { reason: String },
}

impl IdentityError {
    /// Returns true if the error means the presented credentials are unusable.
    #[must_use]
    pub fn is_session_failure(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized | Self::RefreshFailed { .. } | Self::CallbackFailed { .. }
        )
    }

    pub(crate) fn provider(reason: impl fmt::Display) -> Self {
        Self::Provider {
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized => write!(f, "access token rejected by identity provider"),
            Self::RefreshFailed { reason } => write!(f, "token refresh failed: {reason}"),
            Self::CallbackFailed { reason } => write!(f, "login callback failed: {reason}"),
            Self::Provider { reason } => write!(f, "identity provider error: {reason}"),
            Self::Configuration { reason } => {
                write!(f, "identity provider configuration error: {reason}")
            }
        }
    }
}

impl std::error::Error for IdentityError {}

impl From<rstore_gateway_core::IncompleteTokenSet> for IdentityError {
    fn from(err: rstore_gateway_core::IncompleteTokenSet) -> Self {
        Self::provider(err)
    }
}
