//! Session credentials.
//!
//! A session is carried by three opaque bearer strings. [`TokenSet`] is the
//! complete triple and can only be built with every field present, so a
//! partially populated session can never be handed to code that expects an
//! authenticated one. [`StoredTokens`] is what a request actually carries:
//! any of its fields may be empty.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error returned when a token set is missing one or more credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncompleteTokenSet {
    /// Names of the fields that were empty.
    pub missing: Vec<&'static str>,
}

impl fmt::Display for IncompleteTokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "incomplete token set, missing: {}", self.missing.join(", "))
    }
}

impl std::error::Error for IncompleteTokenSet {}

/// A complete access/ID/refresh token triple representing one session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    access_token: String,
    id_token: String,
    refresh_token: String,
}

impl TokenSet {
    /// Creates a token set, rejecting empty credentials.
    ///
    /// # Errors
    ///
    /// Returns [`IncompleteTokenSet`] naming every empty field.
    pub fn new(
        access_token: impl Into<String>,
        id_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Result<Self, IncompleteTokenSet> {
        let access_token = access_token.into();
        let id_token = id_token.into();
        let refresh_token = refresh_token.into();

        let missing: Vec<&'static str> = [
            ("access_token", &access_token),
            ("id_token", &id_token),
            ("refresh_token", &refresh_token),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            return Err(IncompleteTokenSet { missing });
        }

        Ok(Self {
            access_token,
            id_token,
            refresh_token,
        })
    }

    /// Returns the access token.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Returns the ID token.
    #[must_use]
    pub fn id_token(&self) -> &str {
        &self.id_token
    }

    /// Returns the refresh token.
    #[must_use]
    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }
}

// Credentials must never end up in logs.
impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"<redacted>")
            .field("id_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Credentials as read from a request. Missing values are empty strings;
/// blank values count as absent.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct StoredTokens {
    pub access_token: String,
    pub id_token: String,
    pub refresh_token: String,
}

impl StoredTokens {
    /// Returns the access token if one is present.
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        non_empty(&self.access_token)
    }

    /// Returns the refresh token if one is present.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        non_empty(&self.refresh_token)
    }

    /// Returns the ID token if one is present.
    #[must_use]
    pub fn id_token(&self) -> Option<&str> {
        non_empty(&self.id_token)
    }

    /// Returns the complete token set, or `None` if any credential is missing.
    #[must_use]
    pub fn complete(&self) -> Option<TokenSet> {
        TokenSet::new(
            self.access_token.clone(),
            self.id_token.clone(),
            self.refresh_token.clone(),
        )
        .ok()
    }
}

impl From<TokenSet> for StoredTokens {
    fn from(tokens: TokenSet) -> Self {
        Self {
            access_token: tokens.access_token,
            id_token: tokens.id_token,
            refresh_token: tokens.refresh_token,
        }
    }
}

impl fmt::Debug for StoredTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredTokens")
            .field("access_token", &self.access_token().is_some())
            .field("id_token", &self.id_token().is_some())
            .field("refresh_token", &self.refresh_token().is_some())
            .finish()
    }
}

fn non_empty(value: &str) -> Option<&str> {
    if value.trim().is_empty() { None } else { Some(value) }
}
