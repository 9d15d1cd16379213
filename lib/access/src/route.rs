//! Public route classification.
//!
//! Every request that does not match an entry in the [`RouteTable`] is
//! protected and needs a session. Entries are written as `METHOD /path`;
//! a trailing `*` turns the entry into a prefix match.

use std::fmt;
use std::str::FromStr;

/// How an entry's path is compared with the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathMatch {
    /// The request path must equal the entry path.
    Exact,
    /// The request path must start with the entry path.
    Prefix,
}

/// A (method, path) pair reachable without a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicRoute {
    method: String,
    path: String,
    matching: PathMatch,
}

impl PublicRoute {
    /// Creates an exact-match entry.
    #[must_use]
    pub fn exact(method: &str, path: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
            matching: PathMatch::Exact,
        }
    }

    /// Creates a prefix-match entry.
    #[must_use]
    pub fn prefix(method: &str, path: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
            matching: PathMatch::Prefix,
        }
    }

    /// Returns true if the request method and path fall under this entry.
    #[must_use]
    pub fn matches(&self, method: &str, path: &str) -> bool {
        if !self.method.eq_ignore_ascii_case(method) {
            return false;
        }
        match self.matching {
            PathMatch::Exact => self.path == path,
            PathMatch::Prefix => path.starts_with(&self.path),
        }
    }

    /// Returns the HTTP method.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the path or path prefix.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the match mode.
    #[must_use]
    pub fn matching(&self) -> PathMatch {
        self.matching
    }
}

impl fmt::Display for PublicRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.matching {
            PathMatch::Exact => write!(f, "{} {}", self.method, self.path),
            PathMatch::Prefix => write!(f, "{} {}*", self.method, self.path),
        }
    }
}

/// Error returned when a route entry cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRouteError {
    /// The offending entry.
    pub entry: String,
    /// Why it was rejected.
    pub reason: &'static str,
}

impl fmt::Display for ParseRouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid public route '{}': {}", self.entry, self.reason)
    }
}

impl std::error::Error for ParseRouteError {}

impl FromStr for PublicRoute {
    type Err = ParseRouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason| ParseRouteError {
            entry: s.to_string(),
            reason,
        };

        let mut parts = s.split_whitespace();
        let method = parts.next().ok_or_else(|| err("missing method"))?;
        let path = parts.next().ok_or_else(|| err("missing path"))?;
        if parts.next().is_some() {
            return Err(err("expected 'METHOD /path'"));
        }
        if !method.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(err("method must be alphabetic"));
        }
        if !path.starts_with('/') {
            return Err(err("path must start with '/'"));
        }

        Ok(match path.strip_suffix('*') {
            Some(prefix) => Self::prefix(method, prefix),
            None => Self::exact(method, path),
        })
    }
}

/// The set of routes that bypass the session guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    routes: Vec<PublicRoute>,
}

impl RouteTable {
    /// Creates a table from explicit entries.
    #[must_use]
    pub fn new(routes: Vec<PublicRoute>) -> Self {
        Self { routes }
    }

    /// Returns true if the request needs no session.
    #[must_use]
    pub fn is_public(&self, method: &str, path: &str) -> bool {
        self.routes.iter().any(|route| route.matches(method, path))
    }

    /// Returns the configured entries.
    #[must_use]
    pub fn routes(&self) -> &[PublicRoute] {
        &self.routes
    }
}

impl Default for RouteTable {
    /// Login initiation, the login callback and the login page.
    fn default() -> Self {
        Self::new(vec![
            PublicRoute::exact("GET", "/api/login"),
            PublicRoute::exact("GET", "/api/login/callback"),
            PublicRoute::exact("GET", "/login"),
        ])
    }
}

impl FromStr for RouteTable {
    type Err = ParseRouteError;

    /// Parses comma-separated entries, e.g. `GET /login, GET /assets/*`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }
}
