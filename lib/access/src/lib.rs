//! Access policy for the rstore authentication gateway.
//!
//! This crate provides:
//! - Identity provider configuration (`OidcConfig`)
//! - Public route classification (`RouteTable`, `PublicRoute`)
//! - The identity error taxonomy (`IdentityError`)
//!
//! # Example
//!
//! ```
//! use rstore_gateway_access::{OidcConfig, RouteTable};
//!
//! let config = OidcConfig::builder(
//!     "https://idp.example.com/realms/rstore".to_string(),
//!     "rstore-ui".to_string(),
//!     "secret".to_string(),
//!     "https://files.example.com/api/login/callback".to_string(),
//! )
//! .add_scope("offline_access".to_string())
//! .build();
//!
//! assert!(config.scopes().contains(&"openid"));
//!
//! let routes = RouteTable::default();
//! assert!(routes.is_public("GET", "/login"));
//! assert!(!routes.is_public("POST", "/login"));
//! ```

pub mod error;
pub mod oidc;
pub mod route;

pub use error::IdentityError;
pub use oidc::{OidcConfig, OidcConfigBuilder};
pub use route::{ParseRouteError, PathMatch, PublicRoute, RouteTable};
