//! rstore gateway server.
//!
//! An authentication gateway that keeps an OIDC session in HTTP-only
//! cookies and checks it in front of every protected route.

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod upstream;
