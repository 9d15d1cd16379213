//! Core value types for the rstore authentication gateway.
//!
//! This crate provides the credential and identity types shared between the
//! access layer and the server, plus the `Result` alias used for layered
//! error reporting.

pub mod error;
pub mod token;
pub mod user;

pub use error::Result;
pub use token::{IncompleteTokenSet, StoredTokens, TokenSet};
pub use user::UserInfo;
