//! Startup error types.

use std::fmt;

/// Errors that stop the gateway from starting.
#[derive(Debug)]
pub enum StartupError {
    /// Configuration could not be loaded.
    Config { details: String },
    /// The public route table is malformed.
    Routes { details: String },
    /// The identity provider could not be reached or is misconfigured.
    Identity { details: String },
    /// The listener could not be bound.
    Bind { addr: String, details: String },
    /// The server stopped with an error.
    Serve { details: String },
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { details } => write!(f, "failed to load configuration: {details}"),
            Self::Routes { details } => write!(f, "invalid public routes: {details}"),
            Self::Identity { details } => {
                write!(f, "failed to initialize identity provider: {details}")
            }
            Self::Bind { addr, details } => write!(f, "failed to bind to '{addr}': {details}"),
            Self::Serve { details } => write!(f, "server error: {details}"),
        }
    }
}

impl std::error::Error for StartupError {}
