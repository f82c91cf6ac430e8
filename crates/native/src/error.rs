use std::fmt::Display;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NativeError {
    #[error("invalid route pattern: {reason}")]
    InvalidRoute { reason: String },

    #[error("path '{path}' does not match route: {reason}")]
    RouteMismatch { path: String, reason: String },
}

impl NativeError {
    pub fn invalid_route<S: Display>(str: S) -> Self {
        Self::InvalidRoute { reason: str.to_string() }
    }

    pub fn route_mismatch<P: Into<String>, S: Display>(path: P, str: S) -> Self {
        Self::RouteMismatch { path: path.into(), reason: str.to_string() }
    }
}
