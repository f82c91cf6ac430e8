use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

/// Failure of the body ingestion operation.
#[derive(Debug, Error)]
pub enum BodyError {
    /// The last chunk did not arrive before the deadline. `partial` holds what
    /// arrived in time; it is also committed as the raw body of the request.
    #[error("request body not received within {}ms, got {} bytes", .timeout.as_millis(), .partial.len())]
    TimedOut { partial: Bytes, timeout: Duration },

    #[error("connection aborted while receiving request body")]
    Aborted,

    #[error("request body has already been read")]
    AlreadyRead,
}

impl BodyError {
    /// A timeout carrying the bytes received before the deadline.
    pub fn timed_out(partial: Bytes, timeout: Duration) -> Self {
        Self::TimedOut { partial, timeout }
    }

    /// The bytes received before the failure, if any were kept.
    pub fn partial(&self) -> Option<&Bytes> {
        match self {
            BodyError::TimedOut { partial, .. } => Some(partial),
            BodyError::Aborted | BodyError::AlreadyRead => None,
        }
    }
}

/// Failure of a request accessor that decodes or touches the connection.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("body error: {source}")]
    Body {
        #[from]
        source: BodyError,
    },

    #[error("request has no body")]
    MissingBody,

    #[error("invalid json body: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("invalid form body: {source}")]
    Form {
        #[from]
        source: serde_urlencoded::de::Error,
    },

    #[error("invalid query string: {source}")]
    Query {
        #[from]
        source: serde_qs::Error,
    },

    #[error("connection aborted, response can't be written")]
    Aborted,
}
