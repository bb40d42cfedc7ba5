//! HTTP-facing error taxonomy
//!
//! Every failure a route can produce, with the status code and JSON body it
//! maps to.

use crate::db::DbError;
use serde::Serialize;
use thiserror::Error;

/// JSON body for error responses: `{"error": "..."}`
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

/// Errors returned by the API routes
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request body or query does not have the expected shape
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Not found")]
    NotFound,

    /// Any failure from the persistence layer
    #[error("{0}")]
    Storage(#[from] DbError),
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::MalformedRequest(_) => 400,
            ApiError::PayloadTooLarge { .. } => 413,
            ApiError::NotFound => 404,
            ApiError::Storage(_) => 500,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::MalformedRequest("x".into()).status_code(), 400);
        assert_eq!(ApiError::PayloadTooLarge { limit: 10 }.status_code(), 413);
        assert_eq!(ApiError::NotFound.status_code(), 404);
        assert_eq!(
            ApiError::Storage(DbError::Connection("gone".into())).status_code(),
            500
        );
    }

    #[test]
    fn test_storage_body_carries_failure_detail() {
        let err = ApiError::from(DbError::Connection("disk I/O error".into()));
        let json = serde_json::to_string(&err.body()).unwrap();
        assert_eq!(json, r#"{"error":"Connection error: disk I/O error"}"#);
    }

    #[test]
    fn test_malformed_body_message() {
        let err = ApiError::MalformedRequest("missing field `responses`".into());
        assert_eq!(err.body().error, "Malformed request: missing field `responses`");
    }
}
