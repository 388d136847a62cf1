//! Error taxonomy for the item lifecycle and HTTP surface.
//!
//! Every user-visible failure carries a stable machine-readable reason code
//! plus a human message. Internal failures are logged with detail server-side
//! and surfaced to the caller only as an opaque code.
//!
//! "Not yet unlockable" is deliberately absent here: it is a normal outcome of
//! reading a locked item, not an error.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

use crate::crypto::CipherError;

/// Wire format for error responses: `{"error": {"code", "message"}}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed input. Never retryable.
    #[error("{message}")]
    Validation {
        code: &'static str,
        message: String,
    },

    #[error("item not found")]
    ItemNotFound,

    #[error("token not found")]
    TokenNotFound,

    /// Missing/invalid/inactive bearer token. The code distinguishes the
    /// cases without leaking anything else.
    #[error("{message}")]
    Unauthorized {
        code: &'static str,
        message: &'static str,
    },

    /// Optimistic-concurrency loss on extend. The caller must re-read and
    /// retry; the server never retries on its own.
    #[error("item was modified during operation, please retry")]
    Conflict,

    /// Structural cipher failure, distinct from "round not yet produced".
    /// Swallowing this into "still locked" would hide data corruption.
    #[error("decryption failed")]
    DecryptionFailure(#[source] CipherError),

    /// The randomness beacon could not be reached. Transient; nothing was
    /// written.
    #[error("randomness beacon unavailable")]
    OracleUnavailable(String),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation {
            code: "VALIDATION_ERROR",
            message: message.into(),
        }
    }

    pub fn invalid_time(message: impl Into<String>) -> Self {
        ApiError::Validation {
            code: "INVALID_TIME",
            message: message.into(),
        }
    }

    pub fn invalid_content(message: impl Into<String>) -> Self {
        ApiError::Validation {
            code: "INVALID_CONTENT",
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation { code, .. } => code,
            ApiError::ItemNotFound => "ITEM_NOT_FOUND",
            ApiError::TokenNotFound => "TOKEN_NOT_FOUND",
            ApiError::Unauthorized { code, .. } => code,
            ApiError::Conflict => "CONFLICT",
            ApiError::DecryptionFailure(_) => "DECRYPTION_FAILED",
            ApiError::OracleUnavailable(_) => "BEACON_UNAVAILABLE",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message sent to the caller. Internal variants get an opaque message;
    /// the detail only goes to the log.
    fn public_message(&self) -> String {
        match self {
            ApiError::DecryptionFailure(_) => "Failed to decrypt content".to_string(),
            ApiError::OracleUnavailable(_) => {
                "Randomness beacon is unavailable, try again later".to_string()
            }
            ApiError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::ItemNotFound | ApiError::TokenNotFound => StatusCode::NOT_FOUND,
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::DecryptionFailure(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::OracleUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            ApiError::DecryptionFailure(source) => {
                tracing::error!("structural decryption failure: {source}");
            }
            ApiError::OracleUnavailable(detail) => {
                tracing::warn!("beacon unavailable: {detail}");
            }
            ApiError::Internal(source) => {
                tracing::error!("internal error: {source:#}");
            }
            _ => {}
        }

        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: self.public_message(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(
            ApiError::validation("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::ItemNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Conflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::OracleUnavailable("down".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn internal_detail_is_not_leaked() {
        let err = ApiError::Internal(anyhow::anyhow!("secret database path"));
        assert_eq!(err.public_message(), "Internal server error");
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }
}
