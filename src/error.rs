use crate::service::LedgerError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Conflict: {message}")]
    Conflict { message: String, details: Value },
    /// Well-formed request the ledger refuses; `details` is merged into the body.
    #[error("Unprocessable: {message}")]
    Unprocessable { message: String, details: Value },
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        let message = err.to_string();
        match err {
            LedgerError::InvalidAmount(_)
            | LedgerError::InvalidInput(_)
            | LedgerError::InvalidMatchCandidate => AppError::BadRequest(message),
            LedgerError::MediaNotFound(_) | LedgerError::PayoutNotFound(_) => {
                AppError::NotFound(message)
            }
            LedgerError::PayoutPending { request_id, .. } => AppError::Conflict {
                message,
                details: json!({ "requestId": request_id }),
            },
            LedgerError::PayoutClosed { request_id, status } => AppError::Conflict {
                message,
                details: json!({ "requestId": request_id, "status": status }),
            },
            LedgerError::InsufficientBalance { requested, balance } => AppError::Unprocessable {
                message,
                details: json!({
                    "reason": "insufficient_balance",
                    "requested": requested,
                    "balance": balance,
                }),
            },
            LedgerError::NotEligible {
                reason,
                remaining_to_eligible,
                balance,
            } => AppError::Unprocessable {
                message,
                details: json!({
                    "reason": reason,
                    "remainingToEligible": remaining_to_eligible,
                    "balance": balance,
                }),
            },
            LedgerError::InvalidOwnership { media_id, .. } => AppError::Unprocessable {
                message,
                details: json!({ "reason": "invalid_ownership", "mediaId": media_id }),
            },
            LedgerError::Inconsistent(_)
            | LedgerError::Money(_)
            | LedgerError::Ownership(_)
            | LedgerError::Database(_) => {
                tracing::error!(error = %message, "Ledger operation failed");
                AppError::Internal(message)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, details) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg, Value::Null),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, Value::Null),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, Value::Null),
            AppError::Conflict { message, details } => (StatusCode::CONFLICT, message, details),
            AppError::Unprocessable { message, details } => {
                (StatusCode::UNPROCESSABLE_ENTITY, message, details)
            }
        };

        let mut body = Map::new();
        body.insert("error".to_string(), Value::String(error_message));
        if let Value::Object(extra) = details {
            body.extend(extra);
        }

        (status, Json(Value::Object(body))).into_response()
    }
}
