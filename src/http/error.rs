use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::application::{AppError, OperationError};

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Wrapper for converting application errors and request rejections into
/// HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    App(AppError),
    BadRequest(String),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError::App(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        let err = match self {
            ApiError::BadRequest(_) => return (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::App(err) => err,
        };

        match err {
            AppError::Unauthenticated => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN"),
            AppError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            AppError::InvalidOperation(_) => (StatusCode::BAD_REQUEST, "INVALID_OPERATION"),
            AppError::MissingOperand(_) => (StatusCode::BAD_REQUEST, "MISSING_OPERAND"),
            AppError::InvalidOperand(_) => (StatusCode::BAD_REQUEST, "INVALID_OPERAND"),
            AppError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            AppError::UsernameTaken(_) => (StatusCode::BAD_REQUEST, "USERNAME_TAKEN"),
            AppError::InsufficientBalance { .. } => {
                (StatusCode::PAYMENT_REQUIRED, "INSUFFICIENT_BALANCE")
            }
            AppError::UserNotFound(_) => (StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
            AppError::RecordNotFound(_) => (StatusCode::NOT_FOUND, "RECORD_NOT_FOUND"),
            AppError::OperationFailed(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "OPERATION_FAILED")
            }
            AppError::PersistenceFailed(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "PERSISTENCE_FAILED")
            }
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    /// Client-facing message. Store and provider errors are replaced by a
    /// generic text; the cause is only logged.
    fn message(&self) -> String {
        match self {
            ApiError::BadRequest(message) => message.clone(),
            ApiError::App(AppError::PersistenceFailed(_)) => "Failed to record operation".into(),
            ApiError::App(AppError::Database(_)) => "Internal server error".into(),
            ApiError::App(AppError::OperationFailed(OperationError::Provider(_))) => {
                "Random string provider unavailable".into()
            }
            ApiError::App(AppError::RecordNotFound(_)) => "Record not found".into(),
            ApiError::App(AppError::UserNotFound(_)) => "User not found".into(),
            ApiError::App(AppError::InsufficientBalance { .. }) => "Insufficient balance".into(),
            ApiError::App(err) => err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            if let ApiError::App(err) = &self {
                tracing::error!(error = %err, code, "request failed");
            }
        }

        (
            status,
            Json(ErrorResponse {
                error: self.message(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}
