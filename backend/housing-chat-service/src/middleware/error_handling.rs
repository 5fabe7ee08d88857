use crate::error::AppError;
use actix_web::{http::StatusCode, HttpResponse};
use serde::{Deserialize, Serialize};

/// JSON error body returned by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status: u16,
    #[serde(rename = "type")]
    pub error_type: String,
    pub code: String,
}

pub mod error_codes {
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
    pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";
    pub const FORBIDDEN: &str = "FORBIDDEN";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const INVALID_OPERATION: &str = "INVALID_OPERATION";
    pub const EDIT_WINDOW_EXPIRED: &str = "EDIT_WINDOW_EXPIRED";
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";
}

// map domain errors to HTTP responses
pub fn map_error(err: &AppError) -> (StatusCode, ErrorResponse) {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let (error_type, code) = match err {
        AppError::BadRequest(_) => ("validation_error", error_codes::INVALID_REQUEST),
        AppError::Unauthorized => ("authentication_error", error_codes::UNAUTHENTICATED),
        AppError::Forbidden => ("authorization_error", error_codes::FORBIDDEN),
        AppError::NotFound => ("not_found_error", error_codes::NOT_FOUND),
        AppError::InvalidOperation(_) => ("validation_error", error_codes::INVALID_OPERATION),
        AppError::EditWindowExpired { .. } => {
            ("authorization_error", error_codes::EDIT_WINDOW_EXPIRED)
        }
        AppError::Database(_) => ("server_error", error_codes::DATABASE_ERROR),
        AppError::Config(_) | AppError::StartServer(_) | AppError::Internal => {
            ("server_error", error_codes::INTERNAL_SERVER_ERROR)
        }
    };

    let message = if err.is_client_error() {
        err.to_string()
    } else {
        tracing::error!(error = %err, "request failed with server error");
        "internal server error".to_string()
    };

    let response = ErrorResponse {
        error: status
            .canonical_reason()
            .unwrap_or("Error")
            .to_string(),
        message,
        status: status.as_u16(),
        error_type: error_type.to_string(),
        code: code.to_string(),
    };

    (status, response)
}

pub fn into_response(err: &AppError) -> HttpResponse {
    let (status, body) = map_error(err);
    HttpResponse::build(status).json(body)
}
