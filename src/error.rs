use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sqlx::migrate::MigrateError;
use thiserror::Error;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid order number: {0}")]
    InvalidOrderNumber(String),

    #[error("Order {0} has already been uploaded by another user")]
    OrderOwnedByAnotherUser(String),

    #[error("Order {0} already reached a terminal status")]
    OrderAlreadyFinalized(String),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: String, available: String },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("External error: {0}")]
    ExternalError(String),
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::InvalidOrderNumber(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_ORDER_NUMBER"),
            AppError::OrderOwnedByAnotherUser(_) => (StatusCode::CONFLICT, "ORDER_OWNED_BY_ANOTHER_USER"),
            AppError::OrderAlreadyFinalized(_) => (StatusCode::CONFLICT, "ORDER_ALREADY_FINALIZED"),
            AppError::InsufficientFunds { .. } => (StatusCode::PAYMENT_REQUIRED, "INSUFFICIENT_FUNDS"),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            AppError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            AppError::Database(_) | AppError::Migration(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR")
            }
            AppError::ExternalError(_) => (StatusCode::BAD_GATEWAY, "EXTERNAL_ERROR"),
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();

        // Storage internals stay in the logs
        let message = match &self {
            AppError::Database(_) | AppError::Migration(_) => {
                tracing::error!("{}", self);
                "A database error occurred".to_string()
            }
            AppError::Config(_) => {
                tracing::error!("{}", self);
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
        });

        (status, body).into_response()
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        AppError::ExternalError(format!("HTTP request error: {:?}", error))
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
