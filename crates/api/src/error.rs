//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;
use store::{StockShortage, StoreError};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or malformed identity headers.
    Unauthorized(String),
    /// The acting identity may not touch this resource.
    Forbidden(String),
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Stock cannot cover the request; carries per-product detail.
    InsufficientStock {
        message: String,
        shortages: Vec<StockShortage>,
    },
    /// State-machine or concurrent-update conflict.
    Conflict(String),
    /// The payment gateway misbehaved.
    Gateway(String),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                serde_json::json!({ "error": msg }),
            ),
            ApiError::Forbidden(msg) => {
                (StatusCode::FORBIDDEN, serde_json::json!({ "error": msg }))
            }
            ApiError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, serde_json::json!({ "error": msg }))
            }
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg }))
            }
            ApiError::InsufficientStock { message, shortages } => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": message, "details": shortages }),
            ),
            ApiError::Conflict(msg) => {
                (StatusCode::CONFLICT, serde_json::json!({ "error": msg }))
            }
            ApiError::Gateway(msg) => {
                (StatusCode::BAD_GATEWAY, serde_json::json!({ "error": msg }))
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "error": "internal server error" }),
                )
            }
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let message = err.to_string();
        match err {
            StoreError::InsufficientStock { shortages } => {
                ApiError::InsufficientStock { message, shortages }
            }
            StoreError::EmptyCart
            | StoreError::AddressNotFound
            | StoreError::InvalidQuantity(_)
            | StoreError::OrderNotPayable { .. }
            | StoreError::DuplicateTransaction(_)
            | StoreError::AmountMismatch { .. } => ApiError::BadRequest(message),
            StoreError::ProductNotFound(_)
            | StoreError::CartLineNotFound(_)
            | StoreError::OrderNotFound(_)
            | StoreError::UnknownTransaction(_) => ApiError::NotFound(message),
            StoreError::State(_) | StoreError::Conflict(_) => ApiError::Conflict(message),
            StoreError::Corrupt(_) | StoreError::Database(_) | StoreError::Migration(_) => {
                ApiError::Internal(message)
            }
        }
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::Forbidden => ApiError::Forbidden(err.to_string()),
            CheckoutError::OrderNotFound(_) => ApiError::NotFound(err.to_string()),
            CheckoutError::Gateway(_) => ApiError::Gateway(err.to_string()),
            CheckoutError::Notification(_) => ApiError::Internal(err.to_string()),
            CheckoutError::Store(store_err) => store_err.into(),
        }
    }
}
