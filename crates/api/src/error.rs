//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::ShopError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// No usable identity on the request.
    Unauthorized(String),
    /// The caller lacks the role the route requires.
    Forbidden(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Error from a shop operation.
    Shop(ShopError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, error_body(msg)),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, error_body(msg)),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, error_body(msg)),
            ApiError::Shop(err) => shop_error_to_response(err),
        };

        (status, axum::Json(body)).into_response()
    }
}

fn error_body(message: String) -> serde_json::Value {
    serde_json::json!({ "error": message })
}

fn shop_error_to_response(err: ShopError) -> (StatusCode, serde_json::Value) {
    match &err {
        ShopError::NotFound { .. } => (StatusCode::NOT_FOUND, error_body(err.to_string())),
        ShopError::EmptyCart
        | ShopError::EmptyOrder
        | ShopError::InvalidStatus(_)
        | ShopError::Cart(_)
        | ShopError::AmountOverflow => (StatusCode::BAD_REQUEST, error_body(err.to_string())),
        ShopError::Conflict { .. } => (
            StatusCode::CONFLICT,
            serde_json::json!({
                "error": "cart_concurrency",
                "message": err.to_string(),
            }),
        ),
        ShopError::Forbidden(_) => (StatusCode::FORBIDDEN, error_body(err.to_string())),
        ShopError::Store(_) => {
            tracing::error!(error = %err, "internal server error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body(err.to_string()),
            )
        }
    }
}

impl From<ShopError> for ApiError {
    fn from(err: ShopError) -> Self {
        ApiError::Shop(err)
    }
}
