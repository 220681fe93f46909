//! Maps the shared `dw_domain::error::Error` to an HTTP response.
//!
//! One place, per the design notes — nothing downstream of the store or
//! executor needs to know about `StatusCode`. Grounded on the teacher's
//! per-handler `map_*_err` helpers, collapsed into a single `IntoResponse`
//! impl now that there is one shared error enum instead of one per
//! subsystem.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dw_domain::error::Error;

pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Provider { .. } => StatusCode::BAD_GATEWAY,
            Error::Tool(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::ToolLoopExhausted(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::Cancelled => StatusCode::CONFLICT,
            Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Json(_) => StatusCode::BAD_REQUEST,
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({
            "error": self.0.to_string(),
            "category": self.0.category(),
        }));
        (status, body).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
