//! Maps `common::error::ApiError` onto HTTP responses. Kept here rather than
//! in `common` so that crate stays free of an `axum` dependency.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::error::ApiError;
use serde_json::json;

pub struct ApiErrorResponse(pub ApiError);

impl From<ApiError> for ApiErrorResponse {
    fn from(e: ApiError) -> Self {
        Self(e)
    }
}

impl From<anyhow::Error> for ApiErrorResponse {
    fn from(e: anyhow::Error) -> Self {
        Self(ApiError::from(e))
    }
}

impl From<store::StoreError> for ApiErrorResponse {
    fn from(e: store::StoreError) -> Self {
        let mapped = match e {
            store::StoreError::NotFound => ApiError::NotFound,
            other => ApiError::Internal(other.to_string()),
        };
        Self(mapped)
    }
}

impl From<auth::AuthError> for ApiErrorResponse {
    fn from(_: auth::AuthError) -> Self {
        Self(ApiError::Unauthorized)
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
