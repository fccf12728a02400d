use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

/// The error body returned to clients for every failed request.
#[derive(Serialize)]
pub struct ErrorRep {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorRep {
    pub fn message(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }
}

pub enum ApiError {
    BadRequest(ErrorRep),
    Unauthorized,
    NotFound(ErrorRep),
    Conflict(ErrorRep),
    InternalServerError,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(rep) => (StatusCode::BAD_REQUEST, Json(rep)).into_response(),
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(ErrorRep::message("Authentication required.")),
            )
                .into_response(),
            Self::NotFound(rep) => (StatusCode::NOT_FOUND, Json(rep)).into_response(),
            Self::Conflict(rep) => (StatusCode::CONFLICT, Json(rep)).into_response(),
            Self::InternalServerError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorRep::message("Internal server error.")),
            )
                .into_response(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        error!(?error, "Received error.");

        Self::InternalServerError
    }
}

pub type ApiResponse<T> = Result<T, ApiError>;
