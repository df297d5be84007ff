use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub message: String,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NoWorkAvailable => StatusCode::NOT_FOUND,
            AppError::NoProxyAvailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InvalidAllocationKey(_) | AppError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::DuplicateSubmission(_) => StatusCode::CONFLICT,
            AppError::AllocationNotActive(_)
            | AppError::AllocationNotFound(_)
            | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Network(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_)
            | AppError::Io(_)
            | AppError::Serialization(_)
            | AppError::Config(_)
            | AppError::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() && !self.is_contention() {
            tracing::error!("Request failed: {}", self);
        }
        let body = ErrorBody {
            success: false,
            error: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
