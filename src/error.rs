use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::card_export::ExportError;
use crate::services::portal_api::PortalApiError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Backend API error: {0}")]
    Backend(#[from] PortalApiError),

    #[error("Card export failed: {0}")]
    Export(#[from] ExportError),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let error_debug = format!("{:?}", self);

        let (status, error_message) = match self {
            AppError::Backend(PortalApiError::Unauthorized) => {
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
            AppError::Backend(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
            AppError::Export(ExportError::ValidityExpired(_)) => (
                StatusCode::GONE,
                "The validity window for this card has ended".to_string(),
            ),
            AppError::Export(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error generating ID card".to_string(),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };

        let body = Json(json!({
            "error": error_debug,
            "message": error_message,
        }));

        (status, body).into_response()
    }
}
