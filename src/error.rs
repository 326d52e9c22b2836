//! Error handling module
//!
//! Centralized error types and HTTP response conversion. This is the only
//! place where a domain error code is paired with an HTTP status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::api::ApiResponse;
use crate::blob::BlobStoreError;
use crate::domain::{CommunityError, MusicError, PlaylistError, SubscriptionError};
use crate::store::StorageError;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Missing member principal")]
    Unauthenticated,

    #[error("Invalid member principal: {0}")]
    InvalidPrincipal(String),

    // Domain errors
    #[error(transparent)]
    Community(#[from] CommunityError),

    #[error(transparent)]
    Music(#[from] MusicError),

    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    #[error(transparent)]
    Playlist(#[from] PlaylistError),

    // Server errors (5xx)
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Blob store error: {0}")]
    Blob(#[from] BlobStoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status and stable envelope code
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            // 400 Bad Request
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "REQ_001"),
            AppError::InvalidPrincipal(_) => (StatusCode::BAD_REQUEST, "AUTH_002"),

            // 401 Unauthorized
            AppError::Unauthenticated => (StatusCode::UNAUTHORIZED, "AUTH_001"),

            AppError::Community(e) => {
                let status = match e {
                    CommunityError::ContentRequired => StatusCode::BAD_REQUEST,
                    CommunityError::ImageTooLarge { .. } | CommunityError::UploadTooLarge { .. } => {
                        StatusCode::PAYLOAD_TOO_LARGE
                    }
                    CommunityError::UnsupportedImage(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                };
                (status, e.code())
            }

            // 404 Not Found
            AppError::Music(e) => (StatusCode::NOT_FOUND, e.code()),

            AppError::Subscription(e) => {
                let status = if e.is_not_found() {
                    StatusCode::NOT_FOUND
                } else {
                    match e {
                        SubscriptionError::InvalidPlanPrice(_) => StatusCode::BAD_REQUEST,
                        _ => StatusCode::CONFLICT,
                    }
                };
                (status, e.code())
            }

            AppError::Playlist(e) => {
                let status = match e {
                    PlaylistError::PlaylistNotFound(_) => StatusCode::NOT_FOUND,
                    PlaylistError::NotPlaylistOwner { .. } => StatusCode::FORBIDDEN,
                };
                (status, e.code())
            }

            // 500 Internal Server Error
            AppError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DB_001"),
            AppError::Blob(_) => (StatusCode::INTERNAL_SERVER_ERROR, "BLOB_001"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INT_001"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Server-side detail stays in the logs
        let message = match &self {
            AppError::Storage(e) => {
                tracing::error!(error = ?e, "Storage error");
                "A storage error occurred".to_string()
            }
            AppError::Blob(e) => {
                tracing::error!(error = ?e, "Blob store error");
                "Image upload failed".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ApiResponse::<()>::failure(code, message))).into_response()
    }
}
