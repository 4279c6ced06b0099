//! Application-wide error types and their HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::models::WorkflowStatus;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Session store error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("Multipart error: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid field `{field}`: {message}")]
    Validation { field: String, message: String },

    /// No user session at all; the caller is sent back to registration.
    #[error("No active session")]
    SessionMissing,

    /// The session names a user that no longer exists in the store.
    #[error("Session refers to an unknown user")]
    SessionInvalid,

    #[error("Administrator login required")]
    AdminRequired,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Step `{step}` is not allowed while status is `{status}`")]
    OutOfOrder {
        step: &'static str,
        status: WorkflowStatus,
    },

    #[error("Conflict: {0}")]
    Conflict(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::SessionMissing | Self::AdminRequired => StatusCode::SEE_OTHER,
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::SessionInvalid | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::OutOfOrder { .. } | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Database(_)
            | Self::Migrate(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Session(_)
            | Self::Multipart(_)
            | Self::Join(_)
            | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "invalid_request",
            Self::SessionMissing => "session_missing",
            Self::SessionInvalid => "session_invalid",
            Self::AdminRequired => "admin_required",
            Self::InvalidCredentials => "invalid_credentials",
            Self::NotFound(_) => "not_found",
            Self::OutOfOrder { .. } => "out_of_order",
            Self::Conflict(_) => "conflict",
            _ => "internal_error",
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::SessionMissing => return Redirect::to("/").into_response(),
            Self::AdminRequired => return Redirect::to("/admin_login").into_response(),
            _ => {}
        }

        let status = self.status_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            // Details stay in the log.
            error!(error = %self, "request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        let field = match &self {
            Self::Validation { field, .. } => Some(field.clone()),
            _ => None,
        };

        (
            status,
            Json(ErrorResponse {
                status: "error",
                code: self.code(),
                message,
                field,
            }),
        )
            .into_response()
    }
}
