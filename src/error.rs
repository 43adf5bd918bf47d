//! Error types for Accueil server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{lifecycle::{EventStatus, InvalidSchedule}, store::StoreError};

/// Stable error codes returned to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotFound = 2,
    BadValue = 3,
    StoreFailure = 4,
    StoreTimeout = 5,
    EventClosed = 6,
    AlreadyCheckedIn = 7,
    AlreadyCancelled = 8,
    Duplicate = 9,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid visitor data: {0}")]
    InvalidVisitorData(String),

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(#[from] InvalidSchedule),

    #[error("Event {event_id} is {status} and no longer accepts registrations")]
    EventNotAcceptingRegistrations { event_id: Uuid, status: EventStatus },

    #[error("Registration {0} is already checked in")]
    AlreadyCheckedIn(String),

    #[error("Registration {0} is already cancelled")]
    AlreadyCancelled(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Transient failures the caller may retry; business rule and
    /// validation failures are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Store(e) => e.is_transient(),
            _ => false,
        }
    }

    fn parts(&self) -> (StatusCode, ErrorCode) {
        match self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NotFound),
            AppError::Validation(_)
            | AppError::InvalidVisitorData(_)
            | AppError::InvalidSchedule(_) => (StatusCode::BAD_REQUEST, ErrorCode::BadValue),
            AppError::EventNotAcceptingRegistrations { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, ErrorCode::EventClosed)
            }
            AppError::AlreadyCheckedIn(_) => (StatusCode::CONFLICT, ErrorCode::AlreadyCheckedIn),
            AppError::AlreadyCancelled(_) => (StatusCode::CONFLICT, ErrorCode::AlreadyCancelled),
            AppError::Conflict(_) => (StatusCode::CONFLICT, ErrorCode::Duplicate),
            AppError::Store(StoreError::NotFound(_)) => (StatusCode::NOT_FOUND, ErrorCode::NotFound),
            AppError::Store(StoreError::Timeout) => {
                (StatusCode::GATEWAY_TIMEOUT, ErrorCode::StoreTimeout)
            }
            AppError::Store(e) if e.is_transient() => {
                (StatusCode::SERVICE_UNAVAILABLE, ErrorCode::StoreFailure)
            }
            AppError::Store(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Failure)
            }
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
    /// Whether retrying the same request may succeed
    pub retryable: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        let message = match &self {
            AppError::Store(e) => {
                tracing::error!("Store error: {:?}", e);
                "Something went wrong, please try again".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
            retryable: self.is_retryable(),
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
