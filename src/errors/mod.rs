//! Error handling module for the co-parenting backend.
//!
//! Provides the central error taxonomy with mapping to HTTP status codes and response envelopes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Error codes as constants to avoid stringly-typed errors.
pub mod codes {
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const FORBIDDEN: &str = "FORBIDDEN";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const ALREADY_LINKED: &str = "ALREADY_LINKED";
    pub const ALREADY_PENDING: &str = "ALREADY_PENDING";
    pub const INVITE_INVALID: &str = "INVITE_INVALID";
    pub const ALREADY_ACCEPTED: &str = "ALREADY_ACCEPTED";
    pub const ALREADY_LINKED_ELSEWHERE: &str = "ALREADY_LINKED_ELSEWHERE";
    pub const STORE_UNAVAILABLE: &str = "STORE_UNAVAILABLE";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
}

/// Application error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// No identity or invalid service key
    Unauthorized(String),
    /// Identity is known but not a member of the target family
    Forbidden(String),
    /// Resource not found
    NotFound(String),
    /// Malformed rule, date, time or form input; never reaches the store
    Validation(String),
    /// The user already belongs to a family
    AlreadyLinked { family_id: String },
    /// An invite for this email is still pending
    AlreadyPending { email: String },
    /// Unknown, rotated or consumed invite token
    InviteInvalid(String),
    /// Invite was consumed by a different identity
    AlreadyAccepted,
    /// Accepting user is bound to another family
    AlreadyLinkedElsewhere { family_id: String },
    /// Transaction aborted or store unreachable; safe to retry
    StoreUnavailable(String),
    /// Internal server error
    Internal(String),
    /// Bad request
    BadRequest(String),
}

impl AppError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::AlreadyLinked { .. } => StatusCode::CONFLICT,
            AppError::AlreadyPending { .. } => StatusCode::CONFLICT,
            AppError::InviteInvalid(_) => StatusCode::NOT_FOUND,
            AppError::AlreadyAccepted => StatusCode::CONFLICT,
            AppError::AlreadyLinkedElsewhere { .. } => StatusCode::CONFLICT,
            AppError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => codes::UNAUTHORIZED,
            AppError::Forbidden(_) => codes::FORBIDDEN,
            AppError::NotFound(_) => codes::NOT_FOUND,
            AppError::Validation(_) => codes::VALIDATION_ERROR,
            AppError::AlreadyLinked { .. } => codes::ALREADY_LINKED,
            AppError::AlreadyPending { .. } => codes::ALREADY_PENDING,
            AppError::InviteInvalid(_) => codes::INVITE_INVALID,
            AppError::AlreadyAccepted => codes::ALREADY_ACCEPTED,
            AppError::AlreadyLinkedElsewhere { .. } => codes::ALREADY_LINKED_ELSEWHERE,
            AppError::StoreUnavailable(_) => codes::STORE_UNAVAILABLE,
            AppError::Internal(_) => codes::INTERNAL_ERROR,
            AppError::BadRequest(_) => codes::BAD_REQUEST,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> String {
        match self {
            AppError::Unauthorized(msg) => msg.clone(),
            AppError::Forbidden(msg) => msg.clone(),
            AppError::NotFound(msg) => msg.clone(),
            AppError::Validation(msg) => msg.clone(),
            AppError::AlreadyLinked { .. } => {
                "You already have a family linked to your account".to_string()
            }
            AppError::AlreadyPending { email } => {
                format!("An invite is already pending for {}", email)
            }
            AppError::InviteInvalid(msg) => msg.clone(),
            AppError::AlreadyAccepted => {
                "Invite was already accepted by another account".to_string()
            }
            AppError::AlreadyLinkedElsewhere { .. } => {
                "Your account is already linked to a different family".to_string()
            }
            AppError::StoreUnavailable(msg) => msg.clone(),
            AppError::Internal(msg) => msg.clone(),
            AppError::BadRequest(msg) => msg.clone(),
        }
    }

    /// Whether the whole operation may simply be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::StoreUnavailable(_))
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Store error: {:?}", err);
        AppError::StoreUnavailable(format!("Store error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON error: {:?}", err);
        AppError::Internal(format!("JSON error: {}", err))
    }
}

/// Error details in the response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Error response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetails,
}

impl ErrorResponse {
    pub fn new(error: &AppError) -> Self {
        let details = match error {
            AppError::AlreadyLinked { family_id } => {
                Some(serde_json::json!({ "familyId": family_id }))
            }
            AppError::AlreadyLinkedElsewhere { family_id } => {
                Some(serde_json::json!({ "familyId": family_id }))
            }
            AppError::AlreadyPending { email } => Some(serde_json::json!({ "email": email })),
            AppError::StoreUnavailable(_) => Some(serde_json::json!({ "retryable": true })),
            _ => None,
        };

        Self {
            success: false,
            error: ErrorDetails {
                code: error.error_code().to_string(),
                message: error.message(),
                details,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse::new(&self);
        (status, Json(body)).into_response()
    }
}
