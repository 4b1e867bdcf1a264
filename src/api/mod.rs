//! REST API module.
//!
//! Contains all API routes and handlers following the frontend contract.

mod acceptance;
mod children;
mod families;
mod invites;
mod members;
mod rules;
mod users;

pub use acceptance::*;
pub use children::*;
pub use families::*;
pub use invites::*;
pub use members::*;
pub use rules::*;
pub use users::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::auth::Identity;
use crate::errors::AppError;
use crate::AppState;

/// Success response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, AppError>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(ApiResponse::new(data))
}

/// Refuse family-scoped access for callers without a membership.
pub async fn require_member(
    state: &AppState,
    family_id: &str,
    identity: &Identity,
) -> Result<(), AppError> {
    if state.repo.is_member(family_id, &identity.user_id).await? {
        Ok(())
    } else {
        tracing::warn!(
            family_id = %family_id,
            user_id = %identity.user_id,
            "Family access denied"
        );
        Err(AppError::Forbidden(
            "You are not a member of this family".to_string(),
        ))
    }
}
