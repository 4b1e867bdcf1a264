//! Profile API endpoints.

use axum::{extract::State, Json};

use super::{success, ApiResult};
use crate::auth::Identity;
use crate::models::{UpdateProfileRequest, User};
use crate::AppState;

/// GET /api/me - The caller's user document, created on first visit.
pub async fn get_me(State(state): State<AppState>, identity: Identity) -> ApiResult<User> {
    success(state.repo.ensure_user(&identity).await?)
}

/// PUT /api/me - Update display name and role.
pub async fn update_me(
    State(state): State<AppState>,
    identity: Identity,
    Json(request): Json<UpdateProfileRequest>,
) -> ApiResult<User> {
    let user = state.repo.update_profile(&identity, &request).await?;
    tracing::info!(user_id = %user.id, "Profile updated");
    success(user)
}
