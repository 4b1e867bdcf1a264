//! Child API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;

use super::{require_member, success, ApiResult};
use crate::auth::Identity;
use crate::errors::AppError;
use crate::models::{Child, ChildRequest};
use crate::AppState;

/// GET /api/families/:id/children - List children by birthdate.
pub async fn list_children(
    State(state): State<AppState>,
    identity: Identity,
    Path(family_id): Path<String>,
) -> ApiResult<Vec<Child>> {
    require_member(&state, &family_id, &identity).await?;
    success(state.repo.list_children(&family_id).await?)
}

/// POST /api/families/:id/children - Add a child.
pub async fn create_child(
    State(state): State<AppState>,
    identity: Identity,
    Path(family_id): Path<String>,
    Json(request): Json<ChildRequest>,
) -> ApiResult<Child> {
    require_member(&state, &family_id, &identity).await?;

    let child = request.validate(Utc::now().date_naive())?;
    success(state.repo.create_child(&family_id, &child).await?)
}

/// GET /api/families/:id/children/:child_id - Get a child.
pub async fn get_child(
    State(state): State<AppState>,
    identity: Identity,
    Path((family_id, child_id)): Path<(String, String)>,
) -> ApiResult<Child> {
    require_member(&state, &family_id, &identity).await?;

    match state.repo.get_child(&family_id, &child_id).await? {
        Some(child) => success(child),
        None => Err(AppError::NotFound(format!("Child {} not found", child_id))),
    }
}

/// PUT /api/families/:id/children/:child_id - Replace a child's details.
pub async fn update_child(
    State(state): State<AppState>,
    identity: Identity,
    Path((family_id, child_id)): Path<(String, String)>,
    Json(request): Json<ChildRequest>,
) -> ApiResult<Child> {
    require_member(&state, &family_id, &identity).await?;

    let child = request.validate(Utc::now().date_naive())?;
    success(
        state
            .repo
            .update_child(&family_id, &child_id, &child)
            .await?,
    )
}

/// DELETE /api/families/:id/children/:child_id - Remove a child.
pub async fn delete_child(
    State(state): State<AppState>,
    identity: Identity,
    Path((family_id, child_id)): Path<(String, String)>,
) -> ApiResult<()> {
    require_member(&state, &family_id, &identity).await?;

    state.repo.delete_child(&family_id, &child_id).await?;
    success(())
}
