//! Family API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{require_member, success, ApiResult};
use crate::auth::Identity;
use crate::errors::AppError;
use crate::models::{CreateFamilyRequest, Family};
use crate::AppState;

/// POST /api/families - Create a family and link the caller to it.
pub async fn create_family(
    State(state): State<AppState>,
    identity: Identity,
    Json(request): Json<CreateFamilyRequest>,
) -> ApiResult<Family> {
    let family = state
        .ledger
        .create_family(&identity, &request.name, &request.timezone)
        .await?;
    success(family)
}

/// GET /api/families/:id - Get a family.
pub async fn get_family(
    State(state): State<AppState>,
    identity: Identity,
    Path(family_id): Path<String>,
) -> ApiResult<Family> {
    require_member(&state, &family_id, &identity).await?;

    match state.repo.get_family(&family_id).await? {
        Some(family) => success(family),
        None => Err(AppError::NotFound(format!(
            "Family {} not found",
            family_id
        ))),
    }
}
