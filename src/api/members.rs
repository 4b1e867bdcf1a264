//! Member API endpoints.

use axum::extract::{Path, State};

use super::{require_member, success, ApiResult};
use crate::auth::Identity;
use crate::models::Membership;
use crate::AppState;

/// GET /api/families/:id/members - List the family's members.
pub async fn list_members(
    State(state): State<AppState>,
    identity: Identity,
    Path(family_id): Path<String>,
) -> ApiResult<Vec<Membership>> {
    require_member(&state, &family_id, &identity).await?;
    success(state.repo.list_members(&family_id).await?)
}
