//! Invite API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use super::{require_member, success, ApiResult};
use crate::auth::Identity;
use crate::errors::AppError;
use crate::models::{CreateInviteRequest, InviteLink, InvitePreview};
use crate::AppState;

/// Query parameters for the invite preview.
#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    pub token: String,
}

/// POST /api/families/:id/invites - Invite the other parent by email.
pub async fn create_invite(
    State(state): State<AppState>,
    identity: Identity,
    Path(family_id): Path<String>,
    Json(request): Json<CreateInviteRequest>,
) -> ApiResult<InviteLink> {
    require_member(&state, &family_id, &identity).await?;

    let link = state
        .invites
        .issue(&family_id, &request.email, request.role_suggested, &identity)
        .await?;
    success(link)
}

/// GET /api/families/:id/invites/preview?token= - Pending invite details for the sign-up page.
pub async fn preview_invite(
    State(state): State<AppState>,
    Path(family_id): Path<String>,
    Query(query): Query<PreviewQuery>,
) -> ApiResult<InvitePreview> {
    if query.token.trim().is_empty() {
        return Err(AppError::BadRequest("token is required".to_string()));
    }
    success(state.invites.preview(&family_id, &query.token).await?)
}
