//! Invite acceptance endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use super::{success, ApiResult};
use crate::acceptance::{Acceptance, AcceptanceState};
use crate::auth::MaybeIdentity;
use crate::errors::AppError;
use crate::models::InviteParams;
use crate::AppState;

/// Outcome the accept page acts on.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum AcceptOutcome {
    /// Sign in, then come back through `redirect`
    SignInRequired { redirect: String },
    #[serde(rename_all = "camelCase")]
    Accepted {
        family_id: String,
        role: crate::models::ParentRole,
        replayed: bool,
    },
}

impl From<Acceptance> for AcceptOutcome {
    fn from(acceptance: Acceptance) -> Self {
        AcceptOutcome::Accepted {
            family_id: acceptance.family_id,
            role: acceptance.role,
            replayed: acceptance.replayed,
        }
    }
}

/// POST /api/invites/accept - Accept an invite as the calling user.
pub async fn accept_invite(
    State(state): State<AppState>,
    MaybeIdentity(identity): MaybeIdentity,
    Json(params): Json<InviteParams>,
) -> ApiResult<AcceptOutcome> {
    match state.acceptance.run(identity, params).await? {
        AcceptanceState::Unauthenticated { redirect, .. } => {
            success(AcceptOutcome::SignInRequired { redirect })
        }
        AcceptanceState::Accepted(acceptance) => success(acceptance.into()),
        AcceptanceState::Failed(reason) => Err(reason.into()),
        other => Err(AppError::Internal(format!(
            "Acceptance stopped in state {}",
            other.name()
        ))),
    }
}
