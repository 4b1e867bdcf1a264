//! Schedule rule API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::{require_member, success, ApiResult};
use crate::auth::Identity;
use crate::errors::AppError;
use crate::models::{ParentRole, StoredRule};
use crate::rules::{self, DayAssignment};
use crate::AppState;

/// Query parameters for the owner lookup.
#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub date: String,
    pub time: Option<String>,
}

/// Who is responsible on a date, and at a time when one was given.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerResponse {
    #[serde(flatten)]
    pub assignment: DayAssignment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_at_time: Option<ParentRole>,
}

/// GET /api/families/:id/schedule-rule - The family's active rule.
pub async fn get_rule(
    State(state): State<AppState>,
    identity: Identity,
    Path(family_id): Path<String>,
) -> ApiResult<StoredRule> {
    require_member(&state, &family_id, &identity).await?;

    match state.repo.get_rule(&family_id).await? {
        Some(rule) => success(rule),
        None => Err(AppError::NotFound(
            "No schedule rule configured".to_string(),
        )),
    }
}

/// PUT /api/families/:id/schedule-rule - Replace the active rule.
pub async fn put_rule(
    State(state): State<AppState>,
    identity: Identity,
    Path(family_id): Path<String>,
    Json(document): Json<serde_json::Value>,
) -> ApiResult<StoredRule> {
    require_member(&state, &family_id, &identity).await?;

    let rule = rules::parse_and_validate(document)?;
    success(state.repo.save_rule(&family_id, &rule).await?)
}

/// GET /api/families/:id/schedule/owner?date=&time= - Evaluate the active rule.
///
/// A stored rule with `active: false` answers like a missing one.
pub async fn get_owner(
    State(state): State<AppState>,
    identity: Identity,
    Path(family_id): Path<String>,
    Query(query): Query<OwnerQuery>,
) -> ApiResult<OwnerResponse> {
    require_member(&state, &family_id, &identity).await?;

    let date = rules::parse_calendar_date(&query.date)
        .ok_or_else(|| AppError::Validation("date must be YYYY-MM-DD".to_string()))?;
    let time = query
        .time
        .as_deref()
        .map(|raw| {
            rules::parse_hhmm(raw)
                .ok_or_else(|| AppError::Validation("time must be HH:mm".to_string()))
        })
        .transpose()?;

    let stored = state
        .repo
        .get_rule(&family_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No schedule rule configured".to_string()))?;
    if !stored.rule.is_active() {
        return Err(AppError::NotFound("No active schedule rule".to_string()));
    }

    success(OwnerResponse {
        assignment: rules::assignment_on(&stored.rule, date),
        owner_at_time: time.map(|t| rules::owner_at(&stored.rule, date.and_time(t))),
        time: query.time,
    })
}
