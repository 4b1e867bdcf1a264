//! User document keyed by the identity provider's user id.

use serde::{Deserialize, Serialize};

use super::ParentRole;

/// A signed-in person. `family_id` moves from empty to one value and never changes again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<ParentRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Request body for updating the caller's profile.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub display_name: String,
    pub role: ParentRole,
}
