//! Family and membership documents.

use serde::{Deserialize, Serialize};

use super::ParentRole;

/// The shared family container. The timezone lives here and nowhere else.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Family {
    pub id: String,
    pub name: String,
    /// IANA timezone name, stored opaquely
    pub timezone: String,
    pub owners: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Request body for creating a family.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFamilyRequest {
    pub name: String,
    pub timezone: String,
}

/// Join record binding a user to a family, keyed by (family_id, user_id).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub family_id: String,
    pub user_id: String,
    pub role: ParentRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub joined_at: String,
}
