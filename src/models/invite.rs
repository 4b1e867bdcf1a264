//! Invitation documents, one per (family, normalized email).

use serde::{Deserialize, Serialize};

use super::ParentRole;

/// Lifecycle of an invite. `Pending -> Accepted` is one-way.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    Pending,
    Accepted,
}

impl InviteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InviteStatus::Pending => "pending",
            InviteStatus::Accepted => "accepted",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(InviteStatus::Pending),
            "accepted" => Some(InviteStatus::Accepted),
            _ => None,
        }
    }
}

/// A stored invite. The token is a secret and never leaves the service in a listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Invite {
    pub family_id: String,
    pub email_key: String,
    pub email: String,
    pub role_suggested: ParentRole,
    #[serde(skip_serializing, default)]
    pub token: String,
    pub status: InviteStatus,
    pub version: i64,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<String>,
}

/// Request body for inviting the other parent.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInviteRequest {
    pub email: String,
    pub role_suggested: ParentRole,
}

/// Shareable result of issuing an invite.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteLink {
    pub family_id: String,
    pub email: String,
    pub version: i64,
    pub url: String,
}

/// What the sign-up page may learn from a pending token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitePreview {
    pub family_id: String,
    pub email: String,
    pub role_suggested: ParentRole,
}

/// Parameters carried by an invite link.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InviteParams {
    pub family: String,
    pub token: String,
}
