//! Data models for the co-parenting backend.
//!
//! Field names serialize in camelCase to match the frontend documents.

mod child;
mod family;
mod invite;
mod rule;
mod user;

pub use child::*;
pub use family::*;
pub use invite::*;
pub use rule::*;
pub use user::*;

use serde::{Deserialize, Serialize};

/// Which parent a user is, or which parent owns a slice of the schedule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ParentRole {
    ParentA,
    ParentB,
}

impl ParentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParentRole::ParentA => "parentA",
            ParentRole::ParentB => "parentB",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "parentA" => Some(ParentRole::ParentA),
            "parentB" => Some(ParentRole::ParentB),
            _ => None,
        }
    }
}
