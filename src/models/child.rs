//! Child records kept under a family.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::rules::parse_calendar_date;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Child {
    pub id: String,
    pub family_id: String,
    pub name: String,
    pub birthdate: NaiveDate,
    pub color: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Request body for creating or replacing a child.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildRequest {
    pub name: String,
    pub birthdate: String,
    pub color: String,
}

/// A child request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChild {
    pub name: String,
    pub birthdate: NaiveDate,
    pub color: String,
}

const MAX_CHILD_NAME: usize = 60;

static HEX_COLOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#[0-9a-fA-F]{6}$").expect("valid color regex"));

impl ChildRequest {
    /// Trim and check the request. `today` bounds the birthdate.
    pub fn validate(&self, today: NaiveDate) -> Result<NewChild, AppError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Name is required".to_string()));
        }
        if name.chars().count() > MAX_CHILD_NAME {
            return Err(AppError::Validation(format!(
                "Name is too long (max {})",
                MAX_CHILD_NAME
            )));
        }

        let birthdate = parse_calendar_date(self.birthdate.trim()).ok_or_else(|| {
            AppError::Validation("Birthdate must be YYYY-MM-DD".to_string())
        })?;
        if birthdate > today {
            return Err(AppError::Validation(
                "Birthdate cannot be in the future".to_string(),
            ));
        }

        let color = self.color.trim();
        if !HEX_COLOR_RE.is_match(color) {
            return Err(AppError::Validation(
                "Color must be a hex value like #RRGGBB".to_string(),
            ));
        }

        Ok(NewChild {
            name: name.to_string(),
            birthdate,
            color: color.to_string(),
        })
    }
}
