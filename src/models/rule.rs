//! Custody schedule rule document.
//!
//! The active rule is a tagged union distinguished by a `type` field. Each variant
//! rejects fields it does not own, so a stored document can never mix both shapes.

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use super::ParentRole;

/// First day of a custody week.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum WeekStart {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl WeekStart {
    pub fn weekday(self) -> Weekday {
        match self {
            WeekStart::Mon => Weekday::Mon,
            WeekStart::Tue => Weekday::Tue,
            WeekStart::Wed => Weekday::Wed,
            WeekStart::Thu => Weekday::Thu,
            WeekStart::Fri => Weekday::Fri,
            WeekStart::Sat => Weekday::Sat,
            WeekStart::Sun => Weekday::Sun,
        }
    }
}

/// ODD/EVEN classification of a week relative to the anchor week.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Parity {
    Odd,
    Even,
}

impl Parity {
    pub fn flip(self) -> Self {
        match self {
            Parity::Odd => Parity::Even,
            Parity::Even => Parity::Odd,
        }
    }
}

fn default_active() -> bool {
    true
}

/// Alternating weeks between two parents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OddEvenRule {
    pub week_start: WeekStart,
    pub anchor_date: NaiveDate,
    pub anchor_week_is: Parity,
    pub parent_on_odd: ParentRole,
    pub parent_on_even: ParentRole,
    /// Daily handover time, `HH:mm`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shift_time: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// One day of a weekly template. `dow` is 0 = Sunday .. 6 = Saturday.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DayEntry {
    pub dow: u8,
    pub owner: ParentRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    /// `HH:mm`, or `24:00` for end of day (exclusive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

/// Exactly seven day entries, indexed by day-of-week.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "Vec<DayEntry>", into = "Vec<DayEntry>")]
pub struct WeekTemplate([DayEntry; 7]);

impl WeekTemplate {
    /// Entry for a day-of-week (0 = Sunday). Indices wrap modulo seven.
    pub fn day(&self, dow: u32) -> &DayEntry {
        &self.0[(dow % 7) as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &DayEntry> {
        self.0.iter()
    }
}

impl TryFrom<Vec<DayEntry>> for WeekTemplate {
    type Error = String;

    fn try_from(entries: Vec<DayEntry>) -> Result<Self, Self::Error> {
        if entries.len() != 7 {
            return Err(format!(
                "weekly template needs exactly 7 days, got {}",
                entries.len()
            ));
        }

        let mut slots: [Option<DayEntry>; 7] = Default::default();
        for entry in entries {
            let index = usize::from(entry.dow);
            if index > 6 {
                return Err(format!("day-of-week {} is outside 0-6", entry.dow));
            }
            if slots[index].is_some() {
                return Err(format!("day-of-week {} appears more than once", entry.dow));
            }
            slots[index] = Some(entry);
        }

        let days: Vec<DayEntry> = slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| "weekly template is missing a day".to_string())?;
        let days: [DayEntry; 7] = days
            .try_into()
            .map_err(|_| "weekly template needs exactly 7 days".to_string())?;

        Ok(WeekTemplate(days))
    }
}

impl From<WeekTemplate> for Vec<DayEntry> {
    fn from(template: WeekTemplate) -> Self {
        template.0.into()
    }
}

/// Fixed owner per day-of-week.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WeeklyTemplateRule {
    pub week_start: WeekStart,
    pub days: WeekTemplate,
    /// Default handover time, `HH:mm`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shift_time: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// The family's active custody rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ScheduleRule {
    #[serde(rename = "ODD_EVEN")]
    OddEven(OddEvenRule),
    #[serde(rename = "WEEKLY_TEMPLATE")]
    WeeklyTemplate(WeeklyTemplateRule),
}

impl ScheduleRule {
    /// The `type` discriminator as persisted.
    pub fn type_name(&self) -> &'static str {
        match self {
            ScheduleRule::OddEven(_) => "ODD_EVEN",
            ScheduleRule::WeeklyTemplate(_) => "WEEKLY_TEMPLATE",
        }
    }

    pub fn week_start(&self) -> WeekStart {
        match self {
            ScheduleRule::OddEven(rule) => rule.week_start,
            ScheduleRule::WeeklyTemplate(rule) => rule.week_start,
        }
    }

    /// A switched-off rule is kept but never evaluated.
    pub fn is_active(&self) -> bool {
        match self {
            ScheduleRule::OddEven(rule) => rule.active,
            ScheduleRule::WeeklyTemplate(rule) => rule.active,
        }
    }
}

/// A stored rule with its bookkeeping timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRule {
    pub family_id: String,
    pub rule: ScheduleRule,
    pub created_at: String,
    pub updated_at: String,
}
