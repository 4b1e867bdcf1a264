//! Rule validation.
//!
//! Runs before any persistence attempt. A rule that fails here is never written.

use chrono::{NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::AppError;
use crate::models::{ScheduleRule, WeekStart};

/// Reasons a candidate rule is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    /// Document does not match either rule shape
    Malformed(String),
    /// Anchor is not a bare `YYYY-MM-DD` calendar date
    InvalidAnchorDate(String),
    /// Week start outside what the variant supports
    UnsupportedWeekStart(WeekStart),
    /// Time-of-day field not in the accepted format
    InvalidTime { field: String, value: String },
}

impl std::fmt::Display for RuleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleError::Malformed(msg) => write!(f, "Malformed rule: {}", msg),
            RuleError::InvalidAnchorDate(value) => {
                write!(f, "Set a valid anchor date (YYYY-MM-DD), got '{}'", value)
            }
            RuleError::UnsupportedWeekStart(week_start) => write!(
                f,
                "Weekly templates must start on MON or SUN, got {:?}",
                week_start
            ),
            RuleError::InvalidTime { field, value } => {
                write!(f, "{} must be HH:mm, got '{}'", field, value)
            }
        }
    }
}

impl std::error::Error for RuleError {}

impl From<RuleError> for AppError {
    fn from(err: RuleError) -> Self {
        AppError::Validation(err.to_string())
    }
}

static HHMM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([01][0-9]|2[0-3]):[0-5][0-9]$").expect("valid time regex"));
static DAY_END_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^24:00$|^([01][0-9]|2[0-3]):[0-5][0-9]$").expect("valid day end regex")
});
static CALENDAR_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").expect("valid date regex"));

/// Parse a 24-hour `HH:mm` time (00:00 - 23:59).
pub fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    if !HHMM_RE.is_match(value) {
        return None;
    }
    NaiveTime::parse_from_str(value, "%H:%M").ok()
}

/// `HH:mm` or the end-of-day sentinel `24:00`.
pub fn is_day_end(value: &str) -> bool {
    DAY_END_RE.is_match(value)
}

/// Parse a bare calendar date `YYYY-MM-DD`, rejecting any time component.
pub fn parse_calendar_date(value: &str) -> Option<NaiveDate> {
    if !CALENDAR_DATE_RE.is_match(value) {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

fn check_time(field: &str, value: Option<&String>) -> Result<(), RuleError> {
    match value {
        Some(v) if parse_hhmm(v).is_none() => Err(RuleError::InvalidTime {
            field: field.to_string(),
            value: v.clone(),
        }),
        _ => Ok(()),
    }
}

/// Turn a raw JSON document into a typed rule.
///
/// The anchor date is checked first so a bad date is reported as such rather
/// than as a generic shape error.
pub fn parse_rule(document: serde_json::Value) -> Result<ScheduleRule, RuleError> {
    if document.get("type").and_then(|t| t.as_str()) == Some("ODD_EVEN") {
        match document.get("anchorDate") {
            Some(serde_json::Value::String(raw)) if parse_calendar_date(raw).is_some() => {}
            Some(serde_json::Value::String(raw)) => {
                return Err(RuleError::InvalidAnchorDate(raw.clone()))
            }
            Some(other) => return Err(RuleError::InvalidAnchorDate(other.to_string())),
            None => return Err(RuleError::InvalidAnchorDate(String::new())),
        }
    }

    serde_json::from_value(document).map_err(|e| RuleError::Malformed(e.to_string()))
}

/// Validate a typed rule. Synchronous and side-effect free.
pub fn validate(rule: &ScheduleRule) -> Result<(), RuleError> {
    match rule {
        // Any of the seven week starts is allowed; the enum already guarantees that.
        ScheduleRule::OddEven(rule) => check_time("shiftTime", rule.shift_time.as_ref()),
        ScheduleRule::WeeklyTemplate(rule) => {
            if !matches!(rule.week_start, WeekStart::Mon | WeekStart::Sun) {
                return Err(RuleError::UnsupportedWeekStart(rule.week_start));
            }
            for day in rule.days.iter() {
                check_time(&format!("days[{}].start", day.dow), day.start.as_ref())?;
                if let Some(end) = &day.end {
                    if !is_day_end(end) {
                        return Err(RuleError::InvalidTime {
                            field: format!("days[{}].end", day.dow),
                            value: end.clone(),
                        });
                    }
                }
            }
            check_time("shiftTime", rule.shift_time.as_ref())
        }
    }
}

/// Parse and validate in one step, as done before every rule write.
pub fn parse_and_validate(document: serde_json::Value) -> Result<ScheduleRule, RuleError> {
    let rule = parse_rule(document)?;
    validate(&rule)?;
    Ok(rule)
}
