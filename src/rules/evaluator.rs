//! Rule evaluation: who has the children on a given date.
//!
//! Pure functions with no I/O. Week arithmetic works on day numbers counted
//! from the common era, so every date chrono can represent is handled without
//! overflow.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use super::validator::parse_hhmm;
use crate::models::{OddEvenRule, ParentRole, Parity, ScheduleRule, WeekStart};

/// The time window annotated on a weekly template day.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DayWindow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

/// Everything the evaluator knows about one calendar day.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DayAssignment {
    pub date: NaiveDate,
    pub owner: ParentRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parity: Option<Parity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<DayWindow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handover: Option<String>,
}

/// Index of the `week_start`-aligned week containing `date`.
///
/// 0001-01-01 (day 1 from CE) is a Monday; weeks are counted from there.
pub fn week_index(date: NaiveDate, week_start: WeekStart) -> i64 {
    let day = i64::from(date.num_days_from_ce());
    let offset = i64::from(week_start.weekday().num_days_from_monday());
    (day - 1 - offset).div_euclid(7)
}

/// Whole weeks between the anchor's week and the target's week. Negative before the anchor.
pub fn weeks_from_anchor(rule: &OddEvenRule, date: NaiveDate) -> i64 {
    week_index(date, rule.week_start) - week_index(rule.anchor_date, rule.week_start)
}

/// Parity of the week containing `date`.
pub fn parity_on(rule: &OddEvenRule, date: NaiveDate) -> Parity {
    if weeks_from_anchor(rule, date).rem_euclid(2) == 1 {
        rule.anchor_week_is.flip()
    } else {
        rule.anchor_week_is
    }
}

fn parent_for(rule: &OddEvenRule, parity: Parity) -> ParentRole {
    match parity {
        Parity::Odd => rule.parent_on_odd,
        Parity::Even => rule.parent_on_even,
    }
}

/// Day-of-week with 0 = Sunday .. 6 = Saturday.
pub fn dow(date: NaiveDate) -> u32 {
    date.weekday().num_days_from_sunday()
}

/// The parent responsible on `date`, taking the day's week as a whole.
pub fn owner_on(rule: &ScheduleRule, date: NaiveDate) -> ParentRole {
    match rule {
        ScheduleRule::OddEven(rule) => parent_for(rule, parity_on(rule, date)),
        ScheduleRule::WeeklyTemplate(rule) => rule.days.day(dow(date)).owner,
    }
}

/// The parent responsible at a specific instant.
///
/// For odd/even rules with a handover time, the week-start day still belongs
/// to the previous week's parent until the handover. The handover instant
/// itself belongs to the new parent. Weekly templates hold one owner per day,
/// so the time of day does not change the answer.
pub fn owner_at(rule: &ScheduleRule, at: NaiveDateTime) -> ParentRole {
    match rule {
        ScheduleRule::OddEven(odd_even) => {
            let parity = parity_on(odd_even, at.date());
            let before_handover = handover_time(odd_even)
                .map(|handover| {
                    at.date().weekday() == odd_even.week_start.weekday() && at.time() < handover
                })
                .unwrap_or(false);
            if before_handover {
                parent_for(odd_even, parity.flip())
            } else {
                parent_for(odd_even, parity)
            }
        }
        ScheduleRule::WeeklyTemplate(_) => owner_on(rule, at.date()),
    }
}

// An unparsable handover (only possible on unvalidated input) is treated as absent.
fn handover_time(rule: &OddEvenRule) -> Option<NaiveTime> {
    rule.shift_time.as_deref().and_then(parse_hhmm)
}

/// Owner plus the parity or window details for a day.
pub fn assignment_on(rule: &ScheduleRule, date: NaiveDate) -> DayAssignment {
    match rule {
        ScheduleRule::OddEven(odd_even) => DayAssignment {
            date,
            owner: owner_on(rule, date),
            parity: Some(parity_on(odd_even, date)),
            window: None,
            handover: odd_even.shift_time.clone(),
        },
        ScheduleRule::WeeklyTemplate(template) => {
            let entry = template.days.day(dow(date));
            let window = (entry.start.is_some() || entry.end.is_some()).then(|| DayWindow {
                start: entry.start.clone(),
                end: entry.end.clone(),
            });
            DayAssignment {
                date,
                owner: entry.owner,
                parity: None,
                window,
                handover: template.shift_time.clone(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DayEntry, WeekTemplate, WeeklyTemplateRule};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn odd_even(anchor: NaiveDate, anchor_week_is: Parity, week_start: WeekStart) -> OddEvenRule {
        OddEvenRule {
            week_start,
            anchor_date: anchor,
            anchor_week_is,
            parent_on_odd: ParentRole::ParentA,
            parent_on_even: ParentRole::ParentB,
            shift_time: None,
            active: true,
        }
    }

    fn weekend_template() -> ScheduleRule {
        let days: Vec<DayEntry> = (0u8..7)
            .map(|dow| DayEntry {
                dow,
                owner: if dow == 0 || dow == 6 {
                    ParentRole::ParentA
                } else {
                    ParentRole::ParentB
                },
                start: None,
                end: None,
            })
            .collect();
        ScheduleRule::WeeklyTemplate(WeeklyTemplateRule {
            week_start: WeekStart::Mon,
            days: WeekTemplate::try_from(days).unwrap(),
            shift_time: None,
            active: true,
        })
    }

    #[test]
    fn test_week_index_alignment() {
        // 2024-01-01 is a Monday
        let monday = date(2024, 1, 1);
        let sunday = date(2024, 1, 7);
        assert_eq!(week_index(monday, WeekStart::Mon), week_index(sunday, WeekStart::Mon));
        assert_eq!(
            week_index(sunday, WeekStart::Sun),
            week_index(monday, WeekStart::Sun) + 1
        );
        assert_eq!(week_index(date(1, 1, 1), WeekStart::Mon), 0);
        assert_eq!(week_index(date(1, 1, 7), WeekStart::Sun), 0);
        assert_eq!(week_index(date(1, 1, 6), WeekStart::Sun), -1);
    }

    #[test]
    fn test_odd_even_scenario() {
        let rule = ScheduleRule::OddEven(odd_even(date(2024, 1, 1), Parity::Odd, WeekStart::Mon));
        assert_eq!(owner_on(&rule, date(2024, 1, 1)), ParentRole::ParentA);
        assert_eq!(owner_on(&rule, date(2024, 1, 7)), ParentRole::ParentA);
        assert_eq!(owner_on(&rule, date(2024, 1, 8)), ParentRole::ParentB);
        assert_eq!(owner_on(&rule, date(2023, 12, 25)), ParentRole::ParentB);
        assert_eq!(owner_on(&rule, date(2023, 12, 31)), ParentRole::ParentB);
        assert_eq!(owner_on(&rule, date(2023, 12, 24)), ParentRole::ParentA);
    }

    #[test]
    fn test_flipping_anchor_parity_swaps_every_result() {
        let anchor = date(2024, 3, 13);
        let odd = ScheduleRule::OddEven(odd_even(anchor, Parity::Odd, WeekStart::Wed));
        let even = ScheduleRule::OddEven(odd_even(anchor, Parity::Even, WeekStart::Wed));

        let mut day = date(2022, 1, 1);
        while day < date(2026, 1, 1) {
            assert_ne!(owner_on(&odd, day), owner_on(&even, day), "{}", day);
            day = day.succ_opt().unwrap();
        }
    }

    #[test]
    fn test_one_week_either_side_flips_parity_once() {
        for week_start in [WeekStart::Mon, WeekStart::Thu, WeekStart::Sun] {
            let rule = odd_even(date(2024, 5, 15), Parity::Even, week_start);
            let anchor_week_start = (0..7)
                .map(|back| rule.anchor_date - chrono::Days::new(back))
                .find(|d| d.weekday() == week_start.weekday())
                .unwrap();

            let before = anchor_week_start - chrono::Days::new(7);
            let after = anchor_week_start + chrono::Days::new(7);
            assert_eq!(parity_on(&rule, anchor_week_start), Parity::Even);
            assert_eq!(parity_on(&rule, before), Parity::Odd);
            assert_eq!(parity_on(&rule, after), Parity::Odd);
            assert_eq!(parity_on(&rule, after + chrono::Days::new(7)), Parity::Even);
        }
    }

    #[test]
    fn test_owner_on_is_total_at_the_calendar_edges() {
        let rule = ScheduleRule::OddEven(odd_even(date(2024, 1, 1), Parity::Odd, WeekStart::Sun));
        for day in [NaiveDate::MIN, NaiveDate::MAX, date(1900, 2, 28), date(2100, 12, 31)] {
            let owner = owner_on(&rule, day);
            assert!(owner == ParentRole::ParentA || owner == ParentRole::ParentB);
            let _ = owner_at(&rule, day.and_hms_opt(0, 0, 0).unwrap());
        }
    }

    #[test]
    fn test_handover_on_boundary_day() {
        let mut inner = odd_even(date(2024, 1, 1), Parity::Odd, WeekStart::Mon);
        inner.shift_time = Some("18:00".to_string());
        let rule = ScheduleRule::OddEven(inner);

        let boundary = date(2024, 1, 8);
        let at = |h, m| boundary.and_hms_opt(h, m, 0).unwrap();
        assert_eq!(owner_at(&rule, at(0, 0)), ParentRole::ParentA);
        assert_eq!(owner_at(&rule, at(17, 59)), ParentRole::ParentA);
        // The handover instant belongs to the incoming parent
        assert_eq!(owner_at(&rule, at(18, 0)), ParentRole::ParentB);
        assert_eq!(owner_at(&rule, at(23, 0)), ParentRole::ParentB);

        // Mid-week days are unaffected by the time of day
        let tuesday = date(2024, 1, 9).and_hms_opt(7, 0, 0).unwrap();
        assert_eq!(owner_at(&rule, tuesday), ParentRole::ParentB);
    }

    #[test]
    fn test_midnight_handover_changes_nothing() {
        let mut inner = odd_even(date(2024, 1, 1), Parity::Odd, WeekStart::Mon);
        inner.shift_time = Some("00:00".to_string());
        let rule = ScheduleRule::OddEven(inner);
        let midnight = date(2024, 1, 8).and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(owner_at(&rule, midnight), owner_on(&rule, date(2024, 1, 8)));
    }

    #[test]
    fn test_weekly_template_depends_only_on_day_of_week() {
        let rule = weekend_template();
        let mut saturday = date(1995, 7, 1);
        assert_eq!(saturday.weekday(), chrono::Weekday::Sat);
        for _ in 0..2000 {
            assert_eq!(owner_on(&rule, saturday), ParentRole::ParentA);
            let sunday = saturday.succ_opt().unwrap();
            assert_eq!(owner_on(&rule, sunday), ParentRole::ParentA);
            let wednesday = saturday + chrono::Days::new(4);
            assert_eq!(owner_on(&rule, wednesday), ParentRole::ParentB);
            saturday = saturday + chrono::Days::new(7 * 13);
        }
    }

    #[test]
    fn test_weekly_assignment_carries_window() {
        let mut days: Vec<DayEntry> = (0u8..7)
            .map(|dow| DayEntry {
                dow,
                owner: ParentRole::ParentB,
                start: None,
                end: None,
            })
            .collect();
        days[5].start = Some("08:00".to_string());
        days[5].end = Some("24:00".to_string());
        let rule = ScheduleRule::WeeklyTemplate(WeeklyTemplateRule {
            week_start: WeekStart::Sun,
            days: WeekTemplate::try_from(days).unwrap(),
            shift_time: Some("18:00".to_string()),
            active: true,
        });

        // 2024-01-05 is a Friday (dow 5)
        let friday = assignment_on(&rule, date(2024, 1, 5));
        assert_eq!(friday.owner, ParentRole::ParentB);
        assert_eq!(friday.parity, None);
        assert_eq!(
            friday.window,
            Some(DayWindow {
                start: Some("08:00".to_string()),
                end: Some("24:00".to_string()),
            })
        );
        assert_eq!(assignment_on(&rule, date(2024, 1, 6)).window, None);
    }
}
