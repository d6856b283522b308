//! Cron schedule helpers.
//!
//! Five-field expressions (`min hour dom month dow`) are accepted alongside
//! the seconds-first form understood by the `cron` crate. In the five-field
//! form the seconds field is implied as `0` and weekdays use standard cron
//! numbering (0 or 7 is Sunday), which is mapped onto the crate's 1-7
//! (Sunday = 1) numbering.

use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use std::time::Duration;

/// Parse a cron expression.
pub fn parse_cron(expr: &str) -> Result<Schedule, cron::error::Error> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if let [minute, hour, day, month, weekday] = fields[..] {
        Schedule::from_str(&format!(
            "0 {} {} {} {} {}",
            minute,
            hour,
            day,
            month,
            crate_weekdays(weekday)
        ))
    } else {
        Schedule::from_str(expr.trim())
    }
}

/// Rewrite a standard weekday field (0-7, Sunday = 0 or 7) as an explicit
/// list in the `cron` crate's numbering (1-7, Sunday = 1).
///
/// `*`, names such as `MON-FRI` and items that are not valid weekday
/// numbers are left as they are; the crate accepts or rejects those itself.
fn crate_weekdays(field: &str) -> String {
    field
        .split(',')
        .map(|item| match standard_weekdays(item) {
            Some(days) => days
                .into_iter()
                .map(|day| (day % 7 + 1).to_string())
                .collect::<Vec<_>>()
                .join(","),
            None => item.to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Weekday numbers (0-7) selected by one numeric list item, or `None` when
/// the item is not numeric.
fn standard_weekdays(item: &str) -> Option<Vec<u32>> {
    if item == "*" || item.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let (range, step) = match item.split_once('/') {
        Some((range, step)) => (range, Some(step.parse::<u32>().ok().filter(|s| *s > 0)?)),
        None => (item, None),
    };
    let (start, end) = match (range, range.split_once('-')) {
        ("*", _) => (0, 6),
        (_, Some((start, end))) => (start.parse().ok()?, end.parse().ok()?),
        (single, None) => {
            let day: u32 = single.parse().ok()?;
            (day, if step.is_some() { 6 } else { day })
        }
    };
    if start > end || end > 7 {
        return None;
    }
    let mut days: Vec<u32> = (start..=end).step_by(step.unwrap_or(1) as usize).collect();
    // 7 and 0 are both Sunday
    days.sort_by_key(|day| day % 7);
    days.dedup_by_key(|day| *day % 7);
    Some(days)
}

/// Time left until the next occurrence after `now`, or `None` when the
/// schedule has no upcoming occurrence.
pub fn delay_until_next(schedule: &Schedule, now: DateTime<Utc>) -> Option<Duration> {
    let next = schedule.after(&now).next()?;
    Some((next - now).to_std().unwrap_or(Duration::ZERO))
}
