// src/utils/date.rs

//! Deadline parsing and formatting.
//!
//! Upstream pages print deadlines as `YYYY/MM/DD HH:MM` or with localized
//! separators (`YYYY年MM月DD日`). Anything that is not a real calendar date
//! parses to `None`; callers treat that as "no deadline", never as a fault.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;

static DATE_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})\s*[/年\-.]\s*(\d{1,2})\s*[/月\-.]\s*(\d{1,2})\s*日?").unwrap()
});

// An optional weekday such as "(月)" may sit between date and time.
static TIME_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[(（][^)）]*[)）]\s*)?(\d{1,2})[:：](\d{2})(?:[:：](\d{2}))?$").unwrap()
});

/// Parse a deadline string into a local wall-clock timestamp.
pub fn parse_assignment_date(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let caps = DATE_PART.captures(text)?;
    let year: i32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let day: u32 = caps[3].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;

    let rest = text[caps.get(0)?.end()..].trim();
    if rest.is_empty() || is_weekday_suffix(rest) {
        return Some(date.and_time(NaiveTime::MIN));
    }

    let time = TIME_PART.captures(rest)?;
    let hour: u32 = time[1].parse().ok()?;
    let minute: u32 = time[2].parse().ok()?;
    let second: u32 = match time.get(3) {
        Some(s) => s.as_str().parse().ok()?,
        None => 0,
    };
    Some(date.and_time(NaiveTime::from_hms_opt(hour, minute, second)?))
}

fn is_weekday_suffix(rest: &str) -> bool {
    (rest.starts_with('(') && rest.ends_with(')'))
        || (rest.starts_with('（') && rest.ends_with('）'))
}

/// Render a timestamp the way source sheets display deadlines.
pub fn format_display(at: NaiveDateTime) -> String {
    at.format("%Y/%m/%d %H:%M").to_string()
}

/// RFC 3339 timestamp at UTC midnight of the deadline's calendar date.
pub fn format_sink_due(at: NaiveDateTime) -> String {
    format!("{}T00:00:00.000Z", at.date().format("%Y-%m-%d"))
}
