//! Purge of stale rows after reconciliation.

use chrono::{Duration, NaiveDateTime};

use crate::models::AssignmentRecord;

/// Whether a record has outlived its grace period.
///
/// Terminal rows go once their deadline is more than `grace` behind `now`,
/// or immediately when they carry no deadline at all. Rows that were never
/// linked to a sink task go once overdue by more than `grace`.
pub fn should_purge(record: &AssignmentRecord, now: NaiveDateTime, grace: Duration) -> bool {
    let due = record.due();
    let overdue = due.is_some_and(|d| now - d > grace);

    if record.lifecycle_flag.is_terminal() && (due.is_none() || overdue) {
        return true;
    }
    record.sink_task_id.is_none() && overdue
}

/// Split records into those kept and the number purged.
pub fn cleanup(
    records: Vec<AssignmentRecord>,
    now: NaiveDateTime,
    grace_days: i64,
) -> (Vec<AssignmentRecord>, usize) {
    let grace = Duration::days(grace_days);
    let before = records.len();
    let kept: Vec<_> = records
        .into_iter()
        .filter(|r| {
            let purge = should_purge(r, now, grace);
            if purge {
                log::debug!("Purging '{}' [{}]", r.title, r.lifecycle_flag);
            }
            !purge
        })
        .collect();
    let purged = before - kept.len();
    (kept, purged)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::{LifecycleFlag, Source};
    use crate::utils::date::format_display;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap()
    }

    fn record(days_ago: Option<i64>, task: Option<&str>, flag: LifecycleFlag) -> AssignmentRecord {
        let due = days_ago
            .map(|d| format_display(now() - Duration::days(d)))
            .unwrap_or_default();
        let mut r = AssignmentRecord::new(Source::Portal, "C", "T", "", due, "https://x/1");
        r.sink_task_id = task.map(String::from);
        r.lifecycle_flag = flag;
        r
    }

    #[test]
    fn test_completed_grace_boundary() {
        let grace = Duration::days(30);
        let old = record(Some(31), Some("T1"), LifecycleFlag::Completed);
        let young = record(Some(29), Some("T1"), LifecycleFlag::Completed);
        assert!(should_purge(&old, now(), grace));
        assert!(!should_purge(&young, now(), grace));
    }

    #[test]
    fn test_registered_rows_are_kept_while_open() {
        let grace = Duration::days(30);
        let r = record(Some(90), Some("T1"), LifecycleFlag::Registered);
        assert!(!should_purge(&r, now(), grace));
    }

    #[test]
    fn test_unregistered_overdue_rows_go() {
        let grace = Duration::days(30);
        assert!(should_purge(
            &record(Some(40), None, LifecycleFlag::Empty),
            now(),
            grace
        ));
        assert!(!should_purge(
            &record(Some(10), None, LifecycleFlag::Expired),
            now(),
            grace
        ));
    }

    #[test]
    fn test_undated_terminal_rows_go_immediately() {
        let grace = Duration::days(30);
        assert!(should_purge(
            &record(None, None, LifecycleFlag::SkippedNoDate),
            now(),
            grace
        ));
        assert!(!should_purge(&record(None, None, LifecycleFlag::Empty), now(), grace));
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let records = vec![
            record(Some(31), Some("T1"), LifecycleFlag::Completed),
            record(Some(40), None, LifecycleFlag::Expired),
            record(Some(2), Some("T2"), LifecycleFlag::Registered),
        ];

        let (kept, purged) = cleanup(records, now(), 30);
        assert_eq!(purged, 2);
        assert_eq!(kept.len(), 1);

        let (again, purged_again) = cleanup(kept.clone(), now(), 30);
        assert_eq!(purged_again, 0);
        assert_eq!(again, kept);
    }
}
