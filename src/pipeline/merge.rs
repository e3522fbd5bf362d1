//! Merge of a fresh scan with the stored sheet.
//!
//! A scan produces records with no sink linkage. Before anything else the
//! linkage (`sink_task_id`, `lifecycle_flag`) of stored records is carried
//! forward onto fresh records with the same link. Stored records whose link
//! is gone from the scan are dropped.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::models::AssignmentRecord;

/// Counts describing one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    /// Links not present in the stored sheet
    pub added: usize,
    /// Links whose linkage was carried forward
    pub carried: usize,
    /// Stored links absent from the scan
    pub dropped: usize,
    /// Repeated links within the scan (first occurrence kept)
    pub duplicates: usize,
}

impl MergeStats {
    pub fn has_changes(&self) -> bool {
        self.added > 0 || self.dropped > 0
    }
}

/// Merge result: the next working set for one source.
#[derive(Debug, Clone, Default)]
pub struct MergeResult {
    pub records: Vec<AssignmentRecord>,
    pub stats: MergeStats,
}

/// Re-associate fresh records with stored ones by `link_url`.
pub fn merge_scan(previous: &[AssignmentRecord], fresh: Vec<AssignmentRecord>) -> MergeResult {
    let prev_map: HashMap<&str, &AssignmentRecord> = previous
        .iter()
        .map(|r| (r.link_url.as_str(), r))
        .collect();

    let mut stats = MergeStats::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut records = Vec::with_capacity(fresh.len());

    for mut record in fresh {
        if record.link_url.trim().is_empty() {
            log::warn!(
                "Dropping '{}' ({}): no link to identify it by",
                record.title,
                record.course_name
            );
            continue;
        }
        if !seen.insert(record.link_url.clone()) {
            stats.duplicates += 1;
            continue;
        }

        match prev_map.get(record.link_url.as_str()) {
            Some(stored) => {
                record.sink_task_id = stored.sink_task_id.clone();
                record.lifecycle_flag = stored.lifecycle_flag;
                stats.carried += 1;
            }
            None => stats.added += 1,
        }
        records.push(record);
    }

    stats.dropped = prev_map.keys().filter(|link| !seen.contains(**link)).count();

    if stats.has_changes() {
        log::info!(
            "Merge: {} added, {} carried, {} dropped",
            stats.added,
            stats.carried,
            stats.dropped
        );
    }

    MergeResult { records, stats }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LifecycleFlag, Source};

    fn record(link: &str, title: &str) -> AssignmentRecord {
        AssignmentRecord::new(Source::Portal, "Course", title, "", "2024/12/01 23:59", link)
    }

    fn linked(link: &str, task: &str, flag: LifecycleFlag) -> AssignmentRecord {
        let mut r = record(link, "old title");
        r.sink_task_id = Some(task.into());
        r.lifecycle_flag = flag;
        r
    }

    #[test]
    fn test_linkage_carried_regardless_of_other_fields() {
        let previous = vec![linked("https://x/1", "T1", LifecycleFlag::Registered)];
        let mut fresh = record("https://x/1", "renamed upstream");
        fresh.course_name = "Renamed Course".into();

        let result = merge_scan(&previous, vec![fresh]);

        assert_eq!(result.records.len(), 1);
        let merged = &result.records[0];
        assert_eq!(merged.title, "renamed upstream");
        assert_eq!(merged.course_name, "Renamed Course");
        assert_eq!(merged.sink_task_id.as_deref(), Some("T1"));
        assert_eq!(merged.lifecycle_flag, LifecycleFlag::Registered);
        assert_eq!(result.stats.carried, 1);
    }

    #[test]
    fn test_new_and_dropped() {
        let previous = vec![
            linked("https://x/1", "T1", LifecycleFlag::Registered),
            linked("https://x/2", "T2", LifecycleFlag::Completed),
        ];
        let fresh = vec![record("https://x/1", "a"), record("https://x/3", "c")];

        let result = merge_scan(&previous, fresh);

        assert_eq!(
            result.stats,
            MergeStats {
                added: 1,
                carried: 1,
                dropped: 1,
                duplicates: 0,
            }
        );
        let links: Vec<_> = result.records.iter().map(|r| r.link_url.as_str()).collect();
        assert_eq!(links, vec!["https://x/1", "https://x/3"]);
        assert_eq!(result.records[1].sink_task_id, None);
        assert_eq!(result.records[1].lifecycle_flag, LifecycleFlag::Empty);
    }

    #[test]
    fn test_duplicate_links_first_wins_and_blank_links_dropped() {
        let fresh = vec![
            record("https://x/1", "first"),
            record("https://x/1", "second"),
            record("  ", "no link"),
        ];
        let result = merge_scan(&[], fresh);

        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].title, "first");
        assert_eq!(result.stats.duplicates, 1);
    }
}
