//! Lifecycle reconciliation against the task sink.
//!
//! Each record is evaluated once per run:
//!
//! | flag / linkage                  | condition                  | next flag        |
//! |---------------------------------|----------------------------|------------------|
//! | task ID, EMPTY or REGISTERED    | sink: completed            | COMPLETED        |
//! | task ID, EMPTY or REGISTERED    | sink: not found            | DELETED          |
//! | task ID, EMPTY                  | sink: needs action         | REGISTERED       |
//! | no task ID, EMPTY or REGISTERED | no parseable deadline      | SKIPPED_NODATE   |
//! | no task ID, EMPTY or REGISTERED | overdue by > expiry window | EXPIRED          |
//! | no task ID, EMPTY or REGISTERED | otherwise                  | REGISTERED + ID  |
//! | terminal                        |                            | unchanged        |
//!
//! Sink failures other than "not found" leave the record untouched until the
//! next run.

use std::cmp::Ordering;

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

use crate::error::AppError;
use crate::models::{AssignmentRecord, LifecycleFlag, NewTask, RemoteTask, SyncConfig, TaskStatus};
use crate::services::TaskSink;
use crate::utils::date::format_sink_due;

/// What to do with one record this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Terminal; nothing to do
    Keep,
    /// Linked to a sink task whose state must be read
    QuerySink { task_id: String },
    MarkSkippedNoDate,
    MarkExpired,
    /// Create a sink task due at the given deadline
    Register { due: NaiveDateTime },
}

/// Decide the action for a record at time `now`.
pub fn plan(record: &AssignmentRecord, now: NaiveDateTime, expiry: Duration) -> Action {
    if record.lifecycle_flag.is_terminal() {
        return Action::Keep;
    }
    if let Some(task_id) = &record.sink_task_id {
        return Action::QuerySink {
            task_id: task_id.clone(),
        };
    }
    match record.due() {
        None => Action::MarkSkippedNoDate,
        Some(due) if now - due > expiry => Action::MarkExpired,
        Some(due) => Action::Register { due },
    }
}

/// Flag implied by a sink lookup, or `None` when the lookup must be retried.
pub fn flag_after_lookup(
    current: LifecycleFlag,
    lookup: &Result<RemoteTask, AppError>,
) -> Option<LifecycleFlag> {
    match lookup {
        Ok(task) if task.status == TaskStatus::Completed => Some(LifecycleFlag::Completed),
        Ok(_) if current == LifecycleFlag::Empty => Some(LifecycleFlag::Registered),
        Ok(_) => Some(current),
        Err(AppError::SinkNotFound { .. }) => Some(LifecycleFlag::Deleted),
        Err(_) => None,
    }
}

/// Run-specific reconciliation inputs.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub list_id: String,
    pub now: NaiveDateTime,
    pub urgent_days: i64,
    pub expiry_days: i64,
    pub urgent_prefix: String,
    pub max_registrations: Option<usize>,
}

impl ReconcileOptions {
    pub fn new(list_id: impl Into<String>, now: NaiveDateTime, sync: &SyncConfig) -> Self {
        Self {
            list_id: list_id.into(),
            now,
            urgent_days: sync.urgent_days,
            expiry_days: sync.expiry_days,
            urgent_prefix: sync.urgent_prefix.clone(),
            max_registrations: sync.max_registrations_per_run,
        }
    }
}

/// Per-run transition counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub registered: usize,
    pub completed: usize,
    pub deleted: usize,
    pub expired: usize,
    pub skipped_no_date: usize,
    /// Records whose transition waits for the next run
    pub deferred: usize,
}

impl ReconcileStats {
    pub fn add(&mut self, other: &ReconcileStats) {
        self.registered += other.registered;
        self.completed += other.completed;
        self.deleted += other.deleted;
        self.expired += other.expired;
        self.skipped_no_date += other.skipped_no_date;
        self.deferred += other.deferred;
    }

    pub fn changed(&self) -> usize {
        self.registered + self.completed + self.deleted + self.expired + self.skipped_no_date
    }
}

/// Build the sink task for a record.
pub fn build_task(
    record: &AssignmentRecord,
    due: NaiveDateTime,
    options: &ReconcileOptions,
) -> NewTask {
    let urgent = due - options.now <= Duration::days(options.urgent_days);
    let prefix = if urgent {
        options.urgent_prefix.as_str()
    } else {
        ""
    };

    NewTask {
        title: format!("{}[{}] {}", prefix, record.course_name, record.title),
        notes: format!(
            "Link:\n{}\n\nDue: {}\nSource: {}",
            record.link_url,
            record.due_at.trim(),
            record.source
        ),
        due: Some(format_sink_due(due)),
    }
}

/// Reconcile one source's records with the sink in place.
///
/// Records are processed latest deadline first (no deadline before all
/// others) and left sorted soonest deadline first (no deadline last).
pub async fn reconcile(
    records: &mut [AssignmentRecord],
    sink: &dyn TaskSink,
    options: &ReconcileOptions,
) -> ReconcileStats {
    let expiry = Duration::days(options.expiry_days);
    let mut stats = ReconcileStats::default();
    let mut budget = options.max_registrations;

    records.sort_by(|a, b| due_order(b, a));

    for record in records.iter_mut() {
        match plan(record, options.now, expiry) {
            Action::Keep => {}

            Action::QuerySink { task_id } => {
                let lookup = sink.get_task(&options.list_id, &task_id).await;
                match flag_after_lookup(record.lifecycle_flag, &lookup) {
                    Some(flag) => {
                        if flag != record.lifecycle_flag {
                            match flag {
                                LifecycleFlag::Completed => stats.completed += 1,
                                LifecycleFlag::Deleted => stats.deleted += 1,
                                _ => {}
                            }
                            log::info!(
                                "{} '{}' -> {}",
                                record.source,
                                record.title,
                                flag
                            );
                        }
                        record.lifecycle_flag = flag;
                    }
                    None => {
                        if let Err(e) = lookup {
                            log::warn!("Task lookup for '{}' deferred: {}", record.title, e);
                        }
                        stats.deferred += 1;
                    }
                }
            }

            Action::MarkSkippedNoDate => {
                record.lifecycle_flag = LifecycleFlag::SkippedNoDate;
                stats.skipped_no_date += 1;
            }

            Action::MarkExpired => {
                record.lifecycle_flag = LifecycleFlag::Expired;
                stats.expired += 1;
            }

            Action::Register { due } => {
                if budget == Some(0) {
                    stats.deferred += 1;
                    continue;
                }
                let task = build_task(record, due, options);
                match sink.insert_task(&options.list_id, &task).await {
                    Ok(created) => {
                        log::info!("Registered task: {}", task.title);
                        record.sink_task_id = Some(created.id);
                        record.lifecycle_flag = LifecycleFlag::Registered;
                        stats.registered += 1;
                        if let Some(left) = budget.as_mut() {
                            *left -= 1;
                        }
                    }
                    Err(e) => {
                        log::warn!("Registration of '{}' failed: {}", record.title, e);
                        stats.deferred += 1;
                    }
                }
            }
        }
    }

    if budget == Some(0) {
        log::info!("Registration budget exhausted for this run");
    }

    records.sort_by(due_order);
    stats
}

/// Ascending by deadline; records without one sort after all others.
pub fn due_order(a: &AssignmentRecord, b: &AssignmentRecord) -> Ordering {
    match (a.due(), b.due()) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
