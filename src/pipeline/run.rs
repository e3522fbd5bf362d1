// src/pipeline/run.rs

//! The daily run: portal scan, course-work scan, reconciliation.
//!
//! Missing settings abort before any request is made. After that each phase
//! runs regardless of how the previous one ended, so a broken login never
//! keeps the other source's sheet or the task list from being updated. Only
//! fatal errors (configuration, a vanished task list) end the run early.

use std::fmt;
use std::future::Future;

use chrono::{DateTime, Local, NaiveDateTime};
use serde::Serialize;

use super::circuit_breaker::CircuitBreaker;
use super::cleanup::cleanup;
use super::reconcile::{ReconcileOptions, ReconcileStats, reconcile};
use super::scan::{ScanReport, scan_course_work, scan_portal};
use crate::error::{AppError, Result};
use crate::models::{CircuitBreakerSettings, Config, Source};
use crate::services::{CourseScanner, CourseWorkSource, TaskSink};
use crate::settings::{CLEANUP_DAYS, Credentials, Settings, TASK_LIST_ID};
use crate::storage::{SheetStorage, load_records, save_records};
use crate::utils::log::Journal;

/// Collaborators of one run.
pub struct RunContext<'a> {
    pub config: &'a Config,
    pub settings: &'a Settings,
    pub storage: &'a dyn SheetStorage,
    pub scanner: &'a CourseScanner,
    pub course_work: &'a dyn CourseWorkSource,
    pub sink: &'a dyn TaskSink,
    pub journal: &'a Journal,
}

/// Settings a run cannot start without.
#[derive(Debug, Clone)]
pub struct Preflight {
    pub credentials: Credentials,
    pub list_id: String,
    pub cleanup_days: i64,
}

impl Preflight {
    pub fn check(settings: &Settings, config: &Config) -> Result<Self> {
        Ok(Self {
            credentials: settings.credentials()?,
            list_id: settings.require(TASK_LIST_ID)?,
            cleanup_days: settings.get_number(CLEANUP_DAYS, config.sync.default_cleanup_days),
        })
    }
}

/// How a phase ended.
#[derive(Debug, Clone, Serialize)]
pub enum PhaseOutcome<T> {
    Done(T),
    Failed(String),
}

impl<T> PhaseOutcome<T> {
    pub fn done(&self) -> Option<&T> {
        match self {
            PhaseOutcome::Done(value) => Some(value),
            PhaseOutcome::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PhaseOutcome::Failed(_))
    }
}

/// Reconciliation totals over both sheets.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub stats: ReconcileStats,
    pub purged: usize,
    /// Sheets rewritten because something changed
    pub written: Vec<Source>,
}

/// Outcome of [`run_daily`].
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub portal: PhaseOutcome<ScanReport>,
    pub course_work: PhaseOutcome<ScanReport>,
    pub reconcile: PhaseOutcome<ReconcileReport>,
}

impl RunSummary {
    pub fn failures(&self) -> usize {
        [
            self.portal.is_failed(),
            self.course_work.is_failed(),
            self.reconcile.is_failed(),
        ]
        .into_iter()
        .filter(|failed| *failed)
        .count()
    }
}

fn fmt_scan(f: &mut fmt::Formatter<'_>, label: &str, phase: &PhaseOutcome<ScanReport>) -> fmt::Result {
    match phase {
        PhaseOutcome::Done(r) => writeln!(
            f,
            "  {label}: {} scanned from {} courses ({} failed), {} new, {} dropped, {} rows",
            r.scanned, r.course_total, r.course_failures, r.merge.added, r.merge.dropped, r.rows
        ),
        PhaseOutcome::Failed(e) => writeln!(f, "  {label}: FAILED ({e})"),
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Run {} ({}s)",
            self.started_at.format("%Y/%m/%d %H:%M"),
            (self.finished_at - self.started_at).num_seconds()
        )?;
        fmt_scan(f, Source::Portal.label(), &self.portal)?;
        fmt_scan(f, Source::CourseWork.label(), &self.course_work)?;
        match &self.reconcile {
            PhaseOutcome::Done(r) => write!(
                f,
                "  Tasks: {} registered, {} completed, {} deleted, {} expired, {} without date, {} deferred; {} rows purged",
                r.stats.registered,
                r.stats.completed,
                r.stats.deleted,
                r.stats.expired,
                r.stats.skipped_no_date,
                r.stats.deferred,
                r.purged
            ),
            PhaseOutcome::Failed(e) => write!(f, "  Tasks: FAILED ({e})"),
        }
    }
}

async fn phase<T, F>(journal: &Journal, name: &str, work: F) -> Result<PhaseOutcome<T>>
where
    F: Future<Output = Result<T>>,
{
    match work.await {
        Ok(value) => Ok(PhaseOutcome::Done(value)),
        Err(e) if e.is_fatal() => {
            journal.failure(&format!("{name}: aborting run: {e}"));
            Err(e)
        }
        Err(e) => {
            journal.failure(&format!("{name} failed: {e}"));
            Ok(PhaseOutcome::Failed(e.to_string()))
        }
    }
}

/// Execute one complete pass.
///
/// `force` disables the circuit breaker for this run.
pub async fn run_daily(ctx: &RunContext<'_>, now: NaiveDateTime, force: bool) -> Result<RunSummary> {
    let started_at = Local::now();

    let preflight = Preflight::check(ctx.settings, ctx.config).inspect_err(|e| {
        ctx.journal.failure(&format!("Run not started: {e}"));
    })?;
    ctx.journal.record("Run started");

    let breaker = CircuitBreaker::new(CircuitBreakerSettings {
        enabled: ctx.config.circuit_breaker.enabled && !force,
        ..ctx.config.circuit_breaker.clone()
    });

    let portal = phase(
        ctx.journal,
        "Portal scan",
        scan_portal(ctx.scanner, &preflight.credentials, ctx.storage, &breaker),
    )
    .await?;

    let course_work = phase(
        ctx.journal,
        "Course-work scan",
        scan_course_work(ctx.course_work, ctx.storage, &breaker),
    )
    .await?;

    let options = ReconcileOptions::new(&preflight.list_id, now, &ctx.config.sync);
    let reconcile = phase(
        ctx.journal,
        "Reconciliation",
        reconcile_sheets(ctx, &options, preflight.cleanup_days),
    )
    .await?;

    let summary = RunSummary {
        started_at,
        finished_at: Local::now(),
        portal,
        course_work,
        reconcile,
    };
    ctx.journal.record(&summary.to_string());
    Ok(summary)
}

/// Reconcile and clean both sheets, writing back only the ones that changed.
pub async fn reconcile_sheets(
    ctx: &RunContext<'_>,
    options: &ReconcileOptions,
    cleanup_days: i64,
) -> Result<ReconcileReport> {
    let lists = ctx.sink.list_task_lists().await?;
    if !lists.iter().any(|list| list.id == options.list_id) {
        return Err(AppError::config(format!(
            "task list '{}' no longer exists; run setup-tasks again",
            options.list_id
        )));
    }

    let mut report = ReconcileReport::default();
    for source in Source::ALL {
        let before = load_records(ctx.storage, source).await?;
        let mut records = before.clone();

        let stats = reconcile(&mut records, ctx.sink, options).await;
        let (kept, purged) = cleanup(records, options.now, cleanup_days);

        if kept != before {
            save_records(ctx.storage, source, &kept).await?;
            report.written.push(source);
        } else {
            log::debug!("{} unchanged", source.sheet_name());
        }
        report.stats.add(&stats);
        report.purged += purged;
    }
    Ok(report)
}
