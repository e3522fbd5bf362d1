//! Pipeline stages of a sync run.
//!
//! - `scan`: fetch a source and merge it into its sheet
//! - `reconcile` / `cleanup`: drive lifecycle flags and purge stale rows
//! - `run`: the daily pass tying the phases together
//! - `schedule` / `setup`: daily trigger and task list binding

pub mod circuit_breaker;
pub mod cleanup;
pub mod merge;
pub mod reconcile;
pub mod run;
pub mod scan;
pub mod schedule;
pub mod setup;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerResult};
pub use cleanup::cleanup;
pub use merge::{MergeResult, MergeStats, merge_scan};
pub use reconcile::{ReconcileOptions, ReconcileStats, reconcile};
pub use run::{Preflight, RunContext, RunSummary, run_daily};
pub use scan::{ScanReport, scan_course_work, scan_portal};
pub use schedule::{DailyTrigger, TriggerPlan};
pub use setup::{ensure_task_list, setup_tasks};
