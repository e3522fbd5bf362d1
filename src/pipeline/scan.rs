// src/pipeline/scan.rs

//! Scan phases: fetch a source, merge with its sheet, write it back.

use serde::Serialize;

use super::circuit_breaker::CircuitBreaker;
use super::merge::{MergeStats, merge_scan};
use super::reconcile::due_order;
use crate::error::Result;
use crate::models::Source;
use crate::services::{CourseScanner, CourseWorkSource, ScanOutcome, collect_course_work};
use crate::settings::Credentials;
use crate::storage::{SheetStorage, load_records, save_records};

/// What one scan phase did to its sheet.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub source: Source,
    pub scanned: usize,
    pub course_total: usize,
    pub course_failures: usize,
    pub merge: MergeStats,
    /// Rows in the sheet after the write
    pub rows: usize,
}

/// Merge a fresh scan into the stored sheet and persist it.
///
/// The breaker compares against the stored row count; when it trips the
/// sheet is left as it was.
pub async fn store_scan(
    storage: &dyn SheetStorage,
    source: Source,
    outcome: ScanOutcome,
    breaker: &CircuitBreaker,
) -> Result<ScanReport> {
    let previous = load_records(storage, source).await?;
    let scanned = outcome.records.len();
    let mut merged = merge_scan(&previous, outcome.records);

    if breaker.is_enabled() {
        breaker.validate(source.sheet_name(), merged.records.len(), previous.len())?;
    } else {
        log::debug!("Circuit breaker disabled for {}", source.sheet_name());
    }

    merged.records.sort_by(due_order);
    save_records(storage, source, &merged.records).await?;

    Ok(ScanReport {
        source,
        scanned,
        course_total: outcome.course_total,
        course_failures: outcome.course_failures,
        merge: merged.stats,
        rows: merged.records.len(),
    })
}

/// Log in to the portal, scan every course and store the result.
pub async fn scan_portal(
    scanner: &CourseScanner,
    credentials: &Credentials,
    storage: &dyn SheetStorage,
    breaker: &CircuitBreaker,
) -> Result<ScanReport> {
    let outcome = scanner.scan(credentials).await?;
    store_scan(storage, Source::Portal, outcome, breaker).await
}

/// Read published course work and store the result.
pub async fn scan_course_work(
    source: &dyn CourseWorkSource,
    storage: &dyn SheetStorage,
    breaker: &CircuitBreaker,
) -> Result<ScanReport> {
    let outcome = collect_course_work(source).await?;
    store_scan(storage, Source::CourseWork, outcome, breaker).await
}
