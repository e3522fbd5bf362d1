//! Storage abstractions for tracked assignment sheets.
//!
//! Each source owns one sheet: a header row plus one row per
//! [`AssignmentRecord`], columns in the order of [`HEADER`]. A write replaces
//! the whole data region of that sheet.
//!
//! ## Directory Structure
//!
//! ```text
//! storage/
//! ├── config.toml           # Static configuration
//! ├── settings.json         # Per-user settings
//! ├── journal.jsonl         # Run log
//! ├── webclass.json         # Portal sheet
//! └── classroom.json        # Course-work sheet
//! ```

pub mod local;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{AssignmentRecord, HEADER, Source};

pub use local::LocalStorage;

/// On-disk form of one sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetData {
    pub header: Vec<String>,
    pub updated_at: DateTime<Utc>,
    pub rows: Vec<Vec<String>>,
}

impl SheetData {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self {
            header: HEADER.iter().map(|h| h.to_string()).collect(),
            updated_at: Utc::now(),
            rows,
        }
    }
}

/// Row-oriented storage, one sheet per source.
#[async_trait]
pub trait SheetStorage: Send + Sync {
    /// Data rows of a sheet (header excluded); a missing sheet is empty.
    async fn read_rows(&self, source: Source) -> Result<Vec<Vec<String>>>;

    /// Replace all data rows of a sheet.
    async fn write_rows(&self, source: Source, rows: &[Vec<String>]) -> Result<()>;
}

/// Read a sheet as records, skipping rows that cannot be decoded.
pub async fn load_records(
    storage: &dyn SheetStorage,
    source: Source,
) -> Result<Vec<AssignmentRecord>> {
    let rows = storage.read_rows(source).await?;
    let records = rows
        .iter()
        .enumerate()
        .filter_map(|(i, row)| match AssignmentRecord::from_row(row, source) {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("{} row {}: {}", source.sheet_name(), i + 2, e);
                None
            }
        })
        .collect();
    Ok(records)
}

/// Write records to a sheet in the given order.
pub async fn save_records(
    storage: &dyn SheetStorage,
    source: Source,
    records: &[AssignmentRecord],
) -> Result<()> {
    let rows: Vec<Vec<String>> = records.iter().map(AssignmentRecord::to_row).collect();
    storage.write_rows(source, &rows).await?;
    log::info!("Wrote {} rows to '{}'", rows.len(), source.sheet_name());
    Ok(())
}
