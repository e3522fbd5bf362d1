//! Tracked assignment rows and their lifecycle flag.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::utils::date::parse_assignment_date;

/// Column titles of a source sheet, in storage order.
pub const HEADER: [&str; 8] = [
    "source",
    "courseName",
    "title",
    "availableFrom",
    "dueAt",
    "linkURL",
    "sinkTaskID",
    "lifecycleFlag",
];

/// Upstream system an assignment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    /// Session-authenticated learning portal (scraped)
    Portal,
    /// Course-work API
    CourseWork,
}

impl Source {
    pub const ALL: [Source; 2] = [Source::Portal, Source::CourseWork];

    /// Label written into the `source` column.
    pub fn label(&self) -> &'static str {
        match self {
            Source::Portal => "WebClass",
            Source::CourseWork => "Classroom",
        }
    }

    /// Name of the sheet holding this source's rows.
    pub fn sheet_name(&self) -> &'static str {
        match self {
            Source::Portal => "webclass",
            Source::CourseWork => "classroom",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Source {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "WebClass" => Ok(Source::Portal),
            "Classroom" => Ok(Source::CourseWork),
            other => Err(AppError::validation(format!("unknown source '{other}'"))),
        }
    }
}

/// Per-row registration state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LifecycleFlag {
    #[default]
    Empty,
    Registered,
    Completed,
    Deleted,
    Expired,
    SkippedNoDate,
}

impl LifecycleFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleFlag::Empty => "",
            LifecycleFlag::Registered => "REGISTERED",
            LifecycleFlag::Completed => "COMPLETED",
            LifecycleFlag::Deleted => "DELETED",
            LifecycleFlag::Expired => "EXPIRED",
            LifecycleFlag::SkippedNoDate => "SKIPPED_NODATE",
        }
    }

    /// Terminal flags are never re-evaluated and only await cleanup.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecycleFlag::Completed
                | LifecycleFlag::Deleted
                | LifecycleFlag::Expired
                | LifecycleFlag::SkippedNoDate
        )
    }
}

impl fmt::Display for LifecycleFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleFlag {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Ok(LifecycleFlag::Empty),
            "REGISTERED" => Ok(LifecycleFlag::Registered),
            "COMPLETED" => Ok(LifecycleFlag::Completed),
            "DELETED" => Ok(LifecycleFlag::Deleted),
            "EXPIRED" => Ok(LifecycleFlag::Expired),
            "SKIPPED_NODATE" => Ok(LifecycleFlag::SkippedNoDate),
            other => Err(AppError::validation(format!(
                "unknown lifecycle flag '{other}'"
            ))),
        }
    }
}

/// One row of tracked work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub source: Source,
    pub course_name: String,
    pub title: String,
    /// Raw availability start as shown upstream (may be empty)
    pub available_from: String,
    /// Raw deadline as shown upstream; empty or unparseable means no deadline
    pub due_at: String,
    /// Identity key across scans
    pub link_url: String,
    pub sink_task_id: Option<String>,
    pub lifecycle_flag: LifecycleFlag,
}

impl AssignmentRecord {
    /// A freshly scanned row with no sink linkage.
    pub fn new(
        source: Source,
        course_name: impl Into<String>,
        title: impl Into<String>,
        available_from: impl Into<String>,
        due_at: impl Into<String>,
        link_url: impl Into<String>,
    ) -> Self {
        Self {
            source,
            course_name: course_name.into(),
            title: title.into(),
            available_from: available_from.into(),
            due_at: due_at.into(),
            link_url: link_url.into(),
            sink_task_id: None,
            lifecycle_flag: LifecycleFlag::Empty,
        }
    }

    /// Parsed deadline, if any.
    pub fn due(&self) -> Option<NaiveDateTime> {
        parse_assignment_date(&self.due_at)
    }

    /// Serialize to the fixed column order of [`HEADER`].
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.source.label().to_string(),
            self.course_name.clone(),
            self.title.clone(),
            self.available_from.clone(),
            self.due_at.clone(),
            self.link_url.clone(),
            self.sink_task_id.clone().unwrap_or_default(),
            self.lifecycle_flag.as_str().to_string(),
        ]
    }

    /// Rebuild a record from a stored row.
    ///
    /// `fallback` is used when the source column is blank. An unknown flag is
    /// read as EMPTY with a warning so a stray cell cannot stall the run.
    pub fn from_row(row: &[String], fallback: Source) -> Result<Self, AppError> {
        if row.len() < HEADER.len() {
            return Err(AppError::validation(format!(
                "row has {} columns, expected {}",
                row.len(),
                HEADER.len()
            )));
        }

        let source = if row[0].trim().is_empty() {
            fallback
        } else {
            row[0].parse()?
        };
        let sink_task_id = Some(row[6].trim().to_string()).filter(|id| !id.is_empty());
        let lifecycle_flag = row[7].parse().unwrap_or_else(|e| {
            log::warn!("{e}; treating row '{}' as unflagged", row[5]);
            LifecycleFlag::Empty
        });

        Ok(Self {
            source,
            course_name: row[1].clone(),
            title: row[2].clone(),
            available_from: row[3].clone(),
            due_at: row[4].clone(),
            link_url: row[5].trim().to_string(),
            sink_task_id,
            lifecycle_flag,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AssignmentRecord {
        AssignmentRecord::new(
            Source::Portal,
            "Algorithms",
            "Report 1",
            "2024/11/20 09:00",
            "2024/12/01 23:59",
            "https://lms.example.ac.jp/webclass/login.php?id=ab12&page=1&auth_mode=SAML",
        )
    }

    #[test]
    fn row_preserves_linkage() {
        let mut record = sample();
        record.sink_task_id = Some("T1".into());
        record.lifecycle_flag = LifecycleFlag::Registered;

        let row = record.to_row();
        assert_eq!(row.len(), HEADER.len());
        assert_eq!(row[0], "WebClass");
        assert_eq!(row[7], "REGISTERED");

        let back = AssignmentRecord::from_row(&row, Source::CourseWork).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn blank_task_id_reads_as_none() {
        let row = sample().to_row();
        let back = AssignmentRecord::from_row(&row, Source::Portal).unwrap();
        assert_eq!(back.sink_task_id, None);
        assert_eq!(back.lifecycle_flag, LifecycleFlag::Empty);
    }

    #[test]
    fn unknown_flag_reads_as_empty() {
        let mut row = sample().to_row();
        row[7] = "REGISTERD".into();
        let back = AssignmentRecord::from_row(&row, Source::Portal).unwrap();
        assert_eq!(back.lifecycle_flag, LifecycleFlag::Empty);
    }

    #[test]
    fn short_row_is_rejected() {
        let row = vec!["WebClass".to_string(), "x".to_string()];
        assert!(AssignmentRecord::from_row(&row, Source::Portal).is_err());
    }

    #[test]
    fn terminal_flags() {
        assert!(!LifecycleFlag::Empty.is_terminal());
        assert!(!LifecycleFlag::Registered.is_terminal());
        assert!(LifecycleFlag::Completed.is_terminal());
        assert!(LifecycleFlag::Deleted.is_terminal());
        assert!(LifecycleFlag::Expired.is_terminal());
        assert!(LifecycleFlag::SkippedNoDate.is_terminal());
    }

    #[test]
    fn due_parses_raw_text() {
        let record = sample();
        let due = record.due().unwrap();
        assert_eq!(due.format("%Y-%m-%d %H:%M").to_string(), "2024-12-01 23:59");
    }
}
