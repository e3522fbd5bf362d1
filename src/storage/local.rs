//! Local filesystem storage implementation.
//!
//! Every sheet is a pretty-printed JSON file under the root directory,
//! replaced atomically (written to a temp file, then renamed) so a crash
//! mid-write never leaves a half-written sheet behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{HEADER, Source};
use crate::storage::{SheetData, SheetStorage};

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    fn sheet_key(source: Source) -> String {
        format!("{}.json", source.sheet_name())
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SheetStorage for LocalStorage {
    async fn read_rows(&self, source: Source) -> Result<Vec<Vec<String>>> {
        let key = Self::sheet_key(source);
        match self.read_json::<SheetData>(&key).await? {
            Some(sheet) => {
                if sheet.header.iter().map(String::as_str).ne(HEADER.iter().copied()) {
                    log::warn!("Sheet '{}' has an unexpected header {:?}", key, sheet.header);
                }
                Ok(sheet.rows)
            }
            None => {
                log::debug!("No {} found", key);
                Ok(Vec::new())
            }
        }
    }

    async fn write_rows(&self, source: Source, rows: &[Vec<String>]) -> Result<()> {
        let key = Self::sheet_key(source);
        self.write_json(&key, &SheetData::new(rows.to_vec())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AssignmentRecord;
    use crate::storage::{load_records, save_records};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_and_read() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        storage.write_bytes("test.txt", b"hello").await.unwrap();
        let data = storage.read_bytes("test.txt").await.unwrap();
        assert_eq!(data, Some(b"hello".to_vec()));
        assert!(!tmp.path().join("test.tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_sheet_is_empty() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path().join("nested"));
        assert!(storage.read_rows(Source::Portal).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sheets_are_separate_and_keep_header() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        let record = AssignmentRecord::new(
            Source::CourseWork,
            "Physics",
            "Lab",
            "",
            "2024/12/01 23:59",
            "https://classroom.example.com/a/1",
        );
        save_records(&storage, Source::CourseWork, &[record.clone()])
            .await
            .unwrap();

        assert!(load_records(&storage, Source::Portal).await.unwrap().is_empty());
        assert_eq!(
            load_records(&storage, Source::CourseWork).await.unwrap(),
            vec![record]
        );

        let raw: SheetData = storage
            .read_json("classroom.json")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(raw.header, HEADER.to_vec());
    }

    #[tokio::test]
    async fn test_undecodable_rows_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        let good = AssignmentRecord::new(Source::Portal, "C", "T", "", "", "https://x/1");

        storage
            .write_rows(
                Source::Portal,
                &[vec!["too".into(), "short".into()], good.to_row()],
            )
            .await
            .unwrap();

        assert_eq!(load_records(&storage, Source::Portal).await.unwrap(), vec![good]);
    }
}
