// src/settings.rs

//! Per-user persisted settings.
//!
//! A flat string key-value store kept as `settings.json` next to the sheets.
//! Credentials, the task list binding, the trigger hour and the cleanup grace
//! period live here; static endpoints live in `config.toml` instead.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

pub const USER_ID: &str = "userid";
pub const PASSWORD: &str = "password";
pub const TASK_LIST_ID: &str = "taskListId";
pub const TASK_LIST_NAME: &str = "taskListName";
pub const TRIGGER_HOUR: &str = "triggerHour";
pub const CLEANUP_DAYS: &str = "cleanupDays";
pub const ACCESS_TOKEN: &str = "accessToken";

/// Portal login credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub userid: String,
    pub password: String,
}

/// Task sink related settings chosen by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSettings {
    pub task_list_name: String,
    pub trigger_hour: u32,
    pub cleanup_days: i64,
}

/// JSON-file backed settings store.
#[derive(Debug, Clone)]
pub struct Settings {
    path: Option<PathBuf>,
    values: BTreeMap<String, String>,
}

impl Settings {
    /// Load settings from a file; a missing file is an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: Some(path),
            values,
        })
    }

    /// Store that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Value for a key; blank values count as absent.
    pub fn get_setting(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Value for a key that a scan cannot proceed without.
    pub fn require(&self, key: &str) -> Result<String> {
        self.get_setting(key)
            .ok_or_else(|| AppError::config_missing(key))
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        self.values.insert(key.to_string(), value.into());
        self.save()
    }

    pub fn credentials(&self) -> Result<Credentials> {
        Ok(Credentials {
            userid: self.require(USER_ID)?,
            password: self.require(PASSWORD)?,
        })
    }

    pub fn save_auth(&mut self, credentials: &Credentials) -> Result<()> {
        if credentials.userid.trim().is_empty() || credentials.password.is_empty() {
            return Err(AppError::validation("user ID and password are required"));
        }
        self.values
            .insert(USER_ID.to_string(), credentials.userid.trim().to_string());
        self.values
            .insert(PASSWORD.to_string(), credentials.password.clone());
        self.save()
    }

    pub fn save_tasks(&mut self, tasks: &TaskSettings) -> Result<()> {
        if tasks.trigger_hour > 23 {
            return Err(AppError::validation("trigger hour must be within 0-23"));
        }
        if tasks.cleanup_days < 0 {
            return Err(AppError::validation("cleanup days must be >= 0"));
        }
        self.values
            .insert(TASK_LIST_NAME.to_string(), tasks.task_list_name.clone());
        self.values
            .insert(TRIGGER_HOUR.to_string(), tasks.trigger_hour.to_string());
        self.values
            .insert(CLEANUP_DAYS.to_string(), tasks.cleanup_days.to_string());
        self.save()
    }

    pub fn task_list_id(&self) -> Option<String> {
        self.get_setting(TASK_LIST_ID)
    }

    pub fn set_task_list_id(&mut self, id: &str) -> Result<()> {
        self.set(TASK_LIST_ID, id)
    }

    /// API access token from the settings, else from the named environment variable.
    pub fn access_token(&self, env_var: &str) -> Result<String> {
        self.get_setting(ACCESS_TOKEN)
            .or_else(|| {
                std::env::var(env_var)
                    .ok()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
            })
            .ok_or_else(|| AppError::config_missing(ACCESS_TOKEN))
    }

    /// Numeric setting, falling back when absent or malformed.
    pub fn get_number<T: std::str::FromStr>(&self, key: &str, fallback: T) -> T {
        match self.get_setting(key) {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                log::warn!("Setting {key}='{raw}' is not a number; using default");
                fallback
            }),
            None => fallback,
        }
    }

    /// Forget every stored value.
    pub fn reset_all(&mut self) -> Result<()> {
        self.values.clear();
        self.save()
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&self.values)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}
