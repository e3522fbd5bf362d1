// src/config.rs

//! Configuration loading utilities.
//!
//! Everything lives in one storage directory: `config.toml` for static
//! configuration, `settings.json` for per-user settings, the run journal and
//! one sheet per source.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::Config;
use crate::settings::Settings;
use crate::utils::log::Journal;

pub const CONFIG_FILE: &str = "config.toml";
pub const SETTINGS_FILE: &str = "settings.json";
pub const JOURNAL_FILE: &str = "journal.jsonl";

/// File locations inside a storage directory.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl StoragePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn settings(&self) -> PathBuf {
        self.root.join(SETTINGS_FILE)
    }

    pub fn journal(&self) -> Journal {
        Journal::new(self.root.join(JOURNAL_FILE))
    }
}

/// Load configuration (defaults on failure) and settings from a storage directory.
///
/// The configuration is validated; settings are read as stored.
pub fn load_all(paths: &StoragePaths) -> Result<(Config, Settings)> {
    let config = Config::load_or_default(paths.config());
    config.validate()?;
    let settings = Settings::load(paths.settings())?;
    Ok((config, settings))
}
