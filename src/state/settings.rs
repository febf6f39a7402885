//! Persisted application settings
//!
//! Only one value lives here: the folder the library was first built
//! from. Its presence at startup means "a library exists, validate and
//! reload it".

use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::Result;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Settings {
    /// Primary library source folder; set once, never overwritten
    #[serde(default)]
    pub last_library_source: Option<PathBuf>,
}

impl Settings {
    /// Convert to JSON string for storage
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse from JSON string
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// JSON file holding `Settings`
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the settings file; a missing file yields defaults
    pub fn load(&self) -> Result<Settings> {
        match std::fs::read_to_string(&self.path) {
            Ok(json) => Ok(Settings::from_json(&json)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Settings::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the settings file, replacing it in one rename
    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, settings.to_json()?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn last_library_source(&self) -> Result<Option<PathBuf>> {
        Ok(self.load()?.last_library_source)
    }

    /// Remember `source` as the primary library folder unless one is already
    /// recorded. Returns true if it was written.
    pub fn record_first_source(&self, source: &Path) -> Result<bool> {
        let mut settings = self.load()?;
        if settings.last_library_source.is_some() {
            return Ok(false);
        }

        settings.last_library_source = Some(source.to_path_buf());
        self.save(&settings)?;
        info!(source = %source.display(), "Primary library source folder set");
        Ok(true)
    }
}
