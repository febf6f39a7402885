//! Configuration loading and path resolution

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{LibraryError, Result};
use crate::scan::folder::DEFAULT_EXTENSIONS;
use crate::state::library::Library;

/// Contents of the optional TOML config file
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    pub database_path: Option<PathBuf>,
    pub settings_path: Option<PathBuf>,
    pub media_extensions: Option<Vec<String>>,
}

impl FileConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| LibraryError::Config(e.to_string()))
    }
}

/// Fully resolved runtime configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_path: PathBuf,
    pub settings_path: PathBuf,
    /// Lowercase file extensions picked up by folder scans
    pub media_extensions: Vec<String>,
}

impl Config {
    /// Resolve the configuration.
    ///
    /// Database path priority order:
    /// 1. Command-line argument or `MEDIA_SHELF_DB` (clap merges the two,
    ///    the flag wins)
    /// 2. TOML config file
    /// 3. OS-dependent default (fallback)
    ///
    /// An explicitly named config file must exist; the default one is optional.
    pub fn resolve(cli_db: Option<PathBuf>, config_file: Option<&Path>) -> Result<Self> {
        let file_config = match config_file {
            Some(path) => load_file_config(path)?,
            None => match default_config_file() {
                Some(path) if path.exists() => load_file_config(&path)?,
                _ => FileConfig::default(),
            },
        };

        Self::from_sources(cli_db, file_config)
    }

    /// Merge already-gathered sources
    pub fn from_sources(cli_db: Option<PathBuf>, file_config: FileConfig) -> Result<Self> {
        let database_path = match cli_db.or(file_config.database_path) {
            Some(path) => path,
            None => Library::default_db_path()?,
        };

        let settings_path = match file_config.settings_path {
            Some(path) => path,
            None => default_settings_path()?,
        };

        let media_extensions = file_config
            .media_extensions
            .unwrap_or_else(|| DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect())
            .into_iter()
            .map(|ext| ext.trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();

        Ok(Config {
            database_path,
            settings_path,
            media_extensions,
        })
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| LibraryError::Config(format!("Cannot read {}: {}", path.display(), e)))?;
    debug!(path = %path.display(), "Loaded config file");
    FileConfig::from_toml(&content)
}

/// `<config_dir>/media-shelf/config.toml`
fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("media-shelf").join("config.toml"))
}

fn default_settings_path() -> Result<PathBuf> {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .map(|d| d.join("media-shelf").join("settings.json"))
        .ok_or_else(|| LibraryError::Config("Could not determine config directory".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file_config() -> FileConfig {
        FileConfig {
            database_path: Some(PathBuf::from("/from/file.db")),
            settings_path: Some(PathBuf::from("/from/settings.json")),
            media_extensions: None,
        }
    }

    #[test]
    fn test_cli_beats_file() {
        let config = Config::from_sources(Some(PathBuf::from("/from/cli.db")), file_config()).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/from/cli.db"));
        assert_eq!(config.settings_path, PathBuf::from("/from/settings.json"));
    }

    #[test]
    fn test_file_then_default_extensions() {
        let config = Config::from_sources(None, file_config()).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/from/file.db"));
        assert_eq!(config.media_extensions, vec!["mp4", "wmv", "mov", "mkv", "avi"]);
    }

    #[test]
    fn test_parse_toml_and_normalize_extensions() {
        let parsed = FileConfig::from_toml(
            r#"
            database_path = "/data/lib.db"
            settings_path = "/data/settings.json"
            media_extensions = [".MP4", "webm", ""]
            "#,
        )
        .unwrap();
        assert_eq!(parsed.database_path, Some(PathBuf::from("/data/lib.db")));

        let config = Config::from_sources(None, parsed).unwrap();
        assert_eq!(config.media_extensions, vec!["mp4", "webm"]);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            FileConfig::from_toml("database_path = ["),
            Err(LibraryError::Config(_))
        ));
    }

    #[test]
    fn test_explicit_missing_config_file() {
        let dir = TempDir::new().unwrap();
        let result = Config::resolve(None, Some(dir.path().join("absent.toml").as_path()));
        assert!(matches!(result, Err(LibraryError::Config(_))));
    }
}
