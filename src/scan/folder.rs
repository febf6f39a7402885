//! One-level folder scan into catalog entries

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::media::probe_duration;
use crate::error::{LibraryError, Result};
use crate::state::data::CatalogItem;
use crate::state::run_blocking;

/// Video extensions picked up when no configuration overrides them
pub const DEFAULT_EXTENSIONS: &[&str] = &["mp4", "wmv", "mov", "mkv", "avi"];

/// List the immediate children of `root` as catalog entries.
///
/// Subfolders are recorded as folder entries but not descended into.
/// Files are kept only if their extension (case-insensitive) is in
/// `extensions`, and carry the duration read from their container.
/// Entries whose path is not valid UTF-8 are skipped, since the catalog
/// could not find them again. Folders come first, then files, each sorted
/// by name.
pub async fn scan_folder(root: PathBuf, extensions: Vec<String>) -> Result<Vec<CatalogItem>> {
    run_blocking(move || scan_folder_blocking(&root, &extensions)).await
}

/// Blocking implementation of the folder scan
pub fn scan_folder_blocking(root: &Path, extensions: &[String]) -> Result<Vec<CatalogItem>> {
    // Catalog paths are absolute; an unreadable root is an error rather
    // than an empty scan
    let root = std::fs::canonicalize(root)?;
    if !std::fs::metadata(&root)?.is_dir() {
        return Err(LibraryError::InvalidInput(format!(
            "{} is not a folder",
            root.display()
        )));
    }

    info!(root = %root.display(), "Scanning folder");

    let mut folders = Vec::new();
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "Skipping entry without metadata");
                continue;
            }
        };

        let path = entry.path();
        let Some(path_str) = path.to_str().map(str::to_string) else {
            warn!(path = %path.display(), "Skipping entry with a non UTF-8 path");
            continue;
        };
        let modified_at = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        if metadata.is_dir() {
            let name = entry.file_name().to_string_lossy().to_string();
            folders.push(CatalogItem::folder(path_str, name, modified_at));
            continue;
        }

        if !metadata.is_file() || !has_media_extension(path, extensions) {
            continue;
        }

        // Display name drops the extension
        let name = path
            .file_stem()
            .unwrap_or_else(|| entry.file_name())
            .to_string_lossy()
            .to_string();

        files.push(CatalogItem::file(
            path_str,
            name,
            metadata.len(),
            modified_at,
            probe_duration(path),
        ));
    }

    debug!(folders = folders.len(), files = files.len(), "Folder scan complete");

    folders.append(&mut files);
    Ok(folders)
}

fn has_media_extension(path: &Path, extensions: &[String]) -> bool {
    match path.extension() {
        Some(extension) => {
            let ext = extension.to_string_lossy();
            extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(&ext))
        }
        None => false,
    }
}
