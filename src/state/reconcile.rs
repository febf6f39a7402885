//! Catalog reconciliation
//!
//! Brings the stored item set into agreement with what is on disk: new scan
//! results are merged by path, and entries whose file or folder vanished
//! are pruned.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::data::{CatalogItem, ItemId};
use super::library::Library;
use super::run_blocking;
use crate::error::{LibraryError, Result};

/// Answers "does this catalog entry still exist?"
pub trait PathProbe: Send + Sync {
    /// `Ok(false)` only when the object is definitely gone
    fn exists(&self, path: &Path, is_folder: bool) -> Result<bool>;
}

/// Probes the real filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe;

impl PathProbe for FsProbe {
    fn exists(&self, path: &Path, is_folder: bool) -> Result<bool> {
        match std::fs::metadata(path) {
            Ok(meta) if is_folder => Ok(meta.is_dir()),
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(LibraryError::IoProbe {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

/// Merges scans into the store and prunes missing entries
#[derive(Clone)]
pub struct Reconciler {
    library: Library,
    probe: Arc<dyn PathProbe>,
}

impl Reconciler {
    pub fn new(library: Library) -> Self {
        Self::with_probe(library, Arc::new(FsProbe))
    }

    pub fn with_probe(library: Library, probe: Arc<dyn PathProbe>) -> Self {
        Self { library, probe }
    }

    /// Insert every discovered item whose path is new.
    ///
    /// Known paths are left exactly as they are, so running the same scan
    /// twice is a no-op the second time. Returns the number added.
    pub async fn add_scan_results(&self, discovered: Vec<CatalogItem>) -> Result<usize> {
        let library = self.library.clone();
        let offered = discovered.len();
        let added = run_blocking(move || library.insert_items_if_absent(&discovered)).await?;

        info!(offered, added, skipped = offered - added, "Scan results merged");
        Ok(added)
    }

    /// Remove every stored item that no longer exists. Returns the count removed.
    ///
    /// The existence probe runs outside the delete transaction: a file that
    /// reappears between the probe and the delete is still pruned, and will
    /// come back on the next scan. Items that can't be probed are kept.
    pub async fn validate(&self) -> Result<usize> {
        let library = self.library.clone();
        let probe = Arc::clone(&self.probe);

        run_blocking(move || {
            let items = library.list_items()?;
            let missing = find_missing(&items, probe.as_ref());

            if missing.is_empty() {
                debug!(checked = items.len(), "Library validated, nothing missing");
                return Ok(0);
            }

            let removed = library.delete_items(&missing)?;
            info!(checked = items.len(), removed, "Pruned missing items from library");
            Ok(removed)
        })
        .await
    }

    /// Remove every item and association; the tag taxonomy survives
    pub async fn clear_library(&self) -> Result<()> {
        let library = self.library.clone();
        run_blocking(move || library.clear_items()).await
    }
}

/// Ids of items whose backing object is gone
fn find_missing(items: &[CatalogItem], probe: &dyn PathProbe) -> Vec<ItemId> {
    items
        .iter()
        .filter_map(|item| {
            let id = item.id?;
            match probe.exists(Path::new(&item.path), item.is_folder) {
                Ok(true) => None,
                Ok(false) => Some(id),
                Err(e) => {
                    // Unprobeable items count as present
                    warn!(id, error = %e, "Existence check failed, keeping item");
                    None
                }
            }
        })
        .collect()
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("library", &self.library)
            .finish_non_exhaustive()
    }
}
