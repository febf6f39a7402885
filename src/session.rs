//! Presentation-facing orchestration
//!
//! A `Session` owns the current view of the library (items, tag forest,
//! associations) and the commands a front end issues against it. Every
//! mutation is followed by a full reload; the view is only replaced once
//! the reload has fully succeeded, so a failed command leaves the last
//! good view in place.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::scan::details::{spawn_detail_loading, ItemDetails};
use crate::scan::folder::scan_folder;
use crate::state::data::{CatalogItem, ItemId, ItemTag, Tag, TagId};
use crate::state::library::Library;
use crate::state::query::LibraryQuery;
use crate::state::reconcile::{FsProbe, PathProbe, Reconciler};
use crate::state::run_blocking;
use crate::state::settings::SettingsStore;
use crate::state::tags::TagHierarchy;

/// What the presentation layer currently shows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LibraryView {
    pub items: Vec<CatalogItem>,
    pub tags: Vec<Tag>,
    pub associations: Vec<ItemTag>,
}

/// Result of adding a folder to the library
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddFolderOutcome {
    pub scanned: usize,
    pub added: usize,
}

pub struct Session {
    library: Library,
    settings: SettingsStore,
    reconciler: Reconciler,
    tags: TagHierarchy,
    query: LibraryQuery,
    media_extensions: Vec<String>,
    view: LibraryView,
}

impl Session {
    /// Open the store and resume the last library if one was recorded
    pub async fn start(config: Config) -> Result<Self> {
        let Config {
            database_path,
            settings_path,
            media_extensions,
        } = config;

        let library = run_blocking(move || Library::open(database_path)).await?;
        let count = {
            let library = library.clone();
            run_blocking(move || library.item_count()).await?
        };
        info!(count, "Library opened");
        let settings = SettingsStore::new(settings_path);
        let mut session = Self::with_parts(library, settings, Arc::new(FsProbe), media_extensions);

        match session.resume_last_library().await? {
            Some(pruned) => info!(pruned, items = session.view.items.len(), "Resumed last library"),
            None => session.reload().await?,
        }

        Ok(session)
    }

    /// Assemble a session from already-opened parts
    pub fn with_parts(
        library: Library,
        settings: SettingsStore,
        probe: Arc<dyn PathProbe>,
        media_extensions: Vec<String>,
    ) -> Self {
        Self {
            reconciler: Reconciler::with_probe(library.clone(), probe),
            tags: TagHierarchy::new(library.clone()),
            query: LibraryQuery::new(library.clone()),
            library,
            settings,
            media_extensions,
            view: LibraryView::default(),
        }
    }

    pub fn view(&self) -> &LibraryView {
        &self.view
    }

    /// The primary source folder, if a library has been built before
    pub async fn last_library_source(&self) -> Result<Option<PathBuf>> {
        let settings = self.settings.clone();
        run_blocking(move || settings.last_library_source()).await
    }

    /// Validate and reload when a library was built before.
    /// Returns the number of pruned items, or None if there was nothing to resume.
    pub async fn resume_last_library(&mut self) -> Result<Option<usize>> {
        let Some(source) = self.last_library_source().await? else {
            return Ok(None);
        };

        info!(source = %source.display(), "Validating library");
        let pruned = self.reconciler.validate().await?;
        self.reload().await?;
        Ok(Some(pruned))
    }

    /// Re-read items, tags and associations from the store
    pub async fn reload(&mut self) -> Result<()> {
        let items = self.query.get_items().await?;
        let tags = self.query.get_tag_forest().await?;
        let associations = self.query.get_associations().await?;

        info!(items = items.len(), "Library loaded from database");
        self.view = LibraryView {
            items,
            tags,
            associations,
        };
        Ok(())
    }

    /// Scan one level of `root` and merge it into the library.
    ///
    /// The first folder ever added becomes the recorded library source;
    /// later additions don't overwrite it.
    pub async fn add_folder(&mut self, root: &Path) -> Result<AddFolderOutcome> {
        let discovered = scan_folder(root.to_path_buf(), self.media_extensions.clone()).await?;
        let scanned = discovered.len();

        let added = if discovered.is_empty() {
            0
        } else {
            self.reconciler.add_scan_results(discovered).await?
        };

        self.reload().await?;

        match tokio::fs::canonicalize(root).await {
            Ok(source) => {
                let settings = self.settings.clone();
                run_blocking(move || settings.record_first_source(&source)).await?;
            }
            Err(e) => warn!(root = %root.display(), error = %e, "Could not resolve library source"),
        }

        Ok(AddFolderOutcome { scanned, added })
    }

    /// Prune missing items and reload
    pub async fn validate(&mut self) -> Result<usize> {
        let pruned = self.reconciler.validate().await?;
        self.reload().await?;
        Ok(pruned)
    }

    /// Drop every item; tags survive
    pub async fn clear_library(&mut self) -> Result<()> {
        self.reconciler.clear_library().await?;
        self.reload().await
    }

    pub async fn add_tag(&mut self, name: String, parent_id: Option<TagId>) -> Result<TagId> {
        let (id, forest) = self.tags.add_tag(name, parent_id).await?;
        self.view.tags = forest;
        Ok(id)
    }

    pub async fn rename_tag(&mut self, id: TagId, name: String) -> Result<()> {
        self.view.tags = self.tags.rename_tag(id, name).await?;
        Ok(())
    }

    pub async fn set_tag_color(&mut self, id: TagId, color: Option<String>) -> Result<()> {
        self.view.tags = self.tags.set_tag_color(id, color).await?;
        Ok(())
    }

    pub async fn move_tag(&mut self, id: TagId, new_parent: Option<TagId>) -> Result<()> {
        self.view.tags = self.tags.move_tag(id, new_parent).await?;
        Ok(())
    }

    /// Delete a tag subtree; associations go with it
    pub async fn delete_tag(&mut self, id: TagId) -> Result<()> {
        self.tags.delete_tag(id).await?;
        self.reload().await
    }

    pub async fn assign_tag(&mut self, item_id: ItemId, tag_id: TagId) -> Result<bool> {
        let added = self.tags.assign_tag(item_id, tag_id).await?;
        self.reload().await?;
        Ok(added)
    }

    pub async fn unassign_tag(&mut self, item_id: ItemId, tag_id: TagId) -> Result<bool> {
        let removed = self.tags.unassign_tag(item_id, tag_id).await?;
        self.reload().await?;
        Ok(removed)
    }

    pub async fn items_tagged(&self, tag_id: TagId) -> Result<Vec<CatalogItem>> {
        self.query.get_items_tagged(tag_id).await
    }

    pub async fn tags_for_item(&self, item_id: ItemId) -> Result<Vec<Tag>> {
        self.tags.tags_for_item(item_id).await
    }

    /// Kick off background detail loading for the displayed items
    pub fn load_details(&self, sender: mpsc::Sender<ItemDetails>) -> usize {
        spawn_detail_loading(&self.view.items, sender)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("db_path", &self.library.path())
            .field("settings", &self.settings.path())
            .field("items", &self.view.items.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LibraryError;
    use crate::scan::folder::DEFAULT_EXTENSIONS;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        media: PathBuf,
        config: Config,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let media = dir.path().join("media");
        std::fs::create_dir_all(media.join("Season 1")).unwrap();
        std::fs::write(media.join("pilot.mp4"), b"pilot").unwrap();
        std::fs::write(media.join("finale.mkv"), b"finale").unwrap();
        std::fs::write(media.join("cover.jpg"), b"jpg").unwrap();

        let config = Config {
            database_path: dir.path().join("db").join("library.db"),
            settings_path: dir.path().join("settings.json"),
            media_extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        };
        Fixture {
            _dir: dir,
            media,
            config,
        }
    }

    #[tokio::test]
    async fn test_add_folder_twice_is_idempotent() {
        let fx = fixture();
        let mut session = Session::start(fx.config.clone()).await.unwrap();
        assert!(session.view().items.is_empty());

        let first = session.add_folder(&fx.media).await.unwrap();
        assert_eq!(first, AddFolderOutcome { scanned: 3, added: 3 });
        let items = session.view().items.clone();

        let second = session.add_folder(&fx.media).await.unwrap();
        assert_eq!(second, AddFolderOutcome { scanned: 3, added: 0 });
        assert_eq!(session.view().items, items);
    }

    #[tokio::test]
    async fn test_first_source_is_recorded_once() {
        let fx = fixture();
        let other = fx.media.join("Season 1");
        std::fs::write(other.join("e01.avi"), b"e01").unwrap();

        let mut session = Session::start(fx.config.clone()).await.unwrap();
        session.add_folder(&fx.media).await.unwrap();
        session.add_folder(&other).await.unwrap();

        let recorded = session.last_library_source().await.unwrap().unwrap();
        assert_eq!(recorded, std::fs::canonicalize(&fx.media).unwrap());
        assert_eq!(session.view().items.len(), 4);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_fresh_session_has_nothing_to_resume() {
        let fx = fixture();
        let mut session = Session::start(fx.config.clone()).await.unwrap();

        assert_eq!(session.last_library_source().await.unwrap(), None);
        assert_eq!(session.resume_last_library().await.unwrap(), None);
        assert!(fx.config.database_path.exists());
    }

    #[tokio::test]
    async fn test_restart_validates_recorded_library() {
        let fx = fixture();
        {
            let mut session = Session::start(fx.config.clone()).await.unwrap();
            session.add_folder(&fx.media).await.unwrap();
        }

        std::fs::remove_file(fx.media.join("pilot.mp4")).unwrap();

        let session = Session::start(fx.config.clone()).await.unwrap();
        let names: Vec<&str> = session.view().items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Season 1", "finale"]);
    }

    #[tokio::test]
    async fn test_failed_command_keeps_view() {
        let fx = fixture();
        let mut session = Session::start(fx.config.clone()).await.unwrap();
        session.add_folder(&fx.media).await.unwrap();
        let tag = session.add_tag("Favorites".to_string(), None).await.unwrap();
        let before = session.view().clone();

        assert!(matches!(
            session.rename_tag(404, "Nope".to_string()).await,
            Err(LibraryError::NotFound { .. })
        ));
        assert!(session.add_folder(&fx.media.join("missing")).await.is_err());
        assert!(session.add_tag("Child".to_string(), Some(tag + 50)).await.is_err());

        assert_eq!(session.view(), &before);
    }

    #[tokio::test]
    async fn test_tag_commands_update_view() {
        let fx = fixture();
        let mut session = Session::start(fx.config.clone()).await.unwrap();
        session.add_folder(&fx.media).await.unwrap();
        let item = session.view().items[1].id.unwrap();

        let genre = session.add_tag("Genre".to_string(), None).await.unwrap();
        let comedy = session.add_tag("Comedy".to_string(), Some(genre)).await.unwrap();
        session.set_tag_color(comedy, Some("#00FF00".to_string())).await.unwrap();
        assert!(session.assign_tag(item, comedy).await.unwrap());
        assert_eq!(session.view().associations.len(), 1);
        assert_eq!(session.tags_for_item(item).await.unwrap()[0].id, comedy);

        session.delete_tag(genre).await.unwrap();
        assert!(session.view().tags.is_empty());
        assert!(session.view().associations.is_empty());
    }

    #[tokio::test]
    async fn test_clear_library_keeps_tags() {
        let fx = fixture();
        let mut session = Session::start(fx.config.clone()).await.unwrap();
        session.add_folder(&fx.media).await.unwrap();
        session.add_tag("Keep".to_string(), None).await.unwrap();
        let tags = session.view().tags.clone();

        session.clear_library().await.unwrap();

        assert!(session.view().items.is_empty());
        assert_eq!(session.view().tags, tags);
    }

    #[tokio::test]
    async fn test_load_details_for_view() {
        let fx = fixture();
        let mut session = Session::start(fx.config.clone()).await.unwrap();
        session.add_folder(&fx.media).await.unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        assert_eq!(session.load_details(tx), 3);

        let mut count = 0;
        while let Some(details) = rx.recv().await {
            assert!(details.readable);
            count += 1;
        }
        assert_eq!(count, 3);
    }
}
