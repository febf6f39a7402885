//! Read-only projections for the presentation layer.
//!
//! Every call reads straight from the store; there is no cache to
//! invalidate, so callers simply re-query after a mutation.

use super::data::{CatalogItem, ItemTag, Tag, TagId};
use super::library::Library;
use super::run_blocking;
use super::tags::build_forest;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct LibraryQuery {
    library: Library,
}

impl LibraryQuery {
    pub fn new(library: Library) -> Self {
        Self { library }
    }

    pub async fn get_items(&self) -> Result<Vec<CatalogItem>> {
        let library = self.library.clone();
        run_blocking(move || library.list_items()).await
    }

    pub async fn get_tag_forest(&self) -> Result<Vec<Tag>> {
        let library = self.library.clone();
        let flat = run_blocking(move || library.list_tags()).await?;
        Ok(build_forest(flat))
    }

    pub async fn get_associations(&self) -> Result<Vec<ItemTag>> {
        let library = self.library.clone();
        run_blocking(move || library.list_associations()).await
    }

    /// Items carrying a given tag
    pub async fn get_items_tagged(&self, tag_id: TagId) -> Result<Vec<CatalogItem>> {
        let library = self.library.clone();
        run_blocking(move || library.items_for_tag(tag_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_queries_reflect_store_without_caching() {
        let dir = TempDir::new().unwrap();
        let library = Library::open(dir.path().join("library.db")).unwrap();
        let query = LibraryQuery::new(library.clone());

        assert!(query.get_items().await.unwrap().is_empty());
        assert!(query.get_tag_forest().await.unwrap().is_empty());

        library
            .insert_items_if_absent(&[CatalogItem::folder("/v/show", "show", Utc::now())])
            .unwrap();
        let root = library.insert_tag("Shows", None).unwrap();
        library.insert_tag("Anime", Some(root)).unwrap();
        let item = library.list_items().unwrap()[0].id.unwrap();
        library.assign_tag(item, root).unwrap();

        let items = query.get_items().await.unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].is_folder);

        let forest = query.get_tag_forest().await.unwrap();
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].children.len(), 1);

        assert_eq!(query.get_items_tagged(root).await.unwrap(), items);
    }

    #[tokio::test]
    async fn test_query_before_open_fails() {
        let query = LibraryQuery::new(Library::disconnected());
        assert!(matches!(
            query.get_items().await,
            Err(crate::error::LibraryError::NotConnected)
        ));
    }
}
