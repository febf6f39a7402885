//! Tag hierarchy management
//!
//! Tags are persisted flat, each pointing at its parent by id. The tree the
//! presentation layer shows is assembled on demand from that flat list and
//! thrown away on the next reload.

use std::collections::HashMap;
use tracing::{info, warn};

use super::data::{ItemId, Tag, TagId};
use super::library::Library;
use super::run_blocking;
use crate::error::Result;

/// Assemble a flat tag list into a forest of root tags.
///
/// A tag whose parent is missing from `flat` becomes a root. Tags stuck on a
/// parent cycle (which the store never creates, but an edited database
/// could contain) are promoted to roots so every tag appears exactly once.
/// Roots and children keep the order of `flat`.
pub fn build_forest(flat: Vec<Tag>) -> Vec<Tag> {
    let index: HashMap<TagId, usize> = flat
        .iter()
        .enumerate()
        .map(|(i, tag)| (tag.id, i))
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); flat.len()];
    let mut roots = Vec::new();
    for (i, tag) in flat.iter().enumerate() {
        match tag.parent_id.and_then(|parent| index.get(&parent)) {
            Some(&parent) if parent != i => children[parent].push(i),
            _ => roots.push(i),
        }
    }

    let mut slots: Vec<Option<Tag>> = flat.into_iter().map(Some).collect();
    let mut forest: Vec<Tag> = roots
        .into_iter()
        .filter_map(|root| materialize(root, &children, &mut slots))
        .collect();

    // Anything left was never reachable from a root
    for i in 0..slots.len() {
        if let Some(tag) = &slots[i] {
            warn!(id = tag.id, parent_id = ?tag.parent_id, "Tag parent chain loops; showing it as a root");
        }
        if let Some(tag) = materialize(i, &children, &mut slots) {
            forest.push(tag);
        }
    }

    forest
}

/// Move slot `root` and its not-yet-placed descendants into a tree.
///
/// Iterative, so a deep parent chain can't exhaust the thread stack.
fn materialize(root: usize, children: &[Vec<usize>], slots: &mut [Option<Tag>]) -> Option<Tag> {
    // Claim the subtree in pre-order as (position of parent, tag)
    let mut claimed: Vec<(Option<usize>, Tag)> = Vec::new();
    let mut pending = vec![(None, root)];
    while let Some((parent, i)) = pending.pop() {
        let Some(tag) = slots[i].take() else {
            continue;
        };
        let position = claimed.len();
        claimed.push((parent, tag));
        pending.extend(children[i].iter().rev().map(|&child| (Some(position), child)));
    }

    // Attach bottom-up; a parent always sits before its children
    while let Some((parent, mut tag)) = claimed.pop() {
        tag.children.reverse();
        match parent {
            Some(position) => claimed[position].1.children.push(tag),
            None => return Some(tag),
        }
    }
    None
}

/// Tag mutations followed by a full re-read of the forest.
///
/// The returned forest always comes from the store; nothing is patched in
/// memory.
#[derive(Debug, Clone)]
pub struct TagHierarchy {
    library: Library,
}

impl TagHierarchy {
    pub fn new(library: Library) -> Self {
        Self { library }
    }

    /// Read the tag table and assemble it
    pub async fn forest(&self) -> Result<Vec<Tag>> {
        let library = self.library.clone();
        let flat = run_blocking(move || library.list_tags()).await?;
        Ok(build_forest(flat))
    }

    pub async fn add_tag(&self, name: String, parent_id: Option<TagId>) -> Result<(TagId, Vec<Tag>)> {
        let library = self.library.clone();
        let id = run_blocking(move || library.insert_tag(&name, parent_id)).await?;
        info!(id, ?parent_id, "Tag created");
        Ok((id, self.forest().await?))
    }

    pub async fn rename_tag(&self, id: TagId, name: String) -> Result<Vec<Tag>> {
        let library = self.library.clone();
        run_blocking(move || library.rename_tag(id, &name)).await?;
        self.forest().await
    }

    pub async fn set_tag_color(&self, id: TagId, color: Option<String>) -> Result<Vec<Tag>> {
        let library = self.library.clone();
        run_blocking(move || library.set_tag_color(id, color.as_deref())).await?;
        self.forest().await
    }

    pub async fn move_tag(&self, id: TagId, new_parent: Option<TagId>) -> Result<Vec<Tag>> {
        let library = self.library.clone();
        run_blocking(move || library.move_tag(id, new_parent)).await?;
        self.forest().await
    }

    /// Delete a tag, its descendants and their associations
    pub async fn delete_tag(&self, id: TagId) -> Result<Vec<Tag>> {
        let library = self.library.clone();
        run_blocking(move || library.delete_tag(id)).await?;
        self.forest().await
    }

    pub async fn assign_tag(&self, item_id: ItemId, tag_id: TagId) -> Result<bool> {
        let library = self.library.clone();
        run_blocking(move || library.assign_tag(item_id, tag_id)).await
    }

    pub async fn unassign_tag(&self, item_id: ItemId, tag_id: TagId) -> Result<bool> {
        let library = self.library.clone();
        run_blocking(move || library.unassign_tag(item_id, tag_id)).await
    }

    pub async fn tags_for_item(&self, item_id: ItemId) -> Result<Vec<Tag>> {
        let library = self.library.clone();
        run_blocking(move || library.tags_for_item(item_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LibraryError;
    use tempfile::TempDir;

    fn flat(id: TagId, parent_id: Option<TagId>) -> Tag {
        Tag {
            id,
            name: format!("tag-{}", id),
            color: None,
            parent_id,
            children: Vec::new(),
        }
    }

    /// Depth-first search of a forest by id
    fn find_tag(forest: &[Tag], id: TagId) -> Option<&Tag> {
        forest.iter().find_map(|tag| {
            if tag.id == id {
                Some(tag)
            } else {
                find_tag(&tag.children, id)
            }
        })
    }

    fn ids(tags: &[Tag]) -> Vec<TagId> {
        tags.iter().map(|t| t.id).collect()
    }

    #[test]
    fn test_forest_with_missing_parent() {
        let forest = build_forest(vec![flat(1, None), flat(2, Some(1)), flat(3, Some(99))]);

        assert_eq!(ids(&forest), vec![1, 3]);
        assert_eq!(ids(&forest[0].children), vec![2]);
        assert!(forest[1].children.is_empty());
    }

    #[test]
    fn test_forest_child_listed_before_parent() {
        let forest = build_forest(vec![flat(5, Some(2)), flat(2, None), flat(7, Some(5))]);

        assert_eq!(ids(&forest), vec![2]);
        assert_eq!(ids(&forest[0].children), vec![5]);
        assert_eq!(ids(&forest[0].children[0].children), vec![7]);
    }

    #[test]
    fn test_forest_breaks_parent_cycles() {
        let forest = build_forest(vec![flat(1, Some(2)), flat(2, Some(1)), flat(3, Some(3))]);

        let total: usize = forest.iter().map(Tag::subtree_len).sum();
        assert_eq!(total, 3);
        assert_eq!(ids(&forest), vec![3, 1]);
        assert_eq!(ids(&forest[1].children), vec![2]);
    }

    #[test]
    fn test_forest_handles_deep_chains() {
        const DEPTH: i64 = 200_000;
        let chain: Vec<Tag> = (1..=DEPTH)
            .map(|id| flat(id, if id == 1 { None } else { Some(id - 1) }))
            .collect();

        let mut forest = build_forest(chain);
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].subtree_len(), DEPTH as usize);

        // Unlink level by level so dropping the chain stays shallow too
        let mut expected = 1;
        let mut current = forest.pop();
        while let Some(mut tag) = current {
            assert_eq!(tag.id, expected);
            assert!(tag.children.len() <= 1);
            current = tag.children.pop();
            expected += 1;
        }
        assert_eq!(expected, DEPTH + 1);
    }

    #[tokio::test]
    async fn test_mutations_return_fresh_forest() {
        let dir = TempDir::new().unwrap();
        let library = Library::open(dir.path().join("library.db")).unwrap();
        let tags = TagHierarchy::new(library);

        let (genre, _) = tags.add_tag("Genre".to_string(), None).await.unwrap();
        let (drama, forest) = tags.add_tag("Drama".to_string(), Some(genre)).await.unwrap();
        assert_eq!(ids(&forest), vec![genre]);
        assert_eq!(ids(&forest[0].children), vec![drama]);

        let forest = tags.rename_tag(drama, "Thriller".to_string()).await.unwrap();
        assert_eq!(find_tag(&forest, drama).unwrap().name, "Thriller");

        let forest = tags.move_tag(drama, None).await.unwrap();
        assert_eq!(ids(&forest), vec![genre, drama]);

        let forest = tags.delete_tag(genre).await.unwrap();
        assert_eq!(ids(&forest), vec![drama]);
    }

    #[tokio::test]
    async fn test_failed_mutation_reports_error() {
        let dir = TempDir::new().unwrap();
        let library = Library::open(dir.path().join("library.db")).unwrap();
        let tags = TagHierarchy::new(library);

        assert!(matches!(
            tags.add_tag("Child".to_string(), Some(12)).await,
            Err(LibraryError::ForeignKeyViolation { parent_id: 12 })
        ));
        assert!(matches!(
            tags.delete_tag(12).await,
            Err(LibraryError::NotFound { .. })
        ));
        assert!(tags.forest().await.unwrap().is_empty());
    }
}
