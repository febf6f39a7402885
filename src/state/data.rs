//! Shared data structures for the library state
//!
//! These structs represent the data model that flows between
//! the database layer and the presentation layer.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Database identity of a catalog item
pub type ItemId = i64;

/// Database identity of a tag
pub type TagId = i64;

/// A tracked file or folder in the library
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogItem {
    /// Unique database ID (None until first persisted)
    pub id: Option<ItemId>,
    /// Absolute path; unique across files and folders
    pub path: String,
    /// Display name, independent of the path
    pub name: String,
    pub is_folder: bool,
    /// Byte count (0 for folders)
    pub size: u64,
    /// Last-modified timestamp captured at scan time
    pub modified_at: DateTime<Utc>,
    /// Playback length (zero for folders and non-media files)
    pub duration: Duration,
}

impl CatalogItem {
    /// A file entry as produced by a scan
    pub fn file(
        path: impl Into<String>,
        name: impl Into<String>,
        size: u64,
        modified_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        Self {
            id: None,
            path: path.into(),
            name: name.into(),
            is_folder: false,
            size,
            modified_at,
            duration,
        }
    }

    /// A folder entry; folders carry size 0 and zero duration
    pub fn folder(path: impl Into<String>, name: impl Into<String>, modified_at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            path: path.into(),
            name: name.into(),
            is_folder: true,
            size: 0,
            modified_at,
            duration: Duration::ZERO,
        }
    }
}

/// A node in the tag taxonomy
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    /// Opaque display color, interpreted by the presentation layer
    pub color: Option<String>,
    /// None marks a root tag
    pub parent_id: Option<TagId>,
    /// Derived view, only populated by forest assembly
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Tag>,
}

impl Tag {
    /// Number of tags in this subtree, including this one
    pub fn subtree_len(&self) -> usize {
        let mut pending = vec![self];
        let mut count = 0;
        while let Some(tag) = pending.pop() {
            count += 1;
            pending.extend(&tag.children);
        }
        count
    }
}

/// Row of the item/tag join table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ItemTag {
    pub item_id: ItemId,
    pub tag_id: TagId,
}
