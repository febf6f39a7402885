//! Background loading of per-item presentation details
//!
//! After the item list is published, each item gets its own task that looks
//! at the backing file or folder and reports back on a channel. Results
//! arrive in no particular order and never hold up the listing itself.

use serde::Serialize;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::debug;

use crate::state::data::{CatalogItem, ItemId};

/// Details for one catalog entry, as seen right now on disk
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemDetails {
    pub item_id: ItemId,
    pub path: String,
    /// Lowercase extension, None for folders
    pub extension: Option<String>,
    /// Current byte length for files
    pub size_on_disk: Option<u64>,
    /// Number of direct children for folders
    pub child_count: Option<usize>,
    /// False if the entry could not be opened
    pub readable: bool,
}

/// Spawn one detail task per persisted item. Returns the number spawned.
///
/// Must be called from within a Tokio runtime. Items without an id are
/// skipped. If the receiver is dropped the tasks finish quietly.
pub fn spawn_detail_loading(items: &[CatalogItem], sender: mpsc::Sender<ItemDetails>) -> usize {
    let mut spawned = 0;

    for item in items {
        let Some(item_id) = item.id else {
            continue;
        };

        let sender = sender.clone();
        let path = item.path.clone();
        let is_folder = item.is_folder;

        tokio::spawn(async move {
            let details = load_details(item_id, path, is_folder).await;
            if sender.send(details).await.is_err() {
                debug!(item_id, "Detail receiver gone, dropping result");
            }
        });
        spawned += 1;
    }

    spawned
}

async fn load_details(item_id: ItemId, path: String, is_folder: bool) -> ItemDetails {
    let mut details = ItemDetails {
        item_id,
        extension: None,
        size_on_disk: None,
        child_count: None,
        readable: false,
        path,
    };

    if is_folder {
        if let Ok(mut entries) = tokio::fs::read_dir(&details.path).await {
            let mut count = 0;
            while let Ok(Some(_)) = entries.next_entry().await {
                count += 1;
            }
            details.child_count = Some(count);
            details.readable = true;
        }
        return details;
    }

    details.extension = Path::new(&details.path)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase());

    if let Ok(file) = tokio::fs::File::open(&details.path).await {
        details.readable = true;
        details.size_on_disk = file.metadata().await.ok().map(|m| m.len());
    }

    details
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_details_arrive_for_every_item() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("movie.MP4");
        let folder = dir.path().join("extras");
        std::fs::write(&file, b"12345").unwrap();
        std::fs::create_dir(&folder).unwrap();
        std::fs::write(folder.join("one.mkv"), b"1").unwrap();

        let mut file_item = CatalogItem::file(
            file.to_string_lossy(),
            "movie",
            5,
            Utc::now(),
            Duration::ZERO,
        );
        file_item.id = Some(1);
        let mut folder_item = CatalogItem::folder(folder.to_string_lossy(), "extras", Utc::now());
        folder_item.id = Some(2);
        let mut gone = CatalogItem::file("/nowhere/gone.avi", "gone", 1, Utc::now(), Duration::ZERO);
        gone.id = Some(3);
        let unsaved = CatalogItem::file("/nowhere/new.avi", "new", 1, Utc::now(), Duration::ZERO);

        let (tx, mut rx) = mpsc::channel(8);
        let spawned = spawn_detail_loading(&[file_item, folder_item, gone, unsaved], tx);
        assert_eq!(spawned, 3);

        let mut received = Vec::new();
        while let Some(details) = rx.recv().await {
            received.push(details);
        }
        received.sort_by_key(|d| d.item_id);

        assert_eq!(received.len(), 3);
        assert_eq!(received[0].extension.as_deref(), Some("mp4"));
        assert_eq!(received[0].size_on_disk, Some(5));
        assert!(received[0].readable);
        assert_eq!(received[1].child_count, Some(1));
        assert!(received[1].readable);
        assert!(!received[2].readable);
    }
}
