//! Queue operations - add, remove, transform, and query upload items.
//!
//! Pure functions over the ordered item list; `UploadQueue` wraps them behind a lock.

use super::types::{FileId, ItemStatus, QueueCounts, UploadFile, UploadItem};

/// Append one pending item per file. Duplicate names are kept as distinct items.
pub fn add_files(items: &mut Vec<UploadItem>, files: Vec<UploadFile>) -> Vec<String> {
    let mut tokens = Vec::with_capacity(files.len());
    for file in files {
        let item = UploadItem::new(file);
        tokens.push(item.client_token.clone());
        items.push(item);
    }
    tokens
}

/// Remove the item at `index` only while it is still pending
pub fn remove_pending(items: &mut Vec<UploadItem>, index: usize) -> Option<UploadItem> {
    match items.get(index) {
        Some(item) if item.status.is_removable() => Some(items.remove(index)),
        _ => None,
    }
}

/// Replace every matching item with a transformed copy, in place.
/// Order is preserved and non-matching items are never touched.
pub fn apply_update<M, T>(items: &mut [UploadItem], matcher: M, transform: T) -> usize
where
    M: Fn(&UploadItem) -> bool,
    T: Fn(&UploadItem) -> UploadItem,
{
    let mut updated = 0;
    for slot in items.iter_mut() {
        if matcher(slot) {
            *slot = transform(slot);
            updated += 1;
        }
    }
    updated
}

pub fn find_by_id(items: &[UploadItem], id: FileId) -> Option<&UploadItem> {
    items.iter().find(|item| item.id == Some(id))
}

pub fn count_by_status(items: &[UploadItem]) -> QueueCounts {
    let mut counts = QueueCounts::default();
    for item in items {
        match item.status {
            ItemStatus::Pending => counts.pending += 1,
            ItemStatus::Uploading => counts.in_flight += 1,
            ItemStatus::Uploaded | ItemStatus::Validating | ItemStatus::Processing => {
                counts.processing += 1
            }
            ItemStatus::Queued => counts.queued += 1,
            ItemStatus::Completed => counts.completed += 1,
            ItemStatus::Failed => counts.failed += 1,
        }
    }
    counts
}
