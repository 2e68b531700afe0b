// Module declarations
mod hashing;
mod lifecycle;
mod poller;
mod queue_manager;
mod retry;
mod status_rules;
mod types;
mod upload;
mod validation;

// Re-export types and constants from submodules
pub use hashing::sha256_hex;
pub use lifecycle::{IntakeSnapshot, LifecycleController};
pub use poller::{PollSettings, PollerState, StatusPoller};
pub use retry::{classify_error, ErrorType, PollRetryPolicy};
pub use status_rules::{resolve_status, StatusRule, DEFAULT_STATUS, STATUS_RULES};
pub use types::*;
pub use upload::{banner_text, UploadOrchestrator, UploadOutcome, NO_RESPONSE_ERROR};
pub use validation::{
    partition_valid, sanitize_filename, validate_upload_file, Rejection, MAX_UPLOAD_FILE_SIZE,
    SUPPORTED_EXTENSIONS,
};

use std::sync::{Arc, Mutex, MutexGuard};

/// Ordered, in-memory list of per-file tracking records.
///
/// Cloning yields another handle to the same list.
#[derive(Clone, Default)]
pub struct UploadQueue {
    items: Arc<Mutex<Vec<UploadItem>>>,
}

impl std::fmt::Debug for UploadQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadQueue")
            .field("items", &self.len())
            .finish()
    }
}

impl UploadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock leaves the list intact; keep using it
    fn lock(&self) -> MutexGuard<'_, Vec<UploadItem>> {
        self.items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a pending item per file; returns their correlation tokens
    pub fn add(&self, files: Vec<UploadFile>) -> Vec<String> {
        queue_manager::add_files(&mut self.lock(), files)
    }

    /// Remove the item at `index`. No-op unless it is still pending.
    pub fn remove(&self, index: usize) -> bool {
        queue_manager::remove_pending(&mut self.lock(), index).is_some()
    }

    /// Replace matching items with a transformed copy; returns how many matched
    pub fn apply_update<M, T>(&self, matcher: M, transform: T) -> usize
    where
        M: Fn(&UploadItem) -> bool,
        T: Fn(&UploadItem) -> UploadItem,
    {
        queue_manager::apply_update(&mut self.lock(), matcher, transform)
    }

    /// Run several updates under one lock acquisition
    pub fn update_with<R>(&self, f: impl FnOnce(&mut Vec<UploadItem>) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn reset(&self) {
        self.lock().clear();
    }

    /// Snapshot of every item, in order
    pub fn items(&self) -> Vec<UploadItem> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn has_pending(&self) -> bool {
        self.lock()
            .iter()
            .any(|item| item.status == ItemStatus::Pending)
    }

    pub fn status_of(&self, id: FileId) -> Option<ItemStatus> {
        queue_manager::find_by_id(&self.lock(), id).map(|item| item.status)
    }

    pub fn counts(&self) -> QueueCounts {
        queue_manager::count_by_status(&self.lock())
    }
}
