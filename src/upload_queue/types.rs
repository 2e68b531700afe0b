//! Type definitions for the upload queue system.
//!
//! Defines core data structures: UploadFile, UploadItem, ItemStatus, FileType, and constants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strum::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Uuid;

/// Server-assigned case identifier
pub type CaseId = u64;

/// Server-assigned file identifier
pub type FileId = u64;

// Fixed interval between status fetches
pub const POLL_INTERVAL_MS: u64 = 2000;

// Progress markers; the batch call has no finer-grained progress
pub const PROGRESS_PENDING: u8 = 0;
pub const PROGRESS_UPLOADING: u8 = 50;
pub const PROGRESS_UPLOADED: u8 = 100;

/// Declared evidence format for a batch, sent as the `file_type` form field
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
    EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum FileType {
    #[strum(serialize = "UFDR")]
    #[serde(rename = "UFDR")]
    Ufdr,
    #[strum(serialize = "JSON")]
    #[serde(rename = "JSON")]
    Json,
    #[strum(serialize = "XML")]
    #[serde(rename = "XML")]
    Xml,
    #[strum(serialize = "CSV")]
    #[serde(rename = "CSV")]
    Csv,
    #[strum(serialize = "PDF")]
    #[serde(rename = "PDF")]
    Pdf,
    #[strum(serialize = "Image")]
    #[serde(rename = "Image")]
    Image,
}

/// Per-file tracking status, upload transport first, then server-side processing
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Uploading,
    Uploaded,
    Queued,
    Validating,
    Processing,
    Completed,
    Failed,
}

impl ItemStatus {
    /// Position along `pending → uploading → uploaded → {queued|validating|processing} → {completed|failed}`
    pub fn rank(self) -> u8 {
        match self {
            ItemStatus::Pending => 0,
            ItemStatus::Uploading => 1,
            ItemStatus::Uploaded => 2,
            ItemStatus::Queued | ItemStatus::Validating | ItemStatus::Processing => 3,
            ItemStatus::Completed | ItemStatus::Failed => 4,
        }
    }

    /// No further update is ever applied to an item in this status
    pub fn is_final(self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Failed)
    }

    /// Polling may stop once every tracked file is in one of these.
    /// `queued` counts because without a worker the file never leaves it.
    pub fn is_poll_terminal(self) -> bool {
        matches!(
            self,
            ItemStatus::Completed | ItemStatus::Failed | ItemStatus::Queued
        )
    }

    pub fn is_removable(self) -> bool {
        self == ItemStatus::Pending
    }
}

/// Where the bytes of a selected file live
#[derive(Debug, Clone)]
pub enum FileSource {
    Path(PathBuf),
    Memory(Arc<Vec<u8>>),
}

/// Opaque handle to a selected file
#[derive(Debug, Clone, Serialize)]
pub struct UploadFile {
    pub name: String,
    pub size: u64,
    #[serde(skip)]
    pub source: FileSource,
}

impl UploadFile {
    pub fn from_bytes(name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            size: content.len() as u64,
            source: FileSource::Memory(Arc::new(content)),
        }
    }

    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Not a regular file: {}", path.display()),
            ));
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("Invalid file name: {}", path.display()),
                )
            })?
            .to_string();

        Ok(Self {
            name,
            size: metadata.len(),
            source: FileSource::Path(path.to_path_buf()),
        })
    }

    /// Read the full content for submission
    pub async fn read_content(&self) -> std::io::Result<Vec<u8>> {
        match &self.source {
            FileSource::Path(path) => tokio::fs::read(path).await,
            FileSource::Memory(bytes) => Ok(bytes.as_ref().clone()),
        }
    }

    /// Lowercased extension, empty when the name has none
    pub fn extension(&self) -> String {
        match self.name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
            _ => String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadItem {
    /// Client-generated correlation token echoed back by the server
    pub client_token: String,
    pub file: UploadFile,
    pub id: Option<FileId>,
    pub status: ItemStatus,
    pub progress: u8,
    pub error: Option<String>,
    pub message: Option<String>,
    pub queued_at: DateTime<Utc>,
    /// SHA256 of the submitted content, recorded at upload time
    pub sha256: Option<String>,
}

impl UploadItem {
    pub fn new(file: UploadFile) -> Self {
        Self {
            client_token: Uuid::new_v4().to_string(),
            file,
            id: None,
            status: ItemStatus::Pending,
            progress: PROGRESS_PENDING,
            error: None,
            message: None,
            queued_at: Utc::now(),
            sha256: None,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file.name
    }

    /// Copy marked as part of an in-flight batch
    pub fn as_uploading(&self) -> Self {
        Self {
            status: ItemStatus::Uploading,
            progress: PROGRESS_UPLOADING,
            error: None,
            ..self.clone()
        }
    }

    /// Copy with a server id assigned
    pub fn as_uploaded(&self, id: FileId, message: Option<String>) -> Self {
        Self {
            id: Some(id),
            status: ItemStatus::Uploaded,
            progress: PROGRESS_UPLOADED,
            message,
            error: None,
            ..self.clone()
        }
    }

    /// Copy rejected before or during upload; never received an id
    pub fn as_upload_failed(&self, error: impl Into<String>) -> Self {
        Self {
            id: None,
            status: ItemStatus::Failed,
            progress: PROGRESS_PENDING,
            error: Some(error.into()),
            ..self.clone()
        }
    }

    /// Copy carrying a server-reported processing status
    pub fn with_processing_status(&self, status: ItemStatus, error: Option<String>) -> Self {
        Self {
            status,
            progress: PROGRESS_UPLOADED,
            error: if status == ItemStatus::Failed {
                error
            } else {
                None
            },
            ..self.clone()
        }
    }
}

/// Aggregate counts for display and logging
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub in_flight: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub queued: usize,
}
