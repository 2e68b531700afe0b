use crate::upload_queue::{FileId, FileType};
use serde::{Deserialize, Serialize};

/// One file part of a batch upload
#[derive(Debug, Clone)]
pub struct BatchFile {
    pub client_token: String,
    pub filename: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct UploadBatch {
    pub file_type: FileType,
    pub files: Vec<BatchFile>,
}

impl UploadBatch {
    pub fn total_bytes(&self) -> usize {
        self.files.iter().map(|f| f.content.len()).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub uploaded_files: Vec<UploadedFile>,
    #[serde(default)]
    pub errors: Vec<FileError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub id: FileId,
    pub filename: String,
    #[serde(default)]
    pub message: Option<String>,
    /// Echo of the correlation token, when the server supports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileError {
    pub filename: String,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub files: Vec<FileStatusRecord>,
}

impl StatusResponse {
    pub fn record_for(&self, id: FileId) -> Option<&FileStatusRecord> {
        self.files.iter().find(|record| record.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileStatusRecord {
    pub id: FileId,
    #[serde(default)]
    pub processed: bool,
    #[serde(default)]
    pub processing_status: Option<String>,
}

impl FileStatusRecord {
    pub fn status_str(&self) -> &str {
        self.processing_status.as_deref().unwrap_or("")
    }
}
