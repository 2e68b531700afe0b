//! Local checks mirroring the server's file validator.
//!
//! Catches files the server would reject before they are queued, and reproduces
//! its filename sanitization so echoed names can be matched back.

use super::types::UploadFile;

/// Same ceiling the server enforces (500MB)
pub const MAX_UPLOAD_FILE_SIZE: u64 = 500 * 1024 * 1024;

pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "ufdr", "json", "xml", "csv", "tsv", "xlsx", "xls", "txt", "pdf", "png", "jpg", "jpeg",
];

const MAX_FILENAME_LEN: usize = 255;

const DANGEROUS_SEQUENCES: &[&str] = &["..", "/", "\\", ":", "*", "?", "\"", "<", ">", "|", "\0"];

/// A selected file that was not queued
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub file_name: String,
    pub reason: String,
}

pub fn validate_upload_file(file: &UploadFile) -> Result<(), Rejection> {
    let reject = |reason: String| Rejection {
        file_name: file.name.clone(),
        reason,
    };

    if file.size == 0 {
        return Err(reject("File is empty".to_string()));
    }

    if file.size > MAX_UPLOAD_FILE_SIZE {
        return Err(reject(format!(
            "File size exceeds maximum allowed size of {}MB",
            MAX_UPLOAD_FILE_SIZE / (1024 * 1024)
        )));
    }

    let extension = file.extension();
    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(reject(format!(
            "Unsupported file extension: .{}. Supported: {}",
            extension,
            SUPPORTED_EXTENSIONS.join(", ")
        )));
    }

    Ok(())
}

/// Split a selection into files that may be queued and the rejected rest
pub fn partition_valid(files: Vec<UploadFile>) -> (Vec<UploadFile>, Vec<Rejection>) {
    let mut valid = Vec::with_capacity(files.len());
    let mut rejected = Vec::new();
    for file in files {
        match validate_upload_file(&file) {
            Ok(()) => valid.push(file),
            Err(rejection) => rejected.push(rejection),
        }
    }
    (valid, rejected)
}

/// The name the server stores (and echoes) for an uploaded file
pub fn sanitize_filename(name: &str) -> String {
    // Last path component only, either separator style
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);

    let mut sanitized = base.to_string();
    for seq in DANGEROUS_SEQUENCES {
        sanitized = sanitized.replace(seq, "_");
    }

    if sanitized.chars().count() > MAX_FILENAME_LEN {
        let (stem, ext) = match sanitized.rfind('.') {
            Some(pos) if pos > 0 => sanitized.split_at(pos),
            _ => (sanitized.as_str(), ""),
        };
        let stem: String = stem.chars().take(250).collect();
        sanitized = format!("{}{}", stem, ext);
    }

    sanitized
}
