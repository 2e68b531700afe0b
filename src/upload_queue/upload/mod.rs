//! Batch upload orchestration.
//!
//! Marks pending items in flight, submits them in one request and reconciles the
//! response into the queue.

mod reconcile;

pub use reconcile::{reconcile, ReconcileReport, NO_RESPONSE_ERROR};

use crate::api::{BatchFile, IntakeApi, UploadBatch};
use crate::error::IntakeError;
use crate::events::{EventBus, IntakeEventPayload};
use crate::logging::{log_error, log_info, log_with_details};
use crate::upload_queue::hashing::sha256_hex;
use crate::upload_queue::types::{CaseId, FileId, FileType, ItemStatus, UploadItem};
use crate::upload_queue::validation::Rejection;
use crate::upload_queue::UploadQueue;
use serde::Serialize;
use std::sync::Arc;

/// What a caller needs after an upload call returns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadOutcome {
    /// Ids to track during background processing
    pub assigned_ids: Vec<FileId>,
    pub failed: usize,
    /// Per-file errors joined by ", "; `None` when every file was accepted
    pub error_banner: Option<String>,
}

/// Render `name: reason` pairs as a single banner line
pub fn banner_text(failures: &[Rejection]) -> Option<String> {
    if failures.is_empty() {
        return None;
    }
    Some(
        failures
            .iter()
            .map(|f| format!("{}: {}", f.file_name, f.reason))
            .collect::<Vec<_>>()
            .join(", "),
    )
}

pub struct UploadOrchestrator {
    api: Arc<dyn IntakeApi>,
    queue: UploadQueue,
    events: EventBus,
}

impl UploadOrchestrator {
    pub fn new(api: Arc<dyn IntakeApi>, queue: UploadQueue, events: EventBus) -> Self {
        Self { api, queue, events }
    }

    /// Upload every pending item of the queue as one batch.
    ///
    /// Transport failures mark the whole batch failed and are returned as `Err`;
    /// per-file rejections are reported through the outcome's banner.
    pub async fn upload(
        &self,
        case_id: CaseId,
        file_type: FileType,
    ) -> Result<UploadOutcome, IntakeError> {
        let in_flight = self.mark_in_flight();
        if in_flight.is_empty() {
            return Err(IntakeError::NothingToUpload);
        }

        log_info(
            "upload",
            &format!(
                "📤 Uploading {} file(s) to case {} as {}",
                in_flight.len(),
                case_id,
                file_type
            ),
        )
        .unwrap_or_default();

        let (batch, mut local_failures) = self.build_batch(&in_flight, file_type).await;
        let tokens: Vec<String> = batch.files.iter().map(|f| f.client_token.clone()).collect();

        if batch.files.is_empty() {
            // Nothing readable; no request is made and no completion is signalled
            return Ok(UploadOutcome {
                assigned_ids: Vec::new(),
                failed: local_failures.len(),
                error_banner: banner_text(&local_failures),
            });
        }

        let response = match self.api.upload_batch(case_id, batch).await {
            Ok(response) => response,
            Err(e) => {
                let message = e.to_string();
                let failed = self.queue.apply_update(
                    |item| tokens.contains(&item.client_token),
                    |item| item.as_upload_failed(message.clone()),
                );
                log_error(
                    "upload",
                    &format!("✗ Upload to case {} failed ({} files): {}", case_id, failed, message),
                )
                .unwrap_or_default();
                return Err(e);
            }
        };

        let report = self
            .queue
            .update_with(|items| reconcile(items, &tokens, &response));

        local_failures.extend(report.failures);
        let outcome = UploadOutcome {
            failed: local_failures.len(),
            error_banner: banner_text(&local_failures),
            assigned_ids: report.assigned,
        };

        log_with_details(
            "upload",
            if outcome.failed > 0 { "WARN" } else { "INFO" },
            &format!(
                "✓ Upload to case {} finished: {} accepted, {} failed",
                case_id,
                outcome.assigned_ids.len(),
                outcome.failed
            ),
            serde_json::json!({
                "case_id": case_id,
                "file_ids": outcome.assigned_ids,
                "errors": outcome.error_banner,
            }),
        )
        .unwrap_or_default();

        // Once per call, regardless of partial failure
        self.events
            .publish(
                case_id,
                IntakeEventPayload::UploadComplete {
                    uploaded: outcome.assigned_ids.len(),
                    failed: outcome.failed,
                },
            )
            .ok();

        Ok(outcome)
    }

    /// Move every pending item to `uploading`; returns the in-flight snapshot
    fn mark_in_flight(&self) -> Vec<UploadItem> {
        self.queue.update_with(|items| {
            let mut in_flight = Vec::new();
            for item in items.iter_mut() {
                if item.status == ItemStatus::Pending {
                    *item = item.as_uploading();
                    in_flight.push(item.clone());
                }
            }
            in_flight
        })
    }

    /// Read and fingerprint each file; unreadable files fail locally
    async fn build_batch(
        &self,
        in_flight: &[UploadItem],
        file_type: FileType,
    ) -> (UploadBatch, Vec<Rejection>) {
        let mut files = Vec::with_capacity(in_flight.len());
        let mut failures = Vec::new();

        for item in in_flight {
            match item.file.read_content().await {
                Ok(content) => {
                    let digest = sha256_hex(&content);
                    self.queue.apply_update(
                        |i| i.client_token == item.client_token,
                        |i| UploadItem {
                            sha256: Some(digest.clone()),
                            ..i.clone()
                        },
                    );
                    log_with_details(
                        "upload",
                        "DEBUG",
                        &format!("Prepared {} ({} bytes)", item.file_name(), content.len()),
                        serde_json::json!({ "sha256": digest }),
                    )
                    .unwrap_or_default();
                    files.push(BatchFile {
                        client_token: item.client_token.clone(),
                        filename: item.file_name().to_string(),
                        content,
                    });
                }
                Err(e) => {
                    let reason = format!("Failed to read file: {}", e);
                    self.queue.apply_update(
                        |i| i.client_token == item.client_token,
                        |i| i.as_upload_failed(reason.clone()),
                    );
                    failures.push(Rejection {
                        file_name: item.file_name().to_string(),
                        reason,
                    });
                }
            }
        }

        (UploadBatch { file_type, files }, failures)
    }
}
