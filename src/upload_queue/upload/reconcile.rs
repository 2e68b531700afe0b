//! Fold a batch upload response back into the in-flight items.
//!
//! Entries are correlated by the echoed client token when present, otherwise by
//! file name (raw or server-sanitized). Each item can be claimed once, in queue
//! order, so files sharing a name resolve to distinct items.

use crate::api::UploadResponse;
use crate::logging::log_warn;
use crate::upload_queue::queue_manager::apply_update;
use crate::upload_queue::types::{FileId, ItemStatus, UploadItem};
use crate::upload_queue::validation::{sanitize_filename, Rejection};

pub const NO_RESPONSE_ERROR: &str = "No response from server for this file";

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Server ids, in response order
    pub assigned: Vec<FileId>,
    /// Per-file failures, server-reported first
    pub failures: Vec<Rejection>,
}

/// In-flight item that has not been claimed by a response entry yet
struct OpenSlot {
    token: String,
    name: String,
    sanitized: String,
}

struct Correlator {
    open: Vec<OpenSlot>,
}

impl Correlator {
    fn new(items: &[UploadItem], in_flight: &[String]) -> Self {
        let open = items
            .iter()
            .filter(|item| {
                item.status == ItemStatus::Uploading && in_flight.contains(&item.client_token)
            })
            .map(|item| OpenSlot {
                token: item.client_token.clone(),
                name: item.file.name.clone(),
                sanitized: sanitize_filename(&item.file.name),
            })
            .collect();
        Self { open }
    }

    fn claim(&mut self, client_token: Option<&str>, filename: &str) -> Option<String> {
        let by_token = client_token
            .and_then(|token| self.open.iter().position(|slot| slot.token == token));
        let position = by_token.or_else(|| {
            self.open
                .iter()
                .position(|slot| slot.name == filename || slot.sanitized == filename)
        })?;
        Some(self.open.remove(position).token)
    }

    fn into_unclaimed(self) -> Vec<OpenSlot> {
        self.open
    }
}

pub fn reconcile(
    items: &mut [UploadItem],
    in_flight: &[String],
    response: &UploadResponse,
) -> ReconcileReport {
    let mut correlator = Correlator::new(items, in_flight);
    let mut report = ReconcileReport::default();

    for uploaded in &response.uploaded_files {
        match correlator.claim(uploaded.client_token.as_deref(), &uploaded.filename) {
            Some(token) => {
                apply_update(
                    items,
                    |item| item.client_token == token,
                    |item| item.as_uploaded(uploaded.id, uploaded.message.clone()),
                );
                report.assigned.push(uploaded.id);
            }
            None => {
                log_warn(
                    "upload",
                    &format!(
                        "Server accepted {} (id {}) but no queued file matches it",
                        uploaded.filename, uploaded.id
                    ),
                )
                .unwrap_or_default();
            }
        }
    }

    for rejected in &response.errors {
        if let Some(token) = correlator.claim(rejected.client_token.as_deref(), &rejected.filename)
        {
            apply_update(
                items,
                |item| item.client_token == token,
                |item| item.as_upload_failed(rejected.error.clone()),
            );
        }
        report.failures.push(Rejection {
            file_name: rejected.filename.clone(),
            reason: rejected.error.clone(),
        });
    }

    for slot in correlator.into_unclaimed() {
        apply_update(
            items,
            |item| item.client_token == slot.token,
            |item| item.as_upload_failed(NO_RESPONSE_ERROR),
        );
        report.failures.push(Rejection {
            file_name: slot.name,
            reason: NO_RESPONSE_ERROR.to_string(),
        });
    }

    report
}
