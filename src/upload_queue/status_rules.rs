//! Server processing status -> local item status.
//!
//! Rules are evaluated top to bottom; the first matching predicate wins.

use super::types::ItemStatus;
use crate::api::FileStatusRecord;

pub struct StatusRule {
    pub name: &'static str,
    pub matches: fn(&FileStatusRecord) -> bool,
    pub status: ItemStatus,
}

/// Unknown or missing values mean the file is still being worked on
pub const DEFAULT_STATUS: ItemStatus = ItemStatus::Processing;

pub const STATUS_RULES: &[StatusRule] = &[
    StatusRule {
        name: "processed and completed",
        matches: |r| r.processed && r.status_str() == "completed",
        status: ItemStatus::Completed,
    },
    StatusRule {
        name: "failed prefix",
        matches: |r| r.status_str().starts_with("failed"),
        status: ItemStatus::Failed,
    },
    StatusRule {
        name: "queued",
        matches: |r| r.status_str() == "queued",
        status: ItemStatus::Queued,
    },
    StatusRule {
        name: "validating",
        matches: |r| r.status_str() == "validating",
        status: ItemStatus::Validating,
    },
    StatusRule {
        name: "processing",
        matches: |r| r.status_str() == "processing",
        status: ItemStatus::Processing,
    },
    StatusRule {
        name: "uploaded",
        matches: |r| r.status_str() == "uploaded",
        status: ItemStatus::Uploaded,
    },
];

pub fn resolve_status(record: &FileStatusRecord) -> ItemStatus {
    STATUS_RULES
        .iter()
        .find(|rule| (rule.matches)(record))
        .map(|rule| rule.status)
        .unwrap_or(DEFAULT_STATUS)
}
