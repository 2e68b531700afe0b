use crate::upload_queue::CaseId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sequence number for ordering events
pub type EventSequence = u64;

/// Notifications emitted by the intake pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeEvent {
    pub sequence: EventSequence,
    pub timestamp: DateTime<Utc>,
    pub case_id: CaseId,
    pub payload: IntakeEventPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IntakeEventPayload {
    /// Files passed validation and were queued
    FilesAdded { count: usize },

    /// The batch upload call returned. Fires once per call, before any
    /// background processing finishes, so views can refresh their counts.
    UploadComplete { uploaded: usize, failed: usize },

    /// A status fetch was folded into the queue
    StatusMerged { tick: u64, changed: usize },

    /// Every tracked file reached a terminal status; polling stopped
    ProcessingComplete {
        completed: usize,
        failed: usize,
        queued: usize,
    },

    /// Polling gave up (retry budget or duration exhausted)
    PollingAbandoned { reason: String },

    /// Queue cleared by close, Escape or teardown
    Reset,
}

impl IntakeEvent {
    pub fn payload_type(&self) -> &str {
        match &self.payload {
            IntakeEventPayload::FilesAdded { .. } => "files_added",
            IntakeEventPayload::UploadComplete { .. } => "upload_complete",
            IntakeEventPayload::StatusMerged { .. } => "status_merged",
            IntakeEventPayload::ProcessingComplete { .. } => "processing_complete",
            IntakeEventPayload::PollingAbandoned { .. } => "polling_abandoned",
            IntakeEventPayload::Reset => "reset",
        }
    }

    /// Polling is over for this batch, one way or the other
    pub fn ends_polling(&self) -> bool {
        matches!(
            self.payload,
            IntakeEventPayload::ProcessingComplete { .. }
                | IntakeEventPayload::PollingAbandoned { .. }
        )
    }
}
