//! Intake API contracts.
//!
//! The upload and status endpoints are reached through `IntakeApi` so the
//! orchestrator and poller can run against the HTTP client or a scripted fake.

mod http;
mod types;

pub use http::HttpIntakeClient;
pub use types::*;

use crate::error::IntakeError;
use crate::upload_queue::CaseId;
use async_trait::async_trait;

#[async_trait]
pub trait IntakeApi: Send + Sync {
    /// Submit every file of the batch in one request
    async fn upload_batch(
        &self,
        case_id: CaseId,
        batch: UploadBatch,
    ) -> Result<UploadResponse, IntakeError>;

    /// Current processing state of every file in the case
    async fn fetch_status(&self, case_id: CaseId) -> Result<StatusResponse, IntakeError>;
}
