//! Scripted `IntakeApi` for unit tests.

use crate::api::{IntakeApi, StatusResponse, UploadBatch, UploadResponse};
use crate::error::IntakeError;
use crate::upload_queue::CaseId;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum StatusStep {
    Respond(StatusResponse),
    /// Respond only after the given (tokio) delay
    Delayed(Duration, StatusResponse),
    /// Non-success HTTP status
    Fail(u16),
    /// Connection-level failure
    Disconnect,
}

#[derive(Debug, Clone)]
enum UploadStep {
    Respond(UploadResponse),
    Fail(String),
}

pub struct ScriptedApi {
    upload: Mutex<UploadStep>,
    upload_delay: Mutex<Option<Duration>>,
    statuses: Mutex<VecDeque<StatusStep>>,
    last_status: Mutex<Option<StatusStep>>,
    batches: Mutex<Vec<UploadBatch>>,
    fetches: AtomicUsize,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self {
            upload: Mutex::new(UploadStep::Respond(UploadResponse::default())),
            upload_delay: Mutex::new(None),
            statuses: Mutex::new(VecDeque::new()),
            last_status: Mutex::new(None),
            batches: Mutex::new(Vec::new()),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_upload_response(self, response: UploadResponse) -> Self {
        *self.upload.lock().unwrap() = UploadStep::Respond(response);
        self
    }

    pub fn with_upload_error(self, message: &str) -> Self {
        *self.upload.lock().unwrap() = UploadStep::Fail(message.to_string());
        self
    }

    pub fn with_upload_delay(self, delay: Duration) -> Self {
        *self.upload_delay.lock().unwrap() = Some(delay);
        self
    }

    /// Steps are consumed in order; the last one repeats once the script runs out
    pub fn with_status_steps(self, steps: Vec<StatusStep>) -> Self {
        self.statuses.lock().unwrap().extend(steps);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn uploaded_batches(&self) -> Vec<UploadBatch> {
        self.batches.lock().unwrap().clone()
    }

    fn next_status(&self) -> Option<StatusStep> {
        let mut statuses = self.statuses.lock().unwrap();
        let mut last = self.last_status.lock().unwrap();
        if let Some(step) = statuses.pop_front() {
            *last = Some(step.clone());
            return Some(step);
        }
        last.clone()
    }
}

#[async_trait]
impl IntakeApi for ScriptedApi {
    async fn upload_batch(
        &self,
        _case_id: CaseId,
        batch: UploadBatch,
    ) -> Result<UploadResponse, IntakeError> {
        self.batches.lock().unwrap().push(batch);

        let delay = *self.upload_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let step = self.upload.lock().unwrap().clone();
        match step {
            UploadStep::Respond(response) => Ok(response),
            UploadStep::Fail(message) => Err(IntakeError::Other(message)),
        }
    }

    async fn fetch_status(&self, _case_id: CaseId) -> Result<StatusResponse, IntakeError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        match self.next_status() {
            Some(StatusStep::Respond(response)) => Ok(response),
            Some(StatusStep::Delayed(delay, response)) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            Some(StatusStep::Fail(status)) => Err(IntakeError::Http {
                status,
                body: "scripted failure".to_string(),
            }),
            Some(StatusStep::Disconnect) => {
                Err(IntakeError::Other("connection reset by peer".to_string()))
            }
            None => Ok(StatusResponse::default()),
        }
    }
}
