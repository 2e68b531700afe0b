//! Binds the queue, the orchestrator and the poller to the intake dialog's
//! lifecycle: open, select, submit, close, Escape and teardown.

use super::poller::{PollSettings, PollerState, StatusPoller};
use super::types::{CaseId, FileType, QueueCounts, UploadFile, UploadItem};
use super::upload::{banner_text, UploadOrchestrator, UploadOutcome};
use super::validation::{partition_valid, Rejection};
use super::UploadQueue;
use crate::api::IntakeApi;
use crate::error::IntakeError;
use crate::events::{EventBus, EventReceiver, IntakeEventPayload};
use crate::logging::{log_debug, log_info};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

/// Everything a view needs to render the dialog
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeSnapshot {
    pub case_id: CaseId,
    pub open: bool,
    pub items: Vec<UploadItem>,
    pub counts: QueueCounts,
    pub uploading: bool,
    pub upload_complete: bool,
    pub error_banner: Option<String>,
    pub poller_state: PollerState,
}

#[derive(Default)]
struct IntakeFlags {
    open: bool,
    uploading: bool,
    error_banner: Option<String>,
    /// Bumped on every reset so a submit that straddles a close drops its outcome
    session: u64,
}

pub struct LifecycleController {
    case_id: CaseId,
    queue: UploadQueue,
    events: EventBus,
    orchestrator: UploadOrchestrator,
    poller: StatusPoller,
    flags: Mutex<IntakeFlags>,
}

impl LifecycleController {
    pub fn new(case_id: CaseId, api: Arc<dyn IntakeApi>, settings: PollSettings) -> Self {
        let queue = UploadQueue::new();
        let events = EventBus::default();
        let orchestrator = UploadOrchestrator::new(api.clone(), queue.clone(), events.clone());
        let poller = StatusPoller::new(api, queue.clone(), events.clone(), settings);

        Self {
            case_id,
            queue,
            events,
            orchestrator,
            poller,
            flags: Mutex::new(IntakeFlags::default()),
        }
    }

    fn flags(&self) -> MutexGuard<'_, IntakeFlags> {
        self.flags
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn case_id(&self) -> CaseId {
        self.case_id
    }

    pub fn queue(&self) -> &UploadQueue {
        &self.queue
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    pub fn open(&self) {
        let mut flags = self.flags();
        flags.open = true;
        flags.error_banner = None;
        drop(flags);

        log_debug("lifecycle", &format!("Intake opened for case {}", self.case_id))
            .unwrap_or_default();
    }

    pub fn is_uploading(&self) -> bool {
        self.flags().uploading
    }

    pub fn error_banner(&self) -> Option<String> {
        self.flags().error_banner.clone()
    }

    pub fn upload_complete(&self) -> bool {
        self.poller.upload_complete()
    }

    pub fn poller_state(&self) -> PollerState {
        self.poller.state()
    }

    /// Validate and queue selected or dropped files. Rejected files are
    /// returned and shown in the error banner.
    pub fn select_files(&self, files: Vec<UploadFile>) -> Vec<Rejection> {
        self.queue_files(files, Vec::new())
    }

    /// Like `select_files`, for paths on disk
    pub async fn add_paths(&self, paths: &[PathBuf]) -> Vec<Rejection> {
        let mut files = Vec::with_capacity(paths.len());
        let mut rejected = Vec::new();

        for path in paths {
            match UploadFile::from_path(path).await {
                Ok(file) => files.push(file),
                Err(e) => rejected.push(Rejection {
                    file_name: path.display().to_string(),
                    reason: e.to_string(),
                }),
            }
        }

        self.queue_files(files, rejected)
    }

    fn queue_files(&self, files: Vec<UploadFile>, mut rejected: Vec<Rejection>) -> Vec<Rejection> {
        let (valid, invalid) = partition_valid(files);
        rejected.extend(invalid);

        if !valid.is_empty() {
            let count = self.queue.add(valid).len();
            log_info(
                "lifecycle",
                &format!("Queued {} file(s) for case {}", count, self.case_id),
            )
            .unwrap_or_default();
            self.events
                .publish(self.case_id, IntakeEventPayload::FilesAdded { count })
                .ok();
        }

        if let Some(banner) = banner_text(&rejected) {
            self.flags().error_banner = Some(banner);
        }
        rejected
    }

    /// Drop a pending item. Items already submitted stay.
    pub fn remove(&self, index: usize) -> bool {
        self.queue.remove(index)
    }

    /// Upload every pending file and, when any id came back, start polling
    pub async fn submit(&self, file_type: FileType) -> Result<UploadOutcome, IntakeError> {
        let session = {
            let mut flags = self.flags();
            if flags.uploading {
                return Err(IntakeError::UploadInProgress);
            }
            if !self.queue.has_pending() {
                return Err(IntakeError::NothingToUpload);
            }
            flags.uploading = true;
            flags.error_banner = None;
            flags.session
        };

        let result = self.orchestrator.upload(self.case_id, file_type).await;

        // Held until the poller is started so a reset cannot slip in between
        let mut flags = self.flags();
        if flags.session != session {
            // Closed while the request was in flight; the queue is already empty
            log_debug("lifecycle", "Discarding upload outcome after reset").unwrap_or_default();
            return result;
        }
        flags.uploading = false;
        flags.error_banner = match &result {
            Ok(outcome) => outcome.error_banner.clone(),
            Err(e) => Some(e.to_string()),
        };

        if let Ok(outcome) = &result {
            if !outcome.assigned_ids.is_empty() {
                self.poller
                    .start(self.case_id, outcome.assigned_ids.clone());
            }
        }
        drop(flags);

        result
    }

    /// Explicit close action
    pub fn close(&self) {
        self.reset("close");
    }

    /// Escape key. Ignored while an upload is in flight; returns whether it closed.
    pub fn on_escape(&self) -> bool {
        if self.is_uploading() {
            log_debug("lifecycle", "Escape ignored during upload").unwrap_or_default();
            return false;
        }
        self.reset("escape");
        true
    }

    /// Component unmount
    pub fn teardown(&self) {
        self.reset("teardown");
    }

    /// Lock order is flags, then poller and queue. The poll task never takes
    /// the flags lock.
    fn reset(&self, reason: &str) {
        {
            let mut flags = self.flags();
            flags.session += 1;
            self.poller.stop();
            self.queue.reset();
            self.poller.clear_completion();
            flags.open = false;
            flags.uploading = false;
            flags.error_banner = None;
        }

        log_info(
            "lifecycle",
            &format!("Intake for case {} reset ({})", self.case_id, reason),
        )
        .unwrap_or_default();
        self.events
            .publish(self.case_id, IntakeEventPayload::Reset)
            .ok();
    }

    pub fn snapshot(&self) -> IntakeSnapshot {
        let flags = self.flags();
        IntakeSnapshot {
            case_id: self.case_id,
            open: flags.open,
            items: self.queue.items(),
            counts: self.queue.counts(),
            uploading: flags.uploading,
            upload_complete: self.poller.upload_complete(),
            error_banner: flags.error_banner.clone(),
            poller_state: self.poller.state(),
        }
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        self.poller.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{FileError, FileStatusRecord, StatusResponse, UploadResponse, UploadedFile};
    use crate::test_support::{ScriptedApi, StatusStep};
    use crate::upload_queue::types::ItemStatus;
    use std::time::Duration;
    use tokio::time::sleep;

    fn accepted(entries: &[(u64, &str)]) -> UploadResponse {
        UploadResponse {
            uploaded_files: entries
                .iter()
                .map(|(id, name)| UploadedFile {
                    id: *id,
                    filename: name.to_string(),
                    message: Some("File uploaded successfully".to_string()),
                    client_token: None,
                })
                .collect(),
            errors: vec![],
        }
    }

    fn processing(ids: &[u64]) -> StatusStep {
        StatusStep::Respond(StatusResponse {
            files: ids
                .iter()
                .map(|id| FileStatusRecord {
                    id: *id,
                    processed: false,
                    processing_status: Some("processing".to_string()),
                })
                .collect(),
        })
    }

    fn controller(api: ScriptedApi) -> (Arc<ScriptedApi>, LifecycleController) {
        let api = Arc::new(api);
        let controller = LifecycleController::new(9, api.clone(), PollSettings::default());
        (api, controller)
    }

    fn ufdr(name: &str) -> UploadFile {
        UploadFile::from_bytes(name, b"extraction".to_vec())
    }

    #[test]
    fn test_select_files_rejects_invalid() {
        let (_api, controller) = controller(ScriptedApi::new());
        let mut rx = controller.subscribe();

        let rejected = controller.select_files(vec![
            ufdr("phone.ufdr"),
            UploadFile::from_bytes("notes.docx", b"x".to_vec()),
            UploadFile::from_bytes("empty.csv", vec![]),
        ]);

        assert_eq!(rejected.len(), 2);
        assert_eq!(controller.queue().len(), 1);
        let banner = controller.error_banner().unwrap();
        assert!(banner.contains("notes.docx"));
        assert!(banner.contains("empty.csv"));
        assert_eq!(
            rx.try_recv().unwrap().payload,
            IntakeEventPayload::FilesAdded { count: 1 }
        );
    }

    #[test]
    fn test_remove_only_pending() {
        let (_api, controller) = controller(ScriptedApi::new());
        controller.select_files(vec![ufdr("a.ufdr"), ufdr("b.ufdr")]);

        assert!(controller.remove(0));
        assert!(!controller.remove(5));
        assert_eq!(controller.queue().items()[0].file_name(), "b.ufdr");
    }

    #[tokio::test]
    async fn test_add_paths_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("export.json");
        std::fs::write(&present, b"{}").unwrap();
        let missing = dir.path().join("missing.json");

        let (_api, controller) = controller(ScriptedApi::new());
        let rejected = controller.add_paths(&[present, missing]).await;

        assert_eq!(rejected.len(), 1);
        assert!(rejected[0].file_name.ends_with("missing.json"));
        assert_eq!(controller.queue().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_starts_polling_with_assigned_ids() {
        let api = ScriptedApi::new()
            .with_upload_response(accepted(&[(1, "a.ufdr"), (2, "b.ufdr")]))
            .with_status_steps(vec![processing(&[1, 2])]);
        let (_api, controller) = controller(api);
        controller.open();
        controller.select_files(vec![ufdr("a.ufdr"), ufdr("b.ufdr")]);

        let outcome = controller.submit(FileType::Ufdr).await.unwrap();

        assert_eq!(outcome.assigned_ids, vec![1, 2]);
        assert_eq!(controller.poller_state(), PollerState::Running);
        assert!(!controller.is_uploading());
        controller.close();
    }

    #[tokio::test]
    async fn test_submit_with_nothing_pending() {
        let (api, controller) = controller(ScriptedApi::new());
        assert!(matches!(
            controller.submit(FileType::Csv).await,
            Err(IntakeError::NothingToUpload)
        ));
        assert!(api.uploaded_batches().is_empty());
        assert!(!controller.is_uploading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_escape_ignored_while_uploading() {
        let api = ScriptedApi::new()
            .with_upload_response(accepted(&[(1, "a.ufdr")]))
            .with_upload_delay(Duration::from_secs(5))
            .with_status_steps(vec![processing(&[1])]);
        let (_api, controller) = controller(api);
        controller.select_files(vec![ufdr("a.ufdr")]);

        let (outcome, escaped) = tokio::join!(controller.submit(FileType::Ufdr), async {
            sleep(Duration::from_secs(1)).await;
            controller.on_escape()
        });

        assert!(!escaped);
        assert_eq!(outcome.unwrap().assigned_ids, vec![1]);
        assert_eq!(controller.queue().len(), 1);

        // Once the upload returned, Escape closes
        assert!(controller.on_escape());
        assert!(controller.queue().is_empty());
        assert_eq!(controller.poller_state(), PollerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_submit_while_uploading_is_rejected() {
        let api = ScriptedApi::new()
            .with_upload_response(accepted(&[(1, "a.ufdr")]))
            .with_upload_delay(Duration::from_secs(5));
        let (api, controller) = controller(api);
        controller.select_files(vec![ufdr("a.ufdr")]);

        let (first, second) = tokio::join!(controller.submit(FileType::Ufdr), async {
            sleep(Duration::from_secs(1)).await;
            controller.submit(FileType::Ufdr).await
        });

        assert!(first.is_ok());
        assert!(matches!(second, Err(IntakeError::UploadInProgress)));
        assert_eq!(api.uploaded_batches().len(), 1);
        controller.teardown();
    }

    #[tokio::test]
    async fn test_transport_failure_sets_banner() {
        let api = ScriptedApi::new().with_upload_error("connection refused");
        let (api, controller) = controller(api);
        controller.select_files(vec![ufdr("a.ufdr"), ufdr("b.ufdr")]);

        assert!(controller.submit(FileType::Ufdr).await.is_err());

        let snapshot = controller.snapshot();
        assert!(snapshot.error_banner.unwrap().contains("connection refused"));
        assert!(snapshot
            .items
            .iter()
            .all(|i| i.status == ItemStatus::Failed && i.id.is_none()));
        assert_eq!(snapshot.poller_state, PollerState::Idle);
        assert_eq!(api.fetch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_rejection_banner_and_polling() {
        let api = ScriptedApi::new()
            .with_upload_response(UploadResponse {
                uploaded_files: accepted(&[(4, "good.xml")]).uploaded_files,
                errors: vec![FileError {
                    filename: "bad.xml".to_string(),
                    error: "Malformed XML".to_string(),
                    client_token: None,
                }],
            })
            .with_status_steps(vec![processing(&[4])]);
        let (_api, controller) = controller(api);
        controller.select_files(vec![
            UploadFile::from_bytes("good.xml", b"<a/>".to_vec()),
            UploadFile::from_bytes("bad.xml", b"<a".to_vec()),
        ]);

        controller.submit(FileType::Xml).await.unwrap();

        assert_eq!(
            controller.error_banner().as_deref(),
            Some("bad.xml: Malformed XML")
        );
        assert_eq!(controller.poller_state(), PollerState::Running);
        controller.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_resets_everything_and_is_repeatable() {
        let api = ScriptedApi::new()
            .with_upload_response(accepted(&[(1, "a.ufdr")]))
            .with_status_steps(vec![processing(&[1])]);
        let (api, controller) = controller(api);
        controller.open();
        controller.select_files(vec![ufdr("a.ufdr")]);
        controller.submit(FileType::Ufdr).await.unwrap();
        let mut rx = controller.subscribe();

        controller.close();
        controller.close();

        let snapshot = controller.snapshot();
        assert!(snapshot.items.is_empty());
        assert!(snapshot.error_banner.is_none());
        assert!(!snapshot.upload_complete);
        assert_eq!(snapshot.poller_state, PollerState::Stopped);
        assert!(!snapshot.open);

        let fetched = api.fetch_count();
        sleep(Duration::from_secs(20)).await;
        assert_eq!(api.fetch_count(), fetched);

        let mut resets = 0;
        while let Ok(event) = rx.try_recv() {
            if event.payload == IntakeEventPayload::Reset {
                resets += 1;
            }
        }
        assert_eq!(resets, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_during_upload_discards_outcome() {
        let api = ScriptedApi::new()
            .with_upload_response(accepted(&[(1, "a.ufdr")]))
            .with_upload_delay(Duration::from_secs(5));
        let (api, controller) = controller(api);
        controller.select_files(vec![ufdr("a.ufdr")]);

        let (outcome, _) = tokio::join!(controller.submit(FileType::Ufdr), async {
            sleep(Duration::from_secs(1)).await;
            controller.close();
        });

        // Nothing left to reconcile against, so no id is tracked
        assert!(outcome.unwrap().assigned_ids.is_empty());
        assert!(controller.queue().is_empty());
        assert!(controller.error_banner().is_none());
        assert_ne!(controller.poller_state(), PollerState::Running);
        sleep(Duration::from_secs(20)).await;
        assert_eq!(api.fetch_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_close_racing_submit_never_leaves_poller_running() {
        for round in 0..200 {
            let api = ScriptedApi::new()
                .with_upload_response(accepted(&[(1, "a.ufdr")]))
                .with_status_steps(vec![processing(&[1])]);
            let (_api, controller) = controller(api);
            let controller = Arc::new(controller);
            controller.select_files(vec![ufdr("a.ufdr")]);

            let submitter = {
                let controller = controller.clone();
                tokio::spawn(async move { controller.submit(FileType::Ufdr).await })
            };
            let closer = {
                let controller = controller.clone();
                tokio::spawn(async move {
                    for _ in 0..(round % 4) {
                        tokio::task::yield_now().await;
                    }
                    controller.close();
                })
            };

            // Either order is fine; a poller outliving the close is not
            let _ = submitter.await.unwrap();
            closer.await.unwrap();

            let snapshot = controller.snapshot();
            assert_ne!(snapshot.poller_state, PollerState::Running, "round {}", round);
            assert!(snapshot.items.is_empty());
            assert!(!snapshot.uploading);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_polling() {
        let api = ScriptedApi::new()
            .with_upload_response(accepted(&[(1, "a.ufdr")]))
            .with_status_steps(vec![processing(&[1])]);
        let (api, controller) = controller(api);
        let mut rx = controller.subscribe();
        controller.select_files(vec![ufdr("a.ufdr")]);
        controller.submit(FileType::Ufdr).await.unwrap();

        // Wait for the immediate fetch
        loop {
            let event = rx.recv().await.unwrap();
            if event.payload_type() == "status_merged" {
                break;
            }
        }

        drop(controller);
        sleep(Duration::from_secs(20)).await;
        assert_eq!(api.fetch_count(), 1);
    }
}
