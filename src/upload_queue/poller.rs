//! Background processing-status poller.
//!
//! One spawned task per polling run. The task fetches immediately, then once per
//! interval, folding each response into the queue until every tracked file is
//! settled, the retry budget runs out, or `stop()` cancels it.

use super::queue_manager::{apply_update, find_by_id};
use super::retry::{classify_error, PollRetryPolicy};
use super::status_rules::resolve_status;
use super::types::{CaseId, FileId, ItemStatus, POLL_INTERVAL_MS};
use super::UploadQueue;
use crate::api::{IntakeApi, StatusResponse};
use crate::events::{EventBus, IntakeEventPayload};
use crate::logging::{log_debug, log_info, log_warn};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use strum::Display;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub retry: PollRetryPolicy,
    /// Upper bound on a whole polling run; `None` polls until settled
    pub max_duration: Option<Duration>,
}

/// Polls every 2s until every tracked file settles, however long that takes
impl Default for PollSettings {
    fn default() -> Self {
        Self::unbounded(Duration::from_millis(POLL_INTERVAL_MS))
    }
}

impl PollSettings {
    /// Fixed interval, no retry cap, no time limit
    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            retry: PollRetryPolicy::unbounded(),
            max_duration: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PollerState {
    Idle,
    Running,
    Stopped,
}

struct PollerInner {
    state: PollerState,
    /// Bumped by every start and stop; a task only merges while its generation is current
    generation: u64,
    cancel: Option<CancellationToken>,
    tracked: Vec<FileId>,
    upload_complete: bool,
}

fn lock_inner(inner: &Mutex<PollerInner>) -> MutexGuard<'_, PollerInner> {
    inner
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct StatusPoller {
    api: Arc<dyn IntakeApi>,
    queue: UploadQueue,
    events: EventBus,
    settings: PollSettings,
    inner: Arc<Mutex<PollerInner>>,
}

impl StatusPoller {
    pub fn new(
        api: Arc<dyn IntakeApi>,
        queue: UploadQueue,
        events: EventBus,
        settings: PollSettings,
    ) -> Self {
        Self {
            api,
            queue,
            events,
            settings,
            inner: Arc::new(Mutex::new(PollerInner {
                state: PollerState::Idle,
                generation: 0,
                cancel: None,
                tracked: Vec::new(),
                upload_complete: false,
            })),
        }
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// Begin tracking `file_ids`. Returns `true` when a new polling task was spawned.
    ///
    /// Not a pure no-op while already running: no second task is created, but
    /// the ids join the running task's tracked set so a later batch is still
    /// followed to completion. Must be called inside a tokio runtime.
    pub fn start(&self, case_id: CaseId, file_ids: Vec<FileId>) -> bool {
        if file_ids.is_empty() {
            return false;
        }

        let (generation, cancel) = {
            let mut inner = lock_inner(&self.inner);
            if inner.state == PollerState::Running {
                for id in file_ids {
                    if !inner.tracked.contains(&id) {
                        inner.tracked.push(id);
                    }
                }
                return false;
            }

            let mut tracked = Vec::with_capacity(file_ids.len());
            for id in file_ids {
                if !tracked.contains(&id) {
                    tracked.push(id);
                }
            }

            let token = CancellationToken::new();
            inner.generation += 1;
            inner.state = PollerState::Running;
            inner.cancel = Some(token.clone());
            inner.tracked = tracked;
            inner.upload_complete = false;
            (inner.generation, token)
        };

        let task = PollTask {
            case_id,
            generation,
            cancel,
            api: self.api.clone(),
            queue: self.queue.clone(),
            events: self.events.clone(),
            settings: self.settings.clone(),
            inner: self.inner.clone(),
        };

        tokio::spawn(async move {
            log_info(
                "poller",
                &format!("🔄 Status polling started for case {}", task.case_id),
            )
            .unwrap_or_default();
            task.run().await;
            log_debug("poller", "Status polling task exited").unwrap_or_default();
        });

        true
    }

    /// Cancel the pending fetch or sleep and move to `stopped`. Idempotent.
    pub fn stop(&self) {
        let mut inner = lock_inner(&self.inner);
        let was_running = inner.state == PollerState::Running;

        if let Some(token) = inner.cancel.take() {
            token.cancel();
        }
        inner.generation += 1;
        inner.state = PollerState::Stopped;
        inner.tracked.clear();
        drop(inner);

        if was_running {
            log_info("poller", "⏹ Status polling stopped").unwrap_or_default();
        }
    }

    pub fn state(&self) -> PollerState {
        lock_inner(&self.inner).state
    }

    /// Set once every tracked file reached a terminal status
    pub fn upload_complete(&self) -> bool {
        lock_inner(&self.inner).upload_complete
    }

    pub fn clear_completion(&self) {
        lock_inner(&self.inner).upload_complete = false;
    }

    pub fn tracked_ids(&self) -> Vec<FileId> {
        lock_inner(&self.inner).tracked.clone()
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

enum TickOutcome {
    Continue { changed: usize },
    Settled { changed: usize, completed: usize, failed: usize, queued: usize },
    Superseded,
}

struct PollTask {
    case_id: CaseId,
    generation: u64,
    cancel: CancellationToken,
    api: Arc<dyn IntakeApi>,
    queue: UploadQueue,
    events: EventBus,
    settings: PollSettings,
    inner: Arc<Mutex<PollerInner>>,
}

impl PollTask {
    async fn run(self) {
        let deadline = self.settings.max_duration.map(|max| Instant::now() + max);
        let mut tick: u64 = 0;
        let mut consecutive_failures: u32 = 0;

        loop {
            tick += 1;

            let fetched = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.api.fetch_status(self.case_id) => result,
            };

            let delay = match fetched {
                Ok(response) => {
                    consecutive_failures = 0;
                    match self.merge(&response) {
                        TickOutcome::Superseded => break,
                        TickOutcome::Continue { changed } => {
                            self.publish(IntakeEventPayload::StatusMerged { tick, changed });
                            self.settings.interval
                        }
                        TickOutcome::Settled {
                            changed,
                            completed,
                            failed,
                            queued,
                        } => {
                            log_info(
                                "poller",
                                &format!(
                                    "✓ Processing settled for case {} after {} tick(s): {} completed, {} failed, {} queued",
                                    self.case_id, tick, completed, failed, queued
                                ),
                            )
                            .unwrap_or_default();
                            self.publish(IntakeEventPayload::StatusMerged { tick, changed });
                            self.publish(IntakeEventPayload::ProcessingComplete {
                                completed,
                                failed,
                                queued,
                            });
                            break;
                        }
                    }
                }
                Err(e) => {
                    consecutive_failures += 1;
                    let error_type = classify_error(&e);
                    log_warn(
                        "poller",
                        &format!(
                            "Status fetch for case {} failed ({:?}, {} in a row): {}",
                            self.case_id, error_type, consecutive_failures, e
                        ),
                    )
                    .unwrap_or_default();

                    if !self.settings.retry.should_retry(error_type, consecutive_failures) {
                        self.abandon(format!(
                            "Status fetch failed {} time(s) in a row: {}",
                            consecutive_failures, e
                        ));
                        break;
                    }
                    self.settings
                        .retry
                        .delay_after(consecutive_failures, self.settings.interval)
                }
            };

            if let Some(deadline) = deadline {
                if Instant::now() + delay > deadline {
                    self.abandon(format!(
                        "Processing did not settle within {}s",
                        self.settings.max_duration.unwrap_or_default().as_secs()
                    ));
                    break;
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }
    }

    fn is_current(&self, inner: &PollerInner) -> bool {
        inner.generation == self.generation && inner.state == PollerState::Running
    }

    /// Fold one response into the queue and run the termination test
    fn merge(&self, response: &StatusResponse) -> TickOutcome {
        let mut inner = lock_inner(&self.inner);
        if !self.is_current(&inner) {
            return TickOutcome::Superseded;
        }
        let tracked = inner.tracked.clone();

        let (changed, settled, counts) = self.queue.update_with(|items| {
            let mut changed = 0;
            for id in &tracked {
                // No record this tick: leave the item as it is
                let Some(record) = response.record_for(*id) else {
                    continue;
                };
                let status = resolve_status(record);
                let error =
                    (status == ItemStatus::Failed).then(|| record.status_str().to_string());

                changed += apply_update(
                    items,
                    |item| {
                        item.id == Some(*id)
                            && !item.status.is_final()
                            && (item.status != status || item.error != error)
                    },
                    |item| item.with_processing_status(status, error.clone()),
                );
            }

            let mut counts: (usize, usize, usize) = (0, 0, 0);
            let mut settled = true;
            for id in &tracked {
                match find_by_id(items, *id).map(|item| item.status) {
                    Some(ItemStatus::Completed) => counts.0 += 1,
                    Some(ItemStatus::Failed) => counts.1 += 1,
                    Some(ItemStatus::Queued) => counts.2 += 1,
                    // Removed from the queue: nothing left to wait for
                    None => {}
                    Some(_) => settled = false,
                }
            }
            (changed, settled, counts)
        });

        if !settled {
            return TickOutcome::Continue { changed };
        }

        inner.state = PollerState::Stopped;
        inner.upload_complete = true;
        inner.cancel = None;
        TickOutcome::Settled {
            changed,
            completed: counts.0,
            failed: counts.1,
            queued: counts.2,
        }
    }

    /// Give up without touching items or the completion flag
    fn abandon(&self, reason: String) {
        {
            let mut inner = lock_inner(&self.inner);
            if !self.is_current(&inner) {
                return;
            }
            inner.state = PollerState::Stopped;
            inner.cancel = None;
        }

        log_warn(
            "poller",
            &format!("⚠️ Status polling for case {} abandoned: {}", self.case_id, reason),
        )
        .unwrap_or_default();
        self.publish(IntakeEventPayload::PollingAbandoned { reason });
    }

    fn publish(&self, payload: IntakeEventPayload) {
        // Nobody listening is fine
        self.events.publish(self.case_id, payload).ok();
    }
}
