use super::types::{EventSequence, IntakeEvent, IntakeEventPayload};
use crate::upload_queue::CaseId;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

pub type EventReceiver = broadcast::Receiver<IntakeEvent>;
pub type EventSender = broadcast::Sender<IntakeEvent>;

/// Event bus for distributing intake events
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: EventSender,
    sequence: Arc<AtomicU64>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Publish an event (returns sequence number).
    /// Errors only when nobody is subscribed.
    pub fn publish(
        &self,
        case_id: CaseId,
        payload: IntakeEventPayload,
    ) -> Result<EventSequence, String> {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);

        let event = IntakeEvent {
            sequence,
            timestamp: Utc::now(),
            case_id,
            payload,
        };

        self.sender
            .send(event)
            .map(|_| sequence)
            .map_err(|e| format!("Failed to publish event: {}", e))
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Get number of active receivers
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
