mod bus;
mod types;

pub use bus::{EventBus, EventReceiver, EventSender};
pub use types::{EventSequence, IntakeEvent, IntakeEventPayload};
