use tokio::sync::mpsc;
use vigil_common::types::Event;

/// Fire-and-forget hand-off of events to the downstream consumer.
///
/// The channel is unbounded: buffering is the consumer's concern and the
/// engine never waits on it.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventPublisher {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn publish(&self, events: Vec<Event>) {
        for event in events {
            if self.tx.send(event).is_err() {
                tracing::debug!("Event consumer gone, dropping events");
                return;
            }
        }
    }
}
