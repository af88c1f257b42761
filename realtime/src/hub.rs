use common::{Envelope, EventPublisher, PushEvent};
use tokio::sync::broadcast;
use tracing::{debug, error};

/// Fan-out point for push events; every connected client holds a receiver
pub struct NotifierHub {
    sender: broadcast::Sender<Envelope>,
}

impl NotifierHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Returns how many subscribers the envelope reached
    pub fn publish_envelope(&self, envelope: Envelope) -> usize {
        debug!("Publishing {}: {}", envelope.event_type, envelope.data);
        match self.sender.send(envelope) {
            Ok(reached) => reached,
            Err(_) => {
                debug!("No subscribers connected, event dropped");
                0
            }
        }
    }
}

impl EventPublisher for NotifierHub {
    fn publish(&self, event: PushEvent) {
        match event.to_envelope() {
            Ok(envelope) => {
                self.publish_envelope(envelope);
            }
            Err(e) => error!("Failed to encode {} event: {}", event.event_type(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{SignalChanged, SIGNAL_UPDATE};

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let hub = NotifierHub::new(8);
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();

        hub.publish(PushEvent::SignalUpdate(SignalChanged::default()));

        assert_eq!(first.recv().await.unwrap().event_type, SIGNAL_UPDATE);
        assert_eq!(second.recv().await.unwrap().event_type, SIGNAL_UPDATE);
    }

    #[test]
    fn test_publish_without_subscribers_is_dropped() {
        let hub = NotifierHub::new(8);
        assert_eq!(hub.publish_envelope(Envelope::new(SIGNAL_UPDATE, serde_json::json!({}))), 0);
    }
}
