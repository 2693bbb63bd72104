//! Publish/subscribe for informational client events.
//!
//! Subscribers see every event published after they subscribe, as long as
//! they keep up; a subscriber that falls more than the channel capacity
//! behind observes `RecvError::Lagged` and skips ahead.

use enginelink_types::Envelope;
use tokio::sync::broadcast;

/// Channel capacity for the event broadcast.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Progress notifications from an engine provisioner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningEvent {
    DownloadStarted,
    DownloadEnded,
    ExtractStarted,
    ExtractEnded,
}

/// An event emitted by the client runtime.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Every inbound envelope, regardless of type.
    MessageReceived(Envelope),
    /// An outbound envelope accepted by the transport.
    MessageSent(Envelope),
    Provisioning(ProvisioningEvent),
}

/// Publish-only handle handed to collaborators.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<ClientEvent>,
}

impl EventSink {
    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: ClientEvent) {
        let _ = self.tx.send(event);
    }

    pub fn provisioning(&self, event: ProvisioningEvent) {
        self.publish(ClientEvent::Provisioning(event));
    }
}

/// Owner of the event channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sink: EventSink,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            sink: EventSink { tx },
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.sink.tx.subscribe()
    }

    #[must_use]
    pub fn sink(&self) -> &EventSink {
        &self.sink
    }

    pub fn publish(&self, event: ClientEvent) {
        self.sink.publish(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
