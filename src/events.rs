//! Process-wide change notifications.
//!
//! Fire-and-forget fan-out over a broadcast channel. Listeners only see
//! events emitted after they subscribed, and a listener that falls behind
//! by more than the channel capacity loses the oldest events.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::store::model::{Settings, Subscription};

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Severity of a transient message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Success,
    Info,
    Error,
}

/// Events broadcast to every interested listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    /// The subscription collection changed. Carries the full collection.
    RecordsChanged { subscriptions: Vec<Subscription> },
    /// Settings changed. Carries the full settings.
    SettingsChanged { settings: Settings },
    /// A short message for the user.
    Toast { severity: Severity, message: String },
}

/// Broadcast hub shared by the store, the coordinator and the UI layer.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AppEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BROADCAST_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.tx.subscribe()
    }

    /// Emit an event. Ok if nobody is listening.
    pub fn emit(&self, event: AppEvent) {
        let _ = self.tx.send(event);
    }

    pub fn toast(&self, severity: Severity, message: impl Into<String>) {
        self.emit(AppEvent::Toast {
            severity,
            message: message.into(),
        });
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn late_subscriber_misses_earlier_events() {
        let bus = EventBus::new();
        bus.toast(Severity::Info, "before");

        let mut rx = bus.subscribe();
        bus.toast(Severity::Success, "after");

        match rx.recv().await.unwrap() {
            AppEvent::Toast { severity, message } => {
                assert_eq!(severity, Severity::Success);
                assert_eq!(message, "after");
            }
            other => panic!("Expected Toast, got {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn emit_without_listeners_is_fine() {
        let bus = EventBus::new();
        assert_eq!(bus.listener_count(), 0);
        bus.toast(Severity::Error, "nobody hears this");
    }

    #[test]
    fn toast_serializes_with_type_tag() {
        let event = AppEvent::Toast {
            severity: Severity::Error,
            message: "oops".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "toast");
        assert_eq!(json["severity"], "error");
    }
}
