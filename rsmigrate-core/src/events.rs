//! Run lifecycle notifications.

use crate::migration::Direction;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// What happened during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// Persisted state fetch begun.
    Load,
    /// About to execute this migration's step.
    Migration { title: String, direction: Direction },
    /// The whole slice drained without error.
    Complete { position: usize },
    /// Persistence write about to occur.
    Save { position: usize },
    /// Fatal condition; terminal for the run.
    Error { code: String, message: String },
}

/// Event sent through the broadcast channel.
#[derive(Debug, Clone, Serialize)]
pub struct RunEvent {
    pub run_id: Uuid,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl RunEvent {
    /// Returns true for the error signal.
    pub fn is_error(&self) -> bool {
        matches!(self.kind, EventKind::Error { .. })
    }
}

/// Fans run events out to any number of subscribers.
pub struct EventBroadcaster {
    sender: broadcast::Sender<RunEvent>,
}

impl EventBroadcaster {
    /// Creates a broadcaster with the specified channel capacity.
    pub fn new(channel_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity);
        Self { sender }
    }

    /// Subscribes to all subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }

    /// Sends an event to every current subscriber.
    pub fn notify(&self, run_id: Uuid, kind: EventKind) {
        match &kind {
            EventKind::Load => tracing::debug!(%run_id, "loading migration state"),
            EventKind::Migration { title, direction } => {
                tracing::info!(%run_id, "{} : {}", direction, title)
            }
            EventKind::Complete { position } => {
                tracing::info!(%run_id, position, "migration run complete")
            }
            EventKind::Save { position } => {
                tracing::debug!(%run_id, position, "saving migration state")
            }
            EventKind::Error { code, message } => {
                tracing::error!(%run_id, code = %code, "migration run failed: {}", message)
            }
        }

        // No receivers is fine
        let _ = self.sender.send(RunEvent { run_id, kind });
    }

    /// Returns the number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Creates a shared EventBroadcaster.
pub fn create_broadcaster(channel_capacity: usize) -> Arc<EventBroadcaster> {
    Arc::new(EventBroadcaster::new(channel_capacity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notify_subscriber() {
        let broadcaster = EventBroadcaster::new(16);
        let mut rx = broadcaster.subscribe();
        let run_id = Uuid::new_v4();

        broadcaster.notify(run_id, EventKind::Load);
        broadcaster.notify(
            run_id,
            EventKind::Migration {
                title: "001".to_string(),
                direction: Direction::Up,
            },
        );

        let first = rx.recv().await.unwrap();
        assert_eq!(first.run_id, run_id);
        assert_eq!(first.kind, EventKind::Load);

        let second = rx.recv().await.unwrap();
        assert_eq!(
            second.kind,
            EventKind::Migration {
                title: "001".to_string(),
                direction: Direction::Up,
            }
        );
    }

    #[test]
    fn test_notify_without_subscribers() {
        let broadcaster = EventBroadcaster::new(4);
        assert_eq!(broadcaster.subscriber_count(), 0);
        broadcaster.notify(Uuid::new_v4(), EventKind::Complete { position: 1 });
    }

    #[test]
    fn test_subscriber_count() {
        let broadcaster = create_broadcaster(4);
        let rx1 = broadcaster.subscribe();
        let _rx2 = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 2);

        drop(rx1);
        assert_eq!(broadcaster.subscriber_count(), 1);
    }

    #[test]
    fn test_event_serialization() {
        let event = RunEvent {
            run_id: Uuid::nil(),
            kind: EventKind::Save { position: 3 },
        };
        assert!(!event.is_error());

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "save");
        assert_eq!(json["position"], 3);
    }
}
