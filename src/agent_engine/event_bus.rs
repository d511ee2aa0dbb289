use serde::Serialize;
use tokio::sync::broadcast;

const BUS_CAPACITY: usize = 100;

/// Side-channel updates for the human observer. Independent of any turn.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObserverEvent {
    SessionStarted {
        session_id: String,
        expires_at: chrono::DateTime<chrono::Utc>,
    },
    SessionExtended {
        session_id: String,
        expires_at: chrono::DateTime<chrono::Utc>,
    },
    SessionTerminated {
        session_id: String,
    },
    CountdownTick {
        remaining_secs: i64,
    },
    CountdownElapsed,
    FrameCaptured {
        session_id: String,
        image_base64: String,
    },
}

/// Fan-out of [`ObserverEvent`]s. Publishing never blocks; slow subscribers
/// lose the oldest events.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ObserverEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ObserverEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: ObserverEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
