//! Event publish collaborator.
//!
//! Game-side effects (granting a progression unlock) are requested by
//! publishing an event. Publishing is fire-and-forget; the returned flag only
//! says whether the sink accepted the event.

use std::collections::HashSet;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::state::unlock::UnlockId;
use crate::state::PlayerId;

/// Events the core asks the game to carry out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    UnlockProgression { player_id: PlayerId, unlock_id: UnlockId },
}

/// Sink for [`GameEvent`]s.
///
/// Shared with hooks that run outside the world tick, hence `Send + Sync`.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: GameEvent) -> bool;
}

/// Sink that records everything it accepts.
///
/// Individual unlock ids can be marked as rejected to simulate a game that
/// refuses to apply them.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<GameEvent>>,
    rejected: Mutex<HashSet<UnlockId>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every future unlock event for this id.
    pub fn reject_unlock(&self, unlock_id: UnlockId) {
        self.rejected.lock().insert(unlock_id);
    }

    /// Accept this id again.
    pub fn accept_unlock(&self, unlock_id: UnlockId) {
        self.rejected.lock().remove(&unlock_id);
    }

    /// Accepted events in publish order.
    pub fn events(&self) -> Vec<GameEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: GameEvent) -> bool {
        let GameEvent::UnlockProgression { unlock_id, .. } = &event;
        if self.rejected.lock().contains(unlock_id) {
            return false;
        }
        self.events.lock().push(event);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_accepts_and_rejects() {
        let sink = RecordingSink::new();
        sink.reject_unlock(7);

        assert!(sink.publish(GameEvent::UnlockProgression {
            player_id: 1,
            unlock_id: 5
        }));
        assert!(!sink.publish(GameEvent::UnlockProgression {
            player_id: 1,
            unlock_id: 7
        }));
        assert_eq!(sink.events().len(), 1);

        sink.accept_unlock(7);
        assert!(sink.publish(GameEvent::UnlockProgression {
            player_id: 1,
            unlock_id: 7
        }));
        assert_eq!(sink.events().len(), 2);
    }

    #[test]
    fn test_event_json_shape() {
        let event = GameEvent::UnlockProgression {
            player_id: 42,
            unlock_id: 9,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "unlock_progression", "player_id": 42, "unlock_id": 9})
        );
    }
}
