//! Progression unlock queue.
//!
//! Unlocks captured from a session snapshot are queued per player and only
//! applied at session phase boundaries. The tracker is shared with hooks that
//! run outside the world tick, so every operation takes the internal lock for
//! its full duration.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::PlayerId;
use crate::events::{EventSink, GameEvent};

/// Game-side progression unlock identifier.
pub type UnlockId = i32;

/// Phase boundary a drain runs at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrainContext {
    Entry,
    Exit,
    /// Externally triggered repair callback during a transition
    Repair,
}

impl DrainContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Exit => "exit",
            Self::Repair => "repair",
        }
    }
}

impl fmt::Display for DrainContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pending and completed unlocks of one player.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingUnlockSet {
    /// Unique, in snapshot order
    pub pending: Vec<UnlockId>,
    pub completed: BTreeSet<UnlockId>,
}

/// Outcome of one drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub applied: Vec<UnlockId>,
    pub failed: Vec<UnlockId>,
}

impl DrainReport {
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty() && self.failed.is_empty()
    }
}

/// Mutex-guarded unlock queue keyed by player.
pub struct UnlockReadinessTracker {
    sets: Mutex<HashMap<PlayerId, PendingUnlockSet>>,
    sink: Arc<dyn EventSink>,
}

impl fmt::Debug for UnlockReadinessTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnlockReadinessTracker")
            .field("players", &self.sets.lock().len())
            .finish()
    }
}

impl UnlockReadinessTracker {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sets: Mutex::new(HashMap::new()),
            sink,
        }
    }

    /// Replace a player's pending unlocks with the ids from a snapshot.
    ///
    /// Duplicates are dropped keeping first occurrence, as are ids already
    /// completed. Completed ids are kept.
    pub fn ready<I>(&self, player_id: PlayerId, snapshot: I)
    where
        I: IntoIterator<Item = UnlockId>,
    {
        let mut sets = self.sets.lock();
        let set = sets.entry(player_id).or_default();

        let mut seen = BTreeSet::new();
        let pending: Vec<UnlockId> = snapshot
            .into_iter()
            .filter(|id| !set.completed.contains(id) && seen.insert(*id))
            .collect();
        if !set.pending.is_empty() {
            debug!(player = player_id, discarded = set.pending.len(), "replacing pending unlocks");
        }
        debug!(player = player_id, count = pending.len(), "unlocks ready");
        set.pending = pending;
    }

    /// Publish every pending unlock.
    ///
    /// Applied ids move to `completed`; failed ids stay pending for the next
    /// drain.
    pub fn drain(&self, player_id: PlayerId, context: DrainContext) -> DrainReport {
        let mut sets = self.sets.lock();
        let Some(set) = sets.get_mut(&player_id) else {
            return DrainReport::default();
        };

        let mut report = DrainReport::default();
        let mut still_pending = Vec::new();

        for unlock_id in set.pending.drain(..) {
            let event = GameEvent::UnlockProgression {
                player_id,
                unlock_id,
            };
            if self.sink.publish(event) {
                set.completed.insert(unlock_id);
                report.applied.push(unlock_id);
            } else {
                warn!(player = player_id, unlock = unlock_id, %context, "unlock not applied, keeping for retry");
                still_pending.push(unlock_id);
                report.failed.push(unlock_id);
            }
        }
        set.pending = still_pending;

        if !report.is_empty() {
            info!(
                player = player_id,
                %context,
                applied = report.applied.len(),
                failed = report.failed.len(),
                "drained unlocks"
            );
        }
        report
    }

    pub fn has_pending(&self, player_id: PlayerId) -> bool {
        self.pending_count(player_id) > 0
    }

    pub fn pending_count(&self, player_id: PlayerId) -> usize {
        self.sets
            .lock()
            .get(&player_id)
            .map(|s| s.pending.len())
            .unwrap_or(0)
    }

    pub fn completed_count(&self, player_id: PlayerId) -> usize {
        self.sets
            .lock()
            .get(&player_id)
            .map(|s| s.completed.len())
            .unwrap_or(0)
    }

    /// Copy of a player's current set.
    pub fn snapshot(&self, player_id: PlayerId) -> Option<PendingUnlockSet> {
        self.sets.lock().get(&player_id).cloned()
    }

    /// Drop a player's pending and completed unlocks.
    pub fn remove(&self, player_id: PlayerId) -> Option<PendingUnlockSet> {
        self.sets.lock().remove(&player_id)
    }
}
