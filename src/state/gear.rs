//! Gear swap sessions.
//!
//! Each player has a stack of named swap sessions. Starting a session saves
//! the currently equipped items and equips the requested gear; ending it puts
//! the saved list back. Sessions are expected to end in reverse start order,
//! but ending one out of order is allowed and only logged.
//!
//! Every equip is all-or-nothing: if any item fails, the player's inventory
//! is restored to what it was before the call.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::PlayerId;
use crate::inventory::{GearEntry, Inventory, ItemCatalog};

/// One swap session on a player's stack.
#[derive(Debug, Clone)]
pub struct GearSwapSession {
    pub session_id: String,
    pub owner: PlayerId,
    pub applied_gear: Vec<GearEntry>,
    /// Equipped items at session start
    pub pre_swap_snapshot: Vec<GearEntry>,
    pub started_at: DateTime<Utc>,
}

impl GearSwapSession {
    pub fn to_json(&self) -> serde_json::Value {
        let gear: Vec<String> = self.applied_gear.iter().map(|g| g.to_string()).collect();
        serde_json::json!({
            "session_id": self.session_id,
            "gear": gear,
            "started_at": self.started_at.to_rfc3339()
        })
    }
}

/// Gear swap errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GearError {
    DuplicateSession(String),
    EmptyGearList,
    UnresolvedItems(Vec<String>),
    EquipFailed { item_name: String },
    SessionNotFound(String),
    SessionsActive,
}

impl fmt::Display for GearError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateSession(id) => write!(f, "Swap session '{}' is already active", id),
            Self::EmptyGearList => write!(f, "No valid gear entries"),
            Self::UnresolvedItems(items) => write!(f, "Unknown items: {}", items.join(", ")),
            Self::EquipFailed { item_name } => write!(f, "Failed to equip {}", item_name),
            Self::SessionNotFound(id) => write!(f, "No swap session '{}'", id),
            Self::SessionsActive => write!(f, "End active swap sessions first"),
        }
    }
}

impl std::error::Error for GearError {}

/// Per-player swap session stacks and baseline snapshots.
#[derive(Debug, Default)]
pub struct GearSwapSessionManager {
    /// player_id → sessions in start order
    stacks: HashMap<PlayerId, Vec<GearSwapSession>>,

    /// player_id → equipped items before the first out-of-session equip
    baselines: HashMap<PlayerId, Vec<GearEntry>>,
}

impl GearSwapSessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a swap session.
    ///
    /// Fails without touching the inventory if the id is already active for
    /// the player or any item does not resolve.
    pub fn start(
        &mut self,
        inventory: &mut dyn Inventory,
        catalog: &dyn ItemCatalog,
        player_id: PlayerId,
        session_id: &str,
        gear: &[GearEntry],
    ) -> Result<(), GearError> {
        if self.has_session(player_id, session_id) {
            return Err(GearError::DuplicateSession(session_id.to_string()));
        }
        let gear = resolve_all(catalog, gear)?;

        let snapshot = inventory.list_equipped(player_id);
        equip_all(inventory, player_id, &gear, &snapshot)?;

        info!(player = player_id, session = session_id, items = gear.len(), "swap session started");
        self.stacks.entry(player_id).or_default().push(GearSwapSession {
            session_id: session_id.to_string(),
            owner: player_id,
            applied_gear: gear,
            pre_swap_snapshot: snapshot,
            started_at: Utc::now(),
        });
        Ok(())
    }

    /// End a swap session and restore what was equipped before it started.
    ///
    /// Returns false if the player has no session with this id.
    pub fn end(&mut self, inventory: &mut dyn Inventory, player_id: PlayerId, session_id: &str) -> bool {
        let Some(stack) = self.stacks.get_mut(&player_id) else {
            debug!(player = player_id, session = session_id, "no swap sessions");
            return false;
        };
        let Some(position) = stack.iter().position(|s| s.session_id == session_id) else {
            debug!(player = player_id, session = session_id, "swap session not found");
            return false;
        };

        if position + 1 != stack.len() {
            warn!(
                player = player_id,
                session = session_id,
                above = stack.len() - position - 1,
                "ending swap session out of order"
            );
        }

        let session = stack.remove(position);
        if stack.is_empty() {
            self.stacks.remove(&player_id);
        }

        restore(inventory, player_id, &session.pre_swap_snapshot);
        info!(player = player_id, session = session_id, "swap session ended");
        true
    }

    /// End every session in reverse start order, then restore the baseline.
    ///
    /// Returns the number of sessions ended.
    pub fn revert_all(&mut self, inventory: &mut dyn Inventory, player_id: PlayerId) -> usize {
        let sessions = self.stacks.remove(&player_id).unwrap_or_default();
        let count = sessions.len();

        for session in sessions.iter().rev() {
            restore(inventory, player_id, &session.pre_swap_snapshot);
            debug!(player = player_id, session = %session.session_id, "swap session reverted");
        }

        if let Some(baseline) = self.baselines.remove(&player_id) {
            restore(inventory, player_id, &baseline);
            debug!(player = player_id, "baseline restored");
        }

        if count > 0 {
            info!(player = player_id, sessions = count, "reverted all swap sessions");
        }
        count
    }

    /// Equip gear outside any session.
    ///
    /// The equipped list is saved as the player's baseline the first time;
    /// [`revert_all`](Self::revert_all) restores it.
    pub fn equip_baseline(
        &mut self,
        inventory: &mut dyn Inventory,
        catalog: &dyn ItemCatalog,
        player_id: PlayerId,
        gear: &[GearEntry],
    ) -> Result<(), GearError> {
        if !self.active_sessions(player_id).is_empty() {
            return Err(GearError::SessionsActive);
        }
        let gear = resolve_all(catalog, gear)?;

        let snapshot = inventory.list_equipped(player_id);
        equip_all(inventory, player_id, &gear, &snapshot)?;

        self.baselines.entry(player_id).or_insert(snapshot);
        debug!(player = player_id, items = gear.len(), "baseline gear equipped");
        Ok(())
    }

    /// Session ids in start order.
    pub fn active_sessions(&self, player_id: PlayerId) -> Vec<String> {
        self.stacks
            .get(&player_id)
            .map(|stack| stack.iter().map(|s| s.session_id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn has_session(&self, player_id: PlayerId, session_id: &str) -> bool {
        self.session(player_id, session_id).is_some()
    }

    pub fn session(&self, player_id: PlayerId, session_id: &str) -> Option<&GearSwapSession> {
        self.stacks
            .get(&player_id)?
            .iter()
            .find(|s| s.session_id == session_id)
    }

    pub fn has_baseline(&self, player_id: PlayerId) -> bool {
        self.baselines.contains_key(&player_id)
    }

    /// Forget a player's sessions and baseline without touching inventory.
    pub fn remove_player(&mut self, player_id: PlayerId) {
        self.stacks.remove(&player_id);
        self.baselines.remove(&player_id);
    }
}

/// Valid entries of `gear`, or an error naming every item that did not resolve.
fn resolve_all(catalog: &dyn ItemCatalog, gear: &[GearEntry]) -> Result<Vec<GearEntry>, GearError> {
    let gear: Vec<GearEntry> = gear.iter().filter(|g| g.is_valid()).cloned().collect();
    if gear.is_empty() {
        return Err(GearError::EmptyGearList);
    }

    let unresolved: Vec<String> = gear
        .iter()
        .filter(|g| !catalog.resolve(&g.item_name))
        .map(|g| g.item_name.clone())
        .collect();
    if !unresolved.is_empty() {
        warn!(items = ?unresolved, "gear not resolved");
        return Err(GearError::UnresolvedItems(unresolved));
    }
    Ok(gear)
}

/// Equip every entry or, on the first failure, put `snapshot` back.
fn equip_all(
    inventory: &mut dyn Inventory,
    player_id: PlayerId,
    gear: &[GearEntry],
    snapshot: &[GearEntry],
) -> Result<(), GearError> {
    for entry in gear {
        if !inventory.equip(player_id, &entry.item_name, entry.count) {
            warn!(player = player_id, item = %entry.item_name, "equip failed, rolling back");
            restore(inventory, player_id, snapshot);
            return Err(GearError::EquipFailed {
                item_name: entry.item_name.clone(),
            });
        }
    }
    Ok(())
}

fn restore(inventory: &mut dyn Inventory, player_id: PlayerId, snapshot: &[GearEntry]) {
    inventory.clear_equipped(player_id);
    for entry in snapshot {
        if !inventory.equip(player_id, &entry.item_name, entry.count) {
            warn!(player = player_id, item = %entry, "could not re-equip saved item");
        }
    }
}
