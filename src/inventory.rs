//! Inventory and item catalog collaborators.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::state::PlayerId;

/// An item name with a stack count. Used both for requested gear and for
/// the equipped list reported by the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GearEntry {
    pub item_name: String,
    pub count: u32,
}

impl GearEntry {
    pub fn new(item_name: impl Into<String>, count: u32) -> Self {
        Self {
            item_name: item_name.into(),
            count,
        }
    }

    /// Entries with a blank name or zero count are ignored by equip flows.
    pub fn is_valid(&self) -> bool {
        !self.item_name.trim().is_empty() && self.count > 0
    }
}

impl fmt::Display for GearEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x {}", self.count, self.item_name)
    }
}

/// Per-player equipped items.
pub trait Inventory {
    /// Attempt to equip an item; true on success.
    fn equip(&mut self, player_id: PlayerId, item_name: &str, count: u32) -> bool;

    fn list_equipped(&self, player_id: PlayerId) -> Vec<GearEntry>;

    fn clear_equipped(&mut self, player_id: PlayerId);
}

/// Resolves item names to something the game can spawn.
pub trait ItemCatalog {
    fn resolve(&self, item_name: &str) -> bool;
}

/// In-memory inventory.
///
/// Items can be marked as failing to simulate an equip call the game
/// refuses even though the name resolved.
#[derive(Debug, Default)]
pub struct MemoryInventory {
    equipped: HashMap<PlayerId, Vec<GearEntry>>,
    failing: HashSet<String>,
}

impl MemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&mut self, item_name: impl Into<String>) {
        self.failing.insert(item_name.into());
    }
}

impl Inventory for MemoryInventory {
    fn equip(&mut self, player_id: PlayerId, item_name: &str, count: u32) -> bool {
        if self.failing.contains(item_name) {
            return false;
        }
        self.equipped
            .entry(player_id)
            .or_default()
            .push(GearEntry::new(item_name, count));
        true
    }

    fn list_equipped(&self, player_id: PlayerId) -> Vec<GearEntry> {
        self.equipped.get(&player_id).cloned().unwrap_or_default()
    }

    fn clear_equipped(&mut self, player_id: PlayerId) {
        self.equipped.remove(&player_id);
    }
}

/// Catalog backed by a fixed set of known item names.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    known: HashSet<String>,
}

impl StaticCatalog {
    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: items.into_iter().map(Into::into).collect(),
        }
    }

    pub fn insert(&mut self, item_name: impl Into<String>) {
        self.known.insert(item_name.into());
    }
}

impl ItemCatalog for StaticCatalog {
    fn resolve(&self, item_name: &str) -> bool {
        self.known.contains(item_name)
    }
}
