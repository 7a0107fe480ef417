//! Arena Session Library
//!
//! This crate provides zone-scoped arena session state for a multiplayer
//! game server.
//!
//! # Overview
//!
//! - **Zone Membership** - Circle and box zones, with enter/exit events
//!   computed each tick from player positions.
//!
//! - **Arena Lifecycle** - Each zone and each player moves through
//!   `None → Entering → Active → Exiting → None`, running entry and exit side
//!   effects on the way.
//!
//! - **Dual Characters** - Every player has a normal character and, once
//!   created, an alternate one used inside arenas.
//!
//! - **Gear Swaps** - Stack of reversible equipment sessions, restored in
//!   reverse order.
//!
//! - **Unlock Readiness** - Progression unlocks queued from a snapshot and
//!   applied only at phase boundaries.
//!
//! - **Component Snapshots** - Sparse diffs of object components with
//!   reference remapping, for capture and replay.
//!
//! # Design Principles
//!
//! 1. **State machines validate transitions** - Invalid phase changes are
//!    rejected with clear errors.
//!
//! 2. **Managers provide indexed access** - Look up by zone, by player, by
//!    session id.
//!
//! 3. **No game engine** - The world, inventory and event sink are traits;
//!    in-memory implementations are included.
//!
//! 4. **Serialization-ready** - Status and configuration convert to JSON.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use arena_session::{
//!     ArenaLifecycleManager, ArenaPhase, ArenaSettings, MemoryInventory, MemoryWorld,
//!     PersonaKind, RecordingSink, StaticCatalog, Vec3, World, ZoneDefinition,
//! };
//!
//! let mut manager = ArenaLifecycleManager::new(
//!     ArenaSettings::default(),
//!     MemoryWorld::new(),
//!     MemoryInventory::new(),
//!     StaticCatalog::new(["Sword"]),
//!     Arc::new(RecordingSink::new()),
//! );
//!
//! let center = Vec3::new(-1000.0, 5.0, -500.0);
//! manager.activate("arena", ZoneDefinition::circle("arena", center, 50.0).unwrap());
//!
//! let character = manager.world_mut().spawn_at(center);
//! manager.track_player(1, character);
//!
//! let report = manager.tick();
//! assert_eq!(report.entered, vec![(1, "arena".to_string())]);
//! assert_eq!(manager.arena_state("arena").unwrap().phase(), ArenaPhase::Active);
//! assert_eq!(manager.session(1).unwrap().persona, PersonaKind::Alternate);
//!
//! let alternate = manager.session(1).unwrap().active_object();
//! manager.world_mut().set_position(alternate, Vec3::ZERO);
//! manager.tick();
//! assert!(!manager.session(1).unwrap().in_session());
//! ```

pub mod config;
pub mod events;
pub mod inventory;
pub mod snapshot;
pub mod state;
pub mod world;

// Re-export everything commonly used at crate root
pub use config::{ArenaSettings, ConfigError, ZoneConfigFile, ZoneRecord};
pub use events::{EventSink, GameEvent, RecordingSink};
pub use inventory::{GearEntry, Inventory, ItemCatalog, MemoryInventory, StaticCatalog};
pub use snapshot::{ComponentSnapshot, EntityMapper, SnapshotEngine, SnapshotError};
pub use state::*;
pub use world::{MemoryWorld, ObjectRef, Vec3, World};
