//! Arena session state.
//!
//! This module provides the state types and managers:
//!
//! - `zone` - Zone shapes and per-tick membership (who is inside what)
//! - `session` - Per-player session phase and persona bookkeeping
//! - `persona` - Normal / alternate character creation and switching
//! - `gear` - Stack of reversible gear swap sessions
//! - `unlock` - Progression unlocks deferred to phase boundaries
//! - `lifecycle` - The orchestrator tying all of the above to a tick
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                       ArenaLifecycleManager                          │
//! │                                                                      │
//! │  ┌──────────────────────┐  ┌─────────────────┐  ┌─────────────────┐  │
//! │  │ ZoneMembershipTracker│  │  SessionStore   │  │ GearSwapSession │  │
//! │  │                      │  │                 │  │     Manager     │  │
//! │  │ zone_id →            │  │ player_id →     │  │ player_id →     │  │
//! │  │   definition,members │  │   session state │  │   session stack │  │
//! │  │ player_id →          │  │                 │  │   baseline      │  │
//! │  │   zone_ids           │  │                 │  │                 │  │
//! │  └──────────────────────┘  └─────────────────┘  └─────────────────┘  │
//! │                                                                      │
//! │  ┌──────────────────────┐  ┌──────────────────────────────────────┐  │
//! │  │ DualCharacterManager │  │ Arc<UnlockReadinessTracker> (shared) │  │
//! │  └──────────────────────┘  └──────────────────────────────────────┘  │
//! │                                                                      │
//! │   zone:   None ──▶ Entering ──▶ Active ──▶ Exiting ──▶ None          │
//! │   player: None ──▶ Entering ──▶ Active ──▶ Exiting ──▶ None          │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use arena_session::state::{zone::ZoneMembershipTracker, zone::ZoneDefinition};
//!
//! let mut zones = ZoneMembershipTracker::new();
//! zones.add_zone(ZoneDefinition::circle("arena", center, 50.0)?)?;
//!
//! for event in zones.tick(positions) {
//!     println!("{}", event);
//! }
//! ```

pub mod gear;
pub mod lifecycle;
pub mod persona;
pub mod session;
pub mod unlock;
pub mod zone;

/// Platform player identifier.
pub type PlayerId = u64;

/// Zone identifier, unique among active zones.
pub type ZoneId = String;

// Re-export commonly used types
pub use gear::{GearError, GearSwapSession, GearSwapSessionManager};
pub use lifecycle::{
    repair_decision, ArenaLifecycleManager, ArenaLifecycleState, ArenaPhase, PlayerFailure,
    RepairDecision, TickReport,
};
pub use persona::{DualCharacterManager, PersonaError};
pub use session::{
    InvalidTransition, PersonaKind, PhaseEvent, PlayerSessionState, SessionPhase, SessionStore,
};
pub use unlock::{DrainContext, DrainReport, PendingUnlockSet, UnlockId, UnlockReadinessTracker};
pub use zone::{
    MembershipEvent, ZoneDefinition, ZoneError, ZoneMembershipState, ZoneMembershipTracker,
    ZoneShape,
};
