//! Per-player session state machine.
//!
//! Tracks which zone session a player is in, which persona they are playing,
//! and the bookkeeping needed to swap personas back and forth.
//!
//! # State Diagram
//!
//! ```text
//! ┌──────────┐  begin_entry   ┌──────────┐  complete_entry  ┌──────────┐
//! │   None   │───────────────▶│ Entering │─────────────────▶│  Active  │◀─┐
//! └──────────┘                └──────────┘                  └────┬─────┘  │
//!      ▲                                                         │  rehome│
//!      │ complete_exit        ┌──────────┐      begin_exit       │────────┘
//!      └──────────────────────│ Exiting  │◀──────────────────────┘
//!                             └──────────┘
//!
//!   reset: any ──▶ None (disconnect)
//! ```

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{PlayerId, ZoneId};
use crate::snapshot::ComponentSnapshot;
use crate::world::{ObjectRef, Vec3};

/// Which of the player's two characters is in play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaKind {
    #[default]
    Normal,
    Alternate,
}

impl PersonaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Alternate => "alternate",
        }
    }

    pub fn other(&self) -> Self {
        match self {
            Self::Normal => Self::Alternate,
            Self::Alternate => Self::Normal,
        }
    }
}

impl fmt::Display for PersonaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a player is in the zone session lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Not in any zone session
    #[default]
    None,

    /// Entry side effects are running
    Entering { zone_id: ZoneId },

    /// Inside a zone session
    Active { zone_id: ZoneId },

    /// Exit side effects are running
    Exiting { zone_id: ZoneId },
}

impl SessionPhase {
    pub fn zone_id(&self) -> Option<&str> {
        match self {
            Self::Entering { zone_id } | Self::Active { zone_id } | Self::Exiting { zone_id } => {
                Some(zone_id)
            }
            Self::None => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Entering { .. } => "entering",
            Self::Active { .. } => "active",
            Self::Exiting { .. } => "exiting",
        }
    }

    /// True while entry or exit side effects are running.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Entering { .. } | Self::Exiting { .. })
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Entering { zone_id } => write!(f, "Entering({})", zone_id),
            Self::Active { zone_id } => write!(f, "Active({})", zone_id),
            Self::Exiting { zone_id } => write!(f, "Exiting({})", zone_id),
        }
    }
}

/// Session phase events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseEvent {
    BeginEntry { zone_id: ZoneId },
    CompleteEntry,
    BeginExit,
    CompleteExit,
    /// Move an active session to another zone the player is also inside.
    Rehome { zone_id: ZoneId },
    Reset,
}

/// Error when a phase transition is invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: SessionPhase,
    pub event: PhaseEvent,
    pub reason: &'static str,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid transition from {} via {:?}: {}",
            self.from, self.event, self.reason
        )
    }
}

impl std::error::Error for InvalidTransition {}

/// Session state of one player.
#[derive(Debug, Clone)]
pub struct PlayerSessionState {
    pub player_id: PlayerId,

    phase: SessionPhase,

    /// Persona currently in play
    pub persona: PersonaKind,

    /// The player's own character
    pub normal_ref: ObjectRef,

    /// Alternate character, checked for liveness before every use
    pub alternate_ref: Option<ObjectRef>,

    /// Whether walking into a zone starts a session
    pub auto_enter: bool,

    /// Whether the entry gear kit is applied on zone entry
    pub auto_equip: bool,

    /// Swap session holding the entry kit, if one was applied
    pub entry_gear_session: Option<String>,

    /// Where the normal persona stood when the alternate took over
    pub last_normal_position: Option<Vec3>,

    /// Normal persona's character data saved on the swap away from it
    pub normal_profile: Option<ComponentSnapshot>,

    pub created_at: DateTime<Utc>,
    pub alternate_created_at: Option<DateTime<Utc>>,
    pub last_swap_at: Option<DateTime<Utc>>,
}

impl PlayerSessionState {
    pub fn new(player_id: PlayerId, normal_ref: ObjectRef) -> Self {
        Self {
            player_id,
            phase: SessionPhase::None,
            persona: PersonaKind::Normal,
            normal_ref,
            alternate_ref: None,
            auto_enter: true,
            auto_equip: false,
            entry_gear_session: None,
            last_normal_position: None,
            normal_profile: None,
            created_at: Utc::now(),
            alternate_created_at: None,
            last_swap_at: None,
        }
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn active_zone_id(&self) -> Option<&str> {
        self.phase.zone_id()
    }

    pub fn in_session(&self) -> bool {
        !matches!(self.phase, SessionPhase::None)
    }

    /// Object of the persona currently in play.
    pub fn active_object(&self) -> ObjectRef {
        self.persona_object(self.persona).unwrap_or(self.normal_ref)
    }

    pub fn persona_object(&self, persona: PersonaKind) -> Option<ObjectRef> {
        match persona {
            PersonaKind::Normal => Some(self.normal_ref),
            PersonaKind::Alternate => self.alternate_ref,
        }
    }

    /// Apply an event in place, returning error if invalid.
    pub fn apply_mut(&mut self, event: PhaseEvent) -> Result<(), InvalidTransition> {
        self.phase = self.transition(&event)?;
        Ok(())
    }

    fn transition(&self, event: &PhaseEvent) -> Result<SessionPhase, InvalidTransition> {
        use PhaseEvent::*;
        use SessionPhase as Phase;

        let invalid = |reason: &'static str| InvalidTransition {
            from: self.phase.clone(),
            event: event.clone(),
            reason,
        };

        match (&self.phase, event) {
            // BeginEntry: None -> Entering
            (Phase::None, BeginEntry { zone_id }) => Ok(Phase::Entering {
                zone_id: zone_id.clone(),
            }),
            (_, BeginEntry { .. }) => Err(invalid("Already in a session")),

            // CompleteEntry: Entering -> Active
            (Phase::Entering { zone_id }, CompleteEntry) => Ok(Phase::Active {
                zone_id: zone_id.clone(),
            }),
            (_, CompleteEntry) => Err(invalid("Not entering")),

            // BeginExit: Active -> Exiting
            (Phase::Active { zone_id }, BeginExit) => Ok(Phase::Exiting {
                zone_id: zone_id.clone(),
            }),
            (Phase::Exiting { .. }, BeginExit) => Err(invalid("Already exiting")),
            (_, BeginExit) => Err(invalid("Not in an active session")),

            // CompleteExit: Exiting -> None
            (Phase::Exiting { .. }, CompleteExit) => Ok(Phase::None),
            (_, CompleteExit) => Err(invalid("Not exiting")),

            // Rehome: Active -> Active
            (Phase::Active { zone_id: current }, Rehome { zone_id }) if current == zone_id => {
                Err(invalid("Already in that zone"))
            }
            (Phase::Active { .. }, Rehome { zone_id }) => Ok(Phase::Active {
                zone_id: zone_id.clone(),
            }),
            (_, Rehome { .. }) => Err(invalid("Not in an active session")),

            // Reset: Any -> None
            (Phase::None, Reset) => Err(invalid("Already idle")),
            (_, Reset) => Ok(Phase::None),
        }
    }

    /// Convert to JSON for status replies.
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::json!({
            "player_id": self.player_id,
            "phase": self.phase.name(),
            "zone_id": self.active_zone_id(),
            "persona": self.persona.as_str(),
            "has_alternate": self.alternate_ref.is_some(),
            "auto_enter": self.auto_enter,
            "auto_equip": self.auto_equip,
            "created_at": self.created_at.to_rfc3339()
        });
        if let Some(at) = &self.last_swap_at {
            obj["last_swap_at"] = serde_json::json!(at.to_rfc3339());
        }
        if let Some(position) = &self.last_normal_position {
            obj["last_normal_position"] = serde_json::json!(position);
        }
        obj
    }
}

/// Session state for every tracked player.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<PlayerId, PlayerSessionState>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a player's session, creating it if needed.
    ///
    /// An existing session keeps its normal object unless that one is null.
    pub fn get_or_create(
        &mut self,
        player_id: PlayerId,
        normal_ref: ObjectRef,
    ) -> &mut PlayerSessionState {
        let session = self
            .sessions
            .entry(player_id)
            .or_insert_with(|| PlayerSessionState::new(player_id, normal_ref));
        if session.normal_ref.is_null() {
            session.normal_ref = normal_ref;
        }
        session
    }

    pub fn get(&self, player_id: PlayerId) -> Option<&PlayerSessionState> {
        self.sessions.get(&player_id)
    }

    pub fn get_mut(&mut self, player_id: PlayerId) -> Option<&mut PlayerSessionState> {
        self.sessions.get_mut(&player_id)
    }

    pub fn remove(&mut self, player_id: PlayerId) -> Option<PlayerSessionState> {
        self.sessions.remove(&player_id)
    }

    pub fn contains(&self, player_id: PlayerId) -> bool {
        self.sessions.contains_key(&player_id)
    }

    /// Tracked player ids in ascending order.
    pub fn player_ids(&self) -> Vec<PlayerId> {
        let mut ids: Vec<PlayerId> = self.sessions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlayerSessionState> {
        self.sessions.values()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn apply_event(
        &mut self,
        player_id: PlayerId,
        event: PhaseEvent,
    ) -> Option<Result<(), InvalidTransition>> {
        self.sessions
            .get_mut(&player_id)
            .map(|session| session.apply_mut(event))
    }
}
