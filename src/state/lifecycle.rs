//! Arena lifecycle orchestration.
//!
//! Each active zone moves through `None → Entering → Active → Exiting → None`
//! as its membership goes from empty to occupied and back. Each player moves
//! through the same phases in their own [`PlayerSessionState`]; the side
//! effects of entering (persona switch, entry gear, unlock drain) and of
//! exiting (gear revert, persona switch back, unlock drain) run while the
//! player is in `Entering` / `Exiting`.
//!
//! ```text
//!   tick ──▶ ZoneMembershipTracker ──▶ Enter events ──▶ entry side effects
//!                                  └─▶ Exit events  ──▶ exit side effects
//! ```
//!
//! A player inside several zones has one session, owned by the zone they
//! entered first. Leaving that zone while still inside another moves the
//! session to the other zone instead of ending it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::gear::{GearError, GearSwapSessionManager};
use super::persona::{DualCharacterManager, PersonaError};
use super::session::{
    InvalidTransition, PersonaKind, PhaseEvent, PlayerSessionState, SessionPhase, SessionStore,
};
use super::unlock::{DrainContext, DrainReport, UnlockId, UnlockReadinessTracker};
use super::zone::{MembershipEvent, ZoneDefinition, ZoneMembershipTracker};
use super::{PlayerId, ZoneId};
use crate::config::{ArenaSettings, ConfigError, ZoneConfigFile};
use crate::events::EventSink;
use crate::inventory::{GearEntry, Inventory, ItemCatalog};
use crate::world::{ObjectRef, Vec3, World};

/// Lifecycle phase of one zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ArenaPhase {
    #[default]
    None,
    Entering,
    Active,
    Exiting,
}

impl ArenaPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Entering => "entering",
            Self::Active => "active",
            Self::Exiting => "exiting",
        }
    }

    fn can_advance_to(&self, next: ArenaPhase) -> bool {
        use ArenaPhase as P;
        matches!(
            (self, next),
            (P::None, P::Entering)
                | (P::Entering, P::Active)
                | (P::Entering, P::Exiting)
                | (P::Active, P::Exiting)
                | (P::Exiting, P::None)
        )
    }
}

impl fmt::Display for ArenaPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of one active zone.
#[derive(Debug, Clone)]
pub struct ArenaLifecycleState {
    pub zone_id: ZoneId,
    pub is_active: bool,
    pub active_players: BTreeSet<PlayerId>,
    phase: ArenaPhase,
    pub activated_at: DateTime<Utc>,
}

impl ArenaLifecycleState {
    fn new(zone_id: ZoneId) -> Self {
        Self {
            zone_id,
            is_active: true,
            active_players: BTreeSet::new(),
            phase: ArenaPhase::None,
            activated_at: Utc::now(),
        }
    }

    pub fn phase(&self) -> ArenaPhase {
        self.phase
    }

    /// Move to `next`. Asking for the current phase is a logged no-op.
    fn advance(&mut self, next: ArenaPhase) -> bool {
        if self.phase == next {
            debug!(zone = %self.zone_id, phase = %next, "already in phase");
            return false;
        }
        if !self.phase.can_advance_to(next) {
            warn!(zone = %self.zone_id, from = %self.phase, to = %next, "invalid arena phase change");
            return false;
        }
        info!(zone = %self.zone_id, from = %self.phase, to = %next, "arena phase changed");
        self.phase = next;
        true
    }

    pub fn to_json(&self) -> serde_json::Value {
        let players: Vec<PlayerId> = self.active_players.iter().copied().collect();
        serde_json::json!({
            "zone_id": self.zone_id,
            "is_active": self.is_active,
            "phase": self.phase.as_str(),
            "active_players": players,
            "activated_at": self.activated_at.to_rfc3339()
        })
    }
}

/// What an externally triggered progression repair may do for a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairDecision {
    /// Outside any session; run without draining
    Allow,
    /// Mid-transition; pending unlocks were drained first
    Drained(DrainReport),
    /// Inside an active session
    Block,
}

impl RepairDecision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Self::Block)
    }
}

/// Per-player failure isolated during a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerFailure {
    pub player_id: PlayerId,
    pub zone_id: ZoneId,
    pub reason: String,
}

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub events: Vec<MembershipEvent>,
    /// Players whose session started
    pub entered: Vec<(PlayerId, ZoneId)>,
    /// Players whose session ended
    pub exited: Vec<(PlayerId, ZoneId)>,
    /// Players whose session moved to another zone they are inside
    pub rehomed: Vec<(PlayerId, ZoneId)>,
    pub failures: Vec<PlayerFailure>,
}

/// Top-level orchestrator.
///
/// Owns the world, inventory and catalog collaborators and every component
/// state. All mutation happens through `&mut self`; only the unlock tracker is
/// shared (see [`unlock_tracker`](Self::unlock_tracker)).
pub struct ArenaLifecycleManager<W, I, C> {
    settings: ArenaSettings,
    world: W,
    inventory: I,
    catalog: C,
    zones: ZoneMembershipTracker,
    arenas: BTreeMap<ZoneId, ArenaLifecycleState>,
    sessions: SessionStore,
    personas: DualCharacterManager,
    gear: GearSwapSessionManager,
    unlocks: Arc<UnlockReadinessTracker>,
}

impl<W, I, C> ArenaLifecycleManager<W, I, C>
where
    W: World,
    I: Inventory,
    C: ItemCatalog,
{
    pub fn new(
        settings: ArenaSettings,
        world: W,
        inventory: I,
        catalog: C,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let personas = DualCharacterManager::new(
            settings.alternate_name_suffix.clone(),
            settings.alternate_blood(),
        );
        Self {
            settings,
            world,
            inventory,
            catalog,
            zones: ZoneMembershipTracker::new(),
            arenas: BTreeMap::new(),
            sessions: SessionStore::new(),
            personas,
            gear: GearSwapSessionManager::new(),
            unlocks: Arc::new(UnlockReadinessTracker::new(sink)),
        }
    }

    // =========================================================================
    // Zones
    // =========================================================================

    /// Activate a zone. False if the id is already active or the definition
    /// is invalid.
    pub fn activate(&mut self, zone_id: impl Into<ZoneId>, definition: ZoneDefinition) -> bool {
        let zone_id = zone_id.into();
        if self.arenas.contains_key(&zone_id) {
            debug!(zone = %zone_id, "zone already active");
            return false;
        }
        let definition = match ZoneDefinition::new(zone_id.clone(), definition.name, definition.shape)
        {
            Ok(definition) => definition,
            Err(err) => {
                warn!(zone = %zone_id, error = %err, "rejecting zone");
                return false;
            }
        };
        if let Err(err) = self.zones.add_zone(definition) {
            warn!(zone = %zone_id, error = %err, "rejecting zone");
            return false;
        }

        info!(zone = %zone_id, "zone activated");
        self.arenas
            .insert(zone_id.clone(), ArenaLifecycleState::new(zone_id));
        true
    }

    /// Deactivate a zone, forcing every remaining member through exit first.
    pub fn deactivate(&mut self, zone_id: &str) -> bool {
        let Some(arena) = self.arenas.get_mut(zone_id) else {
            debug!(zone = %zone_id, "zone not active");
            return false;
        };

        let members = self.zones.members(zone_id);
        if !members.is_empty() {
            arena.advance(ArenaPhase::Exiting);
        }

        // Forget the zone first so rehoming only sees the remaining zones.
        self.zones.remove_zone(zone_id);
        for player_id in members {
            let owns = self
                .sessions
                .get(player_id)
                .map(|s| s.active_zone_id() == Some(zone_id))
                .unwrap_or(false);
            if !owns {
                continue;
            }
            match self.zones.zones_of(player_id).into_iter().next() {
                Some(next) => {
                    self.rehome(player_id, &next);
                }
                None => {
                    if let Err(err) = self.run_exit(player_id, true) {
                        warn!(player = player_id, zone = %zone_id, error = %err, "forced exit failed");
                    }
                }
            }
        }

        if let Some(mut arena) = self.arenas.remove(zone_id) {
            arena.advance(ArenaPhase::None);
        }
        info!(zone = %zone_id, "zone deactivated");
        true
    }

    /// Deactivate every zone. Returns how many were active.
    pub fn clear(&mut self) -> usize {
        let zone_ids: Vec<ZoneId> = self.arenas.keys().cloned().collect();
        zone_ids
            .iter()
            .filter(|zone_id| self.deactivate(zone_id))
            .count()
    }

    /// First active zone (by id) containing a position.
    pub fn zone_containing(&self, position: &Vec3) -> Option<ZoneId> {
        self.zones.zone_containing(position)
    }

    pub fn list_active(&self) -> BTreeSet<ZoneId> {
        self.arenas.keys().cloned().collect()
    }

    pub fn arena_state(&self, zone_id: &str) -> Option<&ArenaLifecycleState> {
        self.arenas.get(zone_id)
    }

    pub fn zone_definition(&self, zone_id: &str) -> Option<&ZoneDefinition> {
        self.zones.definition(zone_id)
    }

    /// Write every active zone to a zone configuration file.
    pub fn save_zones(&self, path: impl AsRef<Path>) -> Result<usize, ConfigError> {
        let file = ZoneConfigFile::from_definitions(self.zones.definitions());
        file.save(path)?;
        Ok(file.zones.len())
    }

    /// Activate every valid zone in a configuration file that is not already
    /// active. Returns how many were activated.
    pub fn load_zones(&mut self, path: impl AsRef<Path>) -> Result<usize, ConfigError> {
        let file = ZoneConfigFile::load(path)?;
        let activated = file
            .definitions()
            .into_iter()
            .filter(|definition| self.activate(definition.id.clone(), definition.clone()))
            .count();
        info!(zones = activated, "zones loaded");
        Ok(activated)
    }

    // =========================================================================
    // Players
    // =========================================================================

    /// Start tracking a player and their own character object.
    pub fn track_player(&mut self, player_id: PlayerId, character: ObjectRef) {
        let fresh = !self.sessions.contains(player_id);
        let session = self.sessions.get_or_create(player_id, character);
        if fresh {
            session.auto_enter = self.settings.auto_enter;
        }
    }

    pub fn session(&self, player_id: PlayerId) -> Option<&PlayerSessionState> {
        self.sessions.get(player_id)
    }

    /// Force a player out of any session and forget them.
    pub fn disconnect(&mut self, player_id: PlayerId) -> bool {
        let Some(phase) = self.sessions.get(player_id).map(|s| s.phase().clone()) else {
            return false;
        };

        match phase {
            SessionPhase::Active { .. } => {
                if let Err(err) = self.run_exit(player_id, true) {
                    warn!(player = player_id, error = %err, "exit on disconnect failed");
                }
            }
            SessionPhase::None => {}
            _ => {
                let _ = self.sessions.apply_event(player_id, PhaseEvent::Reset);
                self.gear.revert_all(&mut self.inventory, player_id);
            }
        }

        for zone_id in self.zones.remove_player(player_id) {
            if let Some(arena) = self.arenas.get_mut(&zone_id) {
                arena.active_players.remove(&player_id);
                if arena.active_players.is_empty() && arena.advance(ArenaPhase::Exiting) {
                    arena.advance(ArenaPhase::None);
                }
            }
        }

        self.gear.remove_player(player_id);
        self.unlocks.remove(player_id);
        self.sessions.remove(player_id);
        info!(player = player_id, "player disconnected");
        true
    }

    // =========================================================================
    // Tick
    // =========================================================================

    /// Evaluate membership for every tracked player and run the resulting
    /// entry and exit side effects.
    pub fn tick(&mut self) -> TickReport {
        let mut positions: Vec<(PlayerId, Option<Vec3>)> = self
            .sessions
            .iter()
            .map(|s| (s.player_id, self.world.position(s.active_object())))
            .collect();
        positions.sort_by_key(|(player_id, _)| *player_id);

        let events = self.zones.tick(positions);
        let mut report = TickReport::default();

        let (enters, exits): (Vec<&MembershipEvent>, Vec<&MembershipEvent>) =
            events.iter().partition(|e| e.is_enter());

        for event in enters {
            self.handle_enter(event.player_id(), event.zone_id(), &mut report);
        }
        for arena in self.arenas.values_mut() {
            if arena.phase() == ArenaPhase::Entering {
                arena.advance(ArenaPhase::Active);
            }
        }
        for event in exits {
            self.handle_exit(event.player_id(), event.zone_id(), &mut report);
        }

        report.events = events;
        report
    }

    fn handle_enter(&mut self, player_id: PlayerId, zone_id: &str, report: &mut TickReport) {
        if let Some(arena) = self.arenas.get_mut(zone_id) {
            arena.active_players.insert(player_id);
            if arena.phase() == ArenaPhase::None {
                arena.advance(ArenaPhase::Entering);
            }
        }

        let Some(session) = self.sessions.get(player_id) else {
            return;
        };
        if session.in_session() {
            debug!(player = player_id, zone = %zone_id, "already in a session, joining zone only");
            return;
        }
        if !session.auto_enter {
            debug!(player = player_id, zone = %zone_id, "auto-enter off, joining zone only");
            return;
        }

        match self.run_entry(player_id, zone_id) {
            Ok(()) => report.entered.push((player_id, zone_id.to_string())),
            Err(err) => report.failures.push(PlayerFailure {
                player_id,
                zone_id: zone_id.to_string(),
                reason: err.to_string(),
            }),
        }
    }

    fn handle_exit(&mut self, player_id: PlayerId, zone_id: &str, report: &mut TickReport) {
        let emptied = match self.arenas.get_mut(zone_id) {
            Some(arena) => {
                arena.active_players.remove(&player_id);
                arena.active_players.is_empty() && arena.advance(ArenaPhase::Exiting)
            }
            None => false,
        };

        let owns = self
            .sessions
            .get(player_id)
            .map(|s| s.active_zone_id() == Some(zone_id))
            .unwrap_or(false);
        if owns {
            match self.zones.zones_of(player_id).into_iter().next() {
                Some(next) => {
                    if self.rehome(player_id, &next) {
                        report.rehomed.push((player_id, next));
                    }
                }
                None => match self.run_exit(player_id, false) {
                    Ok(()) => report.exited.push((player_id, zone_id.to_string())),
                    Err(err) => report.failures.push(PlayerFailure {
                        player_id,
                        zone_id: zone_id.to_string(),
                        reason: err.to_string(),
                    }),
                },
            }
        }

        if emptied {
            if let Some(arena) = self.arenas.get_mut(zone_id) {
                arena.advance(ArenaPhase::None);
            }
        }
    }

    fn rehome(&mut self, player_id: PlayerId, zone_id: &str) -> bool {
        let event = PhaseEvent::Rehome {
            zone_id: zone_id.to_string(),
        };
        match self.sessions.apply_event(player_id, event) {
            Some(Ok(())) => {
                info!(player = player_id, zone = %zone_id, "session moved to overlapping zone");
                true
            }
            Some(Err(err)) => {
                warn!(player = player_id, zone = %zone_id, error = %err, "could not move session");
                false
            }
            None => false,
        }
    }

    /// Entry side effects. Only a phase error aborts; everything else is
    /// logged and the entry completes.
    fn run_entry(&mut self, player_id: PlayerId, zone_id: &str) -> Result<(), InvalidTransition> {
        let Self {
            settings,
            world,
            inventory,
            catalog,
            sessions,
            personas,
            gear,
            unlocks,
            ..
        } = self;
        let Some(session) = sessions.get_mut(player_id) else {
            return Ok(());
        };

        session.apply_mut(PhaseEvent::BeginEntry {
            zone_id: zone_id.to_string(),
        })?;
        info!(player = player_id, zone = %zone_id, "entering arena");

        if settings.create_alternate_on_entry && !personas.has_alternate(&*world, session) {
            if let Err(err) = personas.create_alternate(world, session) {
                warn!(player = player_id, error = %err, "could not create alternate persona");
            }
        }
        if settings.switch_persona_on_entry && session.persona == PersonaKind::Normal {
            match personas.switch_to(world, session, PersonaKind::Alternate) {
                Ok(()) | Err(PersonaError::NoAlternate) => {}
                Err(err) => warn!(player = player_id, error = %err, "could not switch persona"),
            }
        }

        if session.auto_equip && !settings.entry_gear.is_empty() {
            let session_id = entry_session_id(zone_id);
            match gear.start(inventory, &*catalog, player_id, &session_id, &settings.entry_gear) {
                Ok(()) => session.entry_gear_session = Some(session_id),
                Err(err) => warn!(player = player_id, error = %err, "entry gear not applied"),
            }
        }

        unlocks.drain(player_id, DrainContext::Entry);
        session.apply_mut(PhaseEvent::CompleteEntry)
    }

    /// Exit side effects. `forced` reverts every swap session.
    fn run_exit(&mut self, player_id: PlayerId, forced: bool) -> Result<(), InvalidTransition> {
        let Self {
            settings,
            world,
            inventory,
            sessions,
            personas,
            gear,
            unlocks,
            ..
        } = self;
        let Some(session) = sessions.get_mut(player_id) else {
            return Ok(());
        };

        let zone_id = session.active_zone_id().unwrap_or_default().to_string();
        session.apply_mut(PhaseEvent::BeginExit)?;
        info!(player = player_id, zone = %zone_id, forced, "exiting arena");

        let entry_session = session.entry_gear_session.take();
        if forced || settings.revert_all_on_exit {
            gear.revert_all(inventory, player_id);
        } else if let Some(session_id) = entry_session {
            gear.end(inventory, player_id, &session_id);
        }

        if session.persona == PersonaKind::Alternate {
            if let Err(err) = personas.switch_to(world, session, PersonaKind::Normal) {
                warn!(player = player_id, error = %err, "could not switch back to normal persona");
            }
        }

        unlocks.drain(player_id, DrainContext::Exit);
        session.apply_mut(PhaseEvent::CompleteExit)
    }

    // =========================================================================
    // Personas
    // =========================================================================

    pub fn create_alternate(&mut self, player_id: PlayerId) -> Result<ObjectRef, PersonaError> {
        let session = self
            .sessions
            .get_mut(player_id)
            .ok_or(PersonaError::UnknownPlayer(player_id))?;
        self.personas.create_alternate(&mut self.world, session)
    }

    pub fn switch_persona(
        &mut self,
        player_id: PlayerId,
        target: PersonaKind,
    ) -> Result<(), PersonaError> {
        let session = self
            .sessions
            .get_mut(player_id)
            .ok_or(PersonaError::UnknownPlayer(player_id))?;
        self.personas.switch_to(&mut self.world, session, target)
    }

    pub fn delete_alternate(&mut self, player_id: PlayerId) -> Result<(), PersonaError> {
        let session = self
            .sessions
            .get_mut(player_id)
            .ok_or(PersonaError::UnknownPlayer(player_id))?;
        self.personas.delete_alternate(&mut self.world, session)
    }

    // =========================================================================
    // Gear
    // =========================================================================

    pub fn start_swap(
        &mut self,
        player_id: PlayerId,
        session_id: &str,
        gear: &[GearEntry],
    ) -> Result<(), GearError> {
        self.gear
            .start(&mut self.inventory, &self.catalog, player_id, session_id, gear)
    }

    pub fn end_swap(&mut self, player_id: PlayerId, session_id: &str) -> bool {
        if let Some(session) = self.sessions.get_mut(player_id) {
            if session.entry_gear_session.as_deref() == Some(session_id) {
                session.entry_gear_session = None;
            }
        }
        self.gear.end(&mut self.inventory, player_id, session_id)
    }

    /// Revert every swap session and the baseline.
    pub fn revert_gear(&mut self, player_id: PlayerId) -> usize {
        if let Some(session) = self.sessions.get_mut(player_id) {
            session.entry_gear_session = None;
        }
        self.gear.revert_all(&mut self.inventory, player_id)
    }

    /// Equip gear outside any swap session.
    pub fn equip_kit(&mut self, player_id: PlayerId, gear: &[GearEntry]) -> Result<(), GearError> {
        self.gear
            .equip_baseline(&mut self.inventory, &self.catalog, player_id, gear)
    }

    pub fn active_swaps(&self, player_id: PlayerId) -> Vec<String> {
        self.gear.active_sessions(player_id)
    }

    /// Set whether zone entry starts a session. False if the player is not
    /// tracked. Takes effect on the next entry.
    pub fn set_auto_enter(&mut self, player_id: PlayerId, enabled: bool) -> bool {
        match self.sessions.get_mut(player_id) {
            Some(session) => {
                session.auto_enter = enabled;
                debug!(player = player_id, enabled, "auto-enter set");
                true
            }
            None => false,
        }
    }

    pub fn toggle_auto_enter(&mut self, player_id: PlayerId) -> Option<bool> {
        let enabled = !self.sessions.get(player_id)?.auto_enter;
        self.set_auto_enter(player_id, enabled);
        Some(enabled)
    }

    /// Set the entry-gear opt-in. False if the player is not tracked.
    pub fn set_auto_equip(&mut self, player_id: PlayerId, enabled: bool) -> bool {
        match self.sessions.get_mut(player_id) {
            Some(session) => {
                session.auto_equip = enabled;
                debug!(player = player_id, enabled, "auto-equip set");
                true
            }
            None => false,
        }
    }

    /// Flip the entry-gear opt-in, returning the new value.
    pub fn toggle_auto_equip(&mut self, player_id: PlayerId) -> Option<bool> {
        let enabled = !self.sessions.get(player_id)?.auto_equip;
        self.set_auto_equip(player_id, enabled);
        Some(enabled)
    }

    // =========================================================================
    // Unlocks
    // =========================================================================

    /// Queue unlocks from a session snapshot for the next phase boundary.
    pub fn ready_unlocks<U>(&self, player_id: PlayerId, snapshot: U)
    where
        U: IntoIterator<Item = UnlockId>,
    {
        self.unlocks.ready(player_id, snapshot);
    }

    /// Shared handle for hooks that run outside the tick.
    pub fn unlock_tracker(&self) -> Arc<UnlockReadinessTracker> {
        Arc::clone(&self.unlocks)
    }

    /// Decide whether a progression repair may run for a player now.
    pub fn repair_gate(&self, player_id: PlayerId) -> RepairDecision {
        let phase = self
            .sessions
            .get(player_id)
            .map(|s| s.phase().clone())
            .unwrap_or_default();
        repair_decision(&phase, &self.unlocks, player_id)
    }

    // =========================================================================
    // Accessors and status
    // =========================================================================

    pub fn settings(&self) -> &ArenaSettings {
        &self.settings
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    pub fn inventory(&self) -> &I {
        &self.inventory
    }

    pub fn inventory_mut(&mut self) -> &mut I {
        &mut self.inventory
    }

    /// Zone definition plus lifecycle state.
    pub fn zone_info(&self, zone_id: &str) -> Option<serde_json::Value> {
        let definition = self.zones.definition(zone_id)?;
        let mut obj = definition.to_json();
        if let Some(arena) = self.arenas.get(zone_id) {
            obj["lifecycle"] = arena.to_json();
        }
        Some(obj)
    }

    /// Convert to JSON for status replies.
    pub fn status_json(&self) -> serde_json::Value {
        let zones: Vec<serde_json::Value> = self
            .arenas
            .keys()
            .filter_map(|zone_id| self.zone_info(zone_id))
            .collect();

        let players: Vec<serde_json::Value> = self
            .sessions
            .player_ids()
            .into_iter()
            .filter_map(|player_id| {
                let session = self.sessions.get(player_id)?;
                let mut obj = session.to_json();
                obj["swap_sessions"] = serde_json::json!(self.gear.active_sessions(player_id));
                obj["pending_unlocks"] = serde_json::json!(self.unlocks.pending_count(player_id));
                obj["completed_unlocks"] =
                    serde_json::json!(self.unlocks.completed_count(player_id));
                Some(obj)
            })
            .collect();

        serde_json::json!({
            "zones": zones,
            "players": players
        })
    }
}

fn entry_session_id(zone_id: &str) -> String {
    format!("zone:{}", zone_id)
}

/// Repair decision for a player phase: blocked while active, allowed
/// otherwise, with a drain first when mid-transition.
pub fn repair_decision(
    phase: &SessionPhase,
    unlocks: &UnlockReadinessTracker,
    player_id: PlayerId,
) -> RepairDecision {
    match phase {
        SessionPhase::Active { .. } => RepairDecision::Block,
        SessionPhase::None => RepairDecision::Allow,
        SessionPhase::Entering { .. } | SessionPhase::Exiting { .. } => {
            RepairDecision::Drained(unlocks.drain(player_id, DrainContext::Repair))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingSink;
    use crate::inventory::{MemoryInventory, StaticCatalog};
    use crate::snapshot::{read_component, CharacterProfile, Presence, PresenceState};
    use crate::world::MemoryWorld;
    use pretty_assertions::assert_eq;

    type Manager = ArenaLifecycleManager<MemoryWorld, MemoryInventory, StaticCatalog>;

    const CENTER: Vec3 = Vec3::new(-1000.0, 5.0, -500.0);
    const FAR: Vec3 = Vec3::new(0.0, 0.0, 0.0);

    fn settings() -> ArenaSettings {
        ArenaSettings {
            entry_gear: vec![GearEntry::new("Sword", 1), GearEntry::new("Potion", 3)],
            ..ArenaSettings::default()
        }
    }

    fn manager_with(settings: ArenaSettings) -> (Manager, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let manager = ArenaLifecycleManager::new(
            settings,
            MemoryWorld::new(),
            MemoryInventory::new(),
            StaticCatalog::new(["Sword", "Potion", "Helm", "Bow"]),
            sink.clone(),
        );
        (manager, sink)
    }

    fn arena() -> ZoneDefinition {
        ZoneDefinition::circle("arena", CENTER, 50.0).unwrap()
    }

    /// Tracked player standing at `position` with a named character.
    fn spawn_player(manager: &mut Manager, player_id: PlayerId, position: Vec3) -> ObjectRef {
        let world = manager.world_mut();
        let character = world.spawn_at(position);
        crate::snapshot::write_component(world, character, CharacterProfile::new("Alice"));
        manager.track_player(player_id, character);
        character
    }

    fn move_player(manager: &mut Manager, player_id: PlayerId, position: Vec3) {
        let object = manager.session(player_id).unwrap().active_object();
        manager.world_mut().set_position(object, position);
    }

    #[test]
    fn test_activate_and_deactivate() {
        let (mut manager, _) = manager_with(settings());
        assert!(manager.activate("arena", arena()));
        assert!(!manager.activate("arena", arena()));
        assert_eq!(manager.list_active(), BTreeSet::from(["arena".to_string()]));
        assert_eq!(manager.arena_state("arena").unwrap().phase(), ArenaPhase::None);

        assert!(manager.deactivate("arena"));
        assert!(!manager.deactivate("arena"));
        assert!(manager.list_active().is_empty());
    }

    #[test]
    fn test_activate_uses_given_id() {
        let (mut manager, _) = manager_with(settings());
        assert!(manager.activate("pit", arena()));
        assert_eq!(manager.zone_containing(&CENTER), Some("pit".to_string()));
        assert_eq!(manager.zone_containing(&FAR), None);
    }

    #[test]
    fn test_full_session_cycle() {
        let (mut manager, sink) = manager_with(settings());
        manager.activate("arena", arena());
        let normal = spawn_player(&mut manager, 1, FAR);
        manager.set_auto_equip(1, true);
        manager.inventory_mut().equip(1, "Helm", 1);
        sink.reject_unlock(7);
        manager.ready_unlocks(1, [5, 7, 7, 9]);

        // Outside: nothing happens.
        let report = manager.tick();
        assert!(report.events.is_empty());

        // Walk in.
        move_player(&mut manager, 1, Vec3::new(-1000.0, 5.0, -520.0));
        let report = manager.tick();
        assert_eq!(report.entered, vec![(1, "arena".to_string())]);
        assert!(report.failures.is_empty());

        let session = manager.session(1).unwrap();
        assert_eq!(
            *session.phase(),
            SessionPhase::Active {
                zone_id: "arena".to_string()
            }
        );
        assert_eq!(session.persona, PersonaKind::Alternate);
        let alternate = session.alternate_ref.unwrap();
        assert_eq!(
            read_component::<CharacterProfile>(manager.world(), alternate).map(|p| p.name),
            Some("AlicePvP".to_string())
        );
        assert_eq!(
            read_component::<Presence>(manager.world(), normal).map(|p| p.state),
            Some(PresenceState::Frozen)
        );
        assert_eq!(manager.inventory().list_equipped(1).len(), 3);
        assert_eq!(manager.active_swaps(1), vec!["zone:arena".to_string()]);
        assert_eq!(manager.arena_state("arena").unwrap().phase(), ArenaPhase::Active);

        let set = manager.unlock_tracker().snapshot(1).unwrap();
        assert_eq!(set.pending, vec![7]);
        assert_eq!(set.completed, BTreeSet::from([5, 9]));

        // Staying inside changes nothing.
        assert!(manager.tick().events.is_empty());

        // Walk out; 7 is accepted at the exit boundary.
        sink.accept_unlock(7);
        move_player(&mut manager, 1, FAR);
        let report = manager.tick();
        assert_eq!(report.exited, vec![(1, "arena".to_string())]);

        let session = manager.session(1).unwrap();
        assert!(!session.in_session());
        assert_eq!(session.persona, PersonaKind::Normal);
        assert_eq!(manager.world().position(normal), Some(FAR));
        assert!(manager.world().exists(alternate));
        assert_eq!(
            manager.inventory().list_equipped(1),
            vec![GearEntry::new("Helm", 1)]
        );
        assert!(!manager.unlock_tracker().has_pending(1));
        assert_eq!(manager.arena_state("arena").unwrap().phase(), ArenaPhase::None);
    }

    #[test]
    fn test_no_entry_gear_without_opt_in() {
        let (mut manager, _) = manager_with(settings());
        manager.activate("arena", arena());
        spawn_player(&mut manager, 1, CENTER);

        manager.tick();
        assert!(manager.inventory().list_equipped(1).is_empty());
        assert!(manager.active_swaps(1).is_empty());
        assert_eq!(manager.toggle_auto_equip(1), Some(true));
        assert_eq!(manager.toggle_auto_equip(99), None);
    }

    #[test]
    fn test_persona_switch_disabled() {
        let (mut manager, _) = manager_with(ArenaSettings {
            switch_persona_on_entry: false,
            create_alternate_on_entry: false,
            ..settings()
        });
        manager.activate("arena", arena());
        spawn_player(&mut manager, 1, CENTER);

        let report = manager.tick();
        assert_eq!(report.entered.len(), 1);
        let session = manager.session(1).unwrap();
        assert_eq!(session.persona, PersonaKind::Normal);
        assert!(session.alternate_ref.is_none());
    }

    #[test]
    fn test_direct_move_between_zones_keeps_session() {
        let (mut manager, _) = manager_with(settings());
        manager.activate("a", ZoneDefinition::circle("a", FAR, 10.0).unwrap());
        manager.activate("b", ZoneDefinition::circle("b", Vec3::new(100.0, 0.0, 0.0), 10.0).unwrap());
        spawn_player(&mut manager, 1, FAR);
        manager.set_auto_equip(1, true);

        manager.tick();
        let alternate = manager.session(1).unwrap().alternate_ref;

        // Teleport from a to b in one tick: enter b is seen before exit a.
        move_player(&mut manager, 1, Vec3::new(100.0, 0.0, 0.0));
        let report = manager.tick();
        assert!(report.events[0].is_enter());
        assert!(report.entered.is_empty());
        assert!(report.exited.is_empty());
        assert_eq!(report.rehomed, vec![(1, "b".to_string())]);

        let session = manager.session(1).unwrap();
        assert_eq!(session.active_zone_id(), Some("b"));
        assert_eq!(session.persona, PersonaKind::Alternate);
        assert_eq!(session.alternate_ref, alternate);
        // Entry kit applied once.
        assert_eq!(manager.inventory().list_equipped(1).len(), 2);

        assert_eq!(manager.arena_state("a").unwrap().phase(), ArenaPhase::None);
        assert_eq!(manager.arena_state("b").unwrap().phase(), ArenaPhase::Active);
    }

    #[test]
    fn test_exit_without_revert_all_ends_entry_session_only() {
        let (mut manager, _) = manager_with(ArenaSettings {
            revert_all_on_exit: false,
            ..settings()
        });
        manager.activate("arena", arena());
        spawn_player(&mut manager, 1, CENTER);
        manager.set_auto_equip(1, true);
        manager.equip_kit(1, &[GearEntry::new("Helm", 1)]).unwrap();

        manager.tick();
        assert_eq!(manager.inventory().list_equipped(1).len(), 3);

        move_player(&mut manager, 1, FAR);
        manager.tick();
        assert_eq!(
            manager.inventory().list_equipped(1),
            vec![GearEntry::new("Helm", 1)]
        );
        assert!(manager.active_swaps(1).is_empty());
    }

    #[test]
    fn test_deactivate_forces_exit() {
        let (mut manager, _) = manager_with(settings());
        manager.activate("arena", arena());
        let normal = spawn_player(&mut manager, 1, CENTER);
        manager.set_auto_equip(1, true);
        manager.tick();
        manager
            .start_swap(1, "extra", &[GearEntry::new("Bow", 1)])
            .unwrap();

        assert!(manager.deactivate("arena"));
        let session = manager.session(1).unwrap();
        assert!(!session.in_session());
        assert_eq!(session.persona, PersonaKind::Normal);
        assert!(manager.inventory().list_equipped(1).is_empty());
        assert!(manager.active_swaps(1).is_empty());
        assert_eq!(
            read_component::<Presence>(manager.world(), normal).map(|p| p.state),
            Some(PresenceState::Active)
        );

        // Nothing left to exit on the next tick.
        assert!(manager.tick().events.is_empty());
    }

    #[test]
    fn test_deactivate_rehomes_into_overlapping_zone() {
        let (mut manager, _) = manager_with(settings());
        manager.activate("a", ZoneDefinition::circle("a", FAR, 10.0).unwrap());
        manager.activate("b", ZoneDefinition::circle("b", Vec3::new(5.0, 0.0, 0.0), 10.0).unwrap());
        spawn_player(&mut manager, 1, FAR);
        manager.tick();
        assert_eq!(manager.session(1).unwrap().active_zone_id(), Some("a"));

        manager.deactivate("a");
        assert_eq!(manager.session(1).unwrap().active_zone_id(), Some("b"));
        assert_eq!(manager.clear(), 1);
        assert!(!manager.session(1).unwrap().in_session());
    }

    #[test]
    fn test_vanished_character_counts_as_exit() {
        let (mut manager, _) = manager_with(ArenaSettings {
            create_alternate_on_entry: false,
            ..settings()
        });
        manager.activate("arena", arena());
        let normal = spawn_player(&mut manager, 1, CENTER);
        manager.tick();

        manager.world_mut().destroy(normal);
        let report = manager.tick();
        assert_eq!(report.exited, vec![(1, "arena".to_string())]);
    }

    #[test]
    fn test_vanished_alternate_exits_with_normal_active() {
        let (mut manager, _) = manager_with(settings());
        manager.activate("arena", arena());
        let normal = spawn_player(&mut manager, 1, CENTER);
        manager.tick();
        let alternate = manager.session(1).unwrap().alternate_ref.unwrap();

        manager.world_mut().destroy(alternate);
        let report = manager.tick();
        assert_eq!(report.exited, vec![(1, "arena".to_string())]);

        let session = manager.session(1).unwrap();
        assert!(!session.in_session());
        assert_eq!(session.persona, PersonaKind::Normal);
        assert_eq!(session.alternate_ref, None);
        assert_eq!(
            read_component::<Presence>(manager.world(), normal).map(|p| p.state),
            Some(PresenceState::Active)
        );
        assert_eq!(manager.world().position(normal), Some(CENTER));
        assert_eq!(manager.arena_state("arena").unwrap().phase(), ArenaPhase::None);
    }

    #[test]
    fn test_auto_enter_off_joins_zone_only() {
        let (mut manager, _) = manager_with(settings());
        manager.activate("arena", arena());
        let normal = spawn_player(&mut manager, 1, CENTER);
        assert!(manager.set_auto_enter(1, false));
        assert!(!manager.set_auto_enter(99, false));

        let report = manager.tick();
        assert!(report.entered.is_empty());
        assert!(report.failures.is_empty());
        assert_eq!(
            manager.arena_state("arena").unwrap().active_players,
            BTreeSet::from([1])
        );
        assert_eq!(manager.arena_state("arena").unwrap().phase(), ArenaPhase::Entering);

        let session = manager.session(1).unwrap();
        assert!(!session.in_session());
        assert_eq!(session.persona, PersonaKind::Normal);
        assert_eq!(session.alternate_ref, None);
        assert_eq!(session.active_object(), normal);

        // Leaving the zone while opted out has no session to end.
        move_player(&mut manager, 1, FAR);
        let report = manager.tick();
        assert!(report.exited.is_empty());
        assert_eq!(manager.arena_state("arena").unwrap().phase(), ArenaPhase::None);

        // Opting back in applies on the next entry.
        assert_eq!(manager.toggle_auto_enter(1), Some(true));
        assert_eq!(manager.toggle_auto_enter(99), None);
        move_player(&mut manager, 1, CENTER);
        let report = manager.tick();
        assert_eq!(report.entered, vec![(1, "arena".to_string())]);
        assert_eq!(manager.session(1).unwrap().persona, PersonaKind::Alternate);
    }

    #[test]
    fn test_auto_enter_default_from_settings() {
        let (mut manager, _) = manager_with(ArenaSettings {
            auto_enter: false,
            ..settings()
        });
        manager.activate("arena", arena());
        let normal = spawn_player(&mut manager, 1, CENTER);
        assert!(!manager.session(1).unwrap().auto_enter);

        // Tracking again keeps the player's own choice.
        manager.set_auto_enter(1, true);
        manager.track_player(1, normal);
        assert!(manager.session(1).unwrap().auto_enter);
        manager.set_auto_enter(1, false);

        assert!(manager.tick().entered.is_empty());
        assert!(!manager.session(1).unwrap().in_session());

        manager.set_auto_enter(1, true);
        move_player(&mut manager, 1, FAR);
        manager.tick();
        move_player(&mut manager, 1, CENTER);
        assert_eq!(manager.tick().entered, vec![(1, "arena".to_string())]);
    }

    #[test]
    fn test_arena_phase_advance_rejects_repeat_and_jumps() {
        let mut arena = ArenaLifecycleState::new("z".to_string());
        assert!(!arena.advance(ArenaPhase::None));
        assert_eq!(arena.phase(), ArenaPhase::None);
        assert!(!arena.advance(ArenaPhase::Active));
        assert_eq!(arena.phase(), ArenaPhase::None);
        assert!(!arena.advance(ArenaPhase::Exiting));
        assert_eq!(arena.phase(), ArenaPhase::None);

        assert!(arena.advance(ArenaPhase::Entering));
        assert!(!arena.advance(ArenaPhase::Entering));
        assert_eq!(arena.phase(), ArenaPhase::Entering);
        assert!(!arena.advance(ArenaPhase::None));
        assert_eq!(arena.phase(), ArenaPhase::Entering);
    }

    #[test]
    fn test_disconnect_drops_everything() {
        let (mut manager, _) = manager_with(settings());
        manager.activate("arena", arena());
        spawn_player(&mut manager, 1, CENTER);
        manager.set_auto_equip(1, true);
        manager.ready_unlocks(1, [1, 2]);
        manager.tick();
        manager.ready_unlocks(1, [3]);

        assert!(manager.disconnect(1));
        assert!(manager.session(1).is_none());
        assert!(manager.inventory().list_equipped(1).is_empty());
        assert!(manager.unlock_tracker().snapshot(1).is_none());
        assert!(manager.arena_state("arena").unwrap().active_players.is_empty());
        assert_eq!(manager.arena_state("arena").unwrap().phase(), ArenaPhase::None);
        assert!(!manager.disconnect(1));
    }

    #[test]
    fn test_persona_commands() {
        let (mut manager, _) = manager_with(settings());
        spawn_player(&mut manager, 1, FAR);

        assert_eq!(
            manager.create_alternate(2),
            Err(PersonaError::UnknownPlayer(2))
        );
        manager.create_alternate(1).unwrap();
        manager.switch_persona(1, PersonaKind::Alternate).unwrap();
        assert_eq!(
            manager.switch_persona(1, PersonaKind::Alternate),
            Err(PersonaError::AlreadyActive(PersonaKind::Alternate))
        );
        manager.delete_alternate(1).unwrap();
        assert_eq!(manager.session(1).unwrap().persona, PersonaKind::Normal);
    }

    #[test]
    fn test_swap_commands() {
        let (mut manager, _) = manager_with(settings());
        spawn_player(&mut manager, 1, FAR);

        manager
            .start_swap(1, "duel", &[GearEntry::new("Bow", 1)])
            .unwrap();
        assert!(matches!(
            manager.start_swap(1, "duel", &[GearEntry::new("Bow", 1)]),
            Err(GearError::DuplicateSession(_))
        ));
        assert!(manager.end_swap(1, "duel"));
        assert!(!manager.end_swap(1, "duel"));
        assert_eq!(manager.revert_gear(1), 0);
    }

    #[test]
    fn test_repair_gate() {
        let (mut manager, sink) = manager_with(settings());
        manager.activate("arena", arena());
        spawn_player(&mut manager, 1, FAR);

        assert_eq!(manager.repair_gate(1), RepairDecision::Allow);
        assert_eq!(manager.repair_gate(42), RepairDecision::Allow);

        move_player(&mut manager, 1, CENTER);
        manager.tick();
        assert_eq!(manager.repair_gate(1), RepairDecision::Block);
        assert!(!manager.repair_gate(1).is_allowed());

        // Mid-transition phases drain first.
        let tracker = manager.unlock_tracker();
        tracker.ready(1, [11]);
        let entering = SessionPhase::Entering {
            zone_id: "arena".to_string(),
        };
        let decision = repair_decision(&entering, &tracker, 1);
        assert_eq!(
            decision,
            RepairDecision::Drained(DrainReport {
                applied: vec![11],
                ..DrainReport::default()
            })
        );
        assert_eq!(sink.events().len(), 1);
    }

    #[test]
    fn test_status_json() {
        let (mut manager, _) = manager_with(settings());
        manager.activate("arena", arena());
        spawn_player(&mut manager, 1, CENTER);
        manager.ready_unlocks(1, [4]);
        manager.tick();

        let status = manager.status_json();
        assert_eq!(status["zones"][0]["id"], "arena");
        assert_eq!(status["zones"][0]["lifecycle"]["phase"], "active");
        assert_eq!(status["zones"][0]["lifecycle"]["active_players"][0], 1);
        assert_eq!(status["players"][0]["phase"], "active");
        assert_eq!(status["players"][0]["persona"], "alternate");
        assert_eq!(status["players"][0]["completed_unlocks"], 1);
    }

    #[test]
    fn test_zone_file_round_trip() {
        let path = std::env::temp_dir()
            .join(format!("arena-session-lifecycle-{}", std::process::id()))
            .join("zones.json");

        let (mut manager, _) = manager_with(settings());
        manager.activate("arena", arena());
        manager.activate(
            "pit",
            ZoneDefinition::cuboid("pit", FAR, Vec3::new(2.0, 2.0, 2.0)).unwrap(),
        );
        assert_eq!(manager.save_zones(&path).unwrap(), 2);

        let (mut other, _) = manager_with(settings());
        other.activate("arena", arena());
        assert_eq!(other.load_zones(&path).unwrap(), 1);
        assert_eq!(other.list_active(), manager.list_active());
        assert_eq!(other.zone_definition("pit"), manager.zone_definition("pit"));

        let _ = std::fs::remove_file(&path);
    }
}
