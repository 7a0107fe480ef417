//! Dual persona management.
//!
//! Every tracked player has a normal character and may have an alternate one.
//! Only one is in play at a time; the other is frozen in place. Switching
//! never destroys either persona.
//!
//! ```text
//!            switch_to(Alternate)
//!   Normal ───────────────────────▶ Alternate
//!          ◀───────────────────────
//!            switch_to(Normal)
//! ```
//!
//! Object references are checked for liveness before every use. A stale
//! alternate reference is dropped and reported instead of being trusted.

use std::fmt;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::session::{PersonaKind, PlayerSessionState};
use super::PlayerId;
use crate::snapshot::{
    read_component, write_component, CharacterProfile, CharacterProfileSave, Component,
    ComponentSnapshot, ComponentTag, EntityMapper, Presence, PresenceState, SnapshotEngine,
    SnapshotError,
};
use crate::world::{ObjectRef, World};

/// Persona errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersonaError {
    UnknownPlayer(PlayerId),
    AlreadyExists,
    NoAlternate,
    AlreadyActive(PersonaKind),
    /// The persona's object no longer exists
    StaleReference(PersonaKind),
    Snapshot(SnapshotError),
}

impl fmt::Display for PersonaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownPlayer(id) => write!(f, "Player {} is not tracked", id),
            Self::AlreadyExists => write!(f, "An alternate character already exists"),
            Self::NoAlternate => write!(f, "No alternate character exists"),
            Self::AlreadyActive(persona) => write!(f, "Already playing the {} character", persona),
            Self::StaleReference(persona) => {
                write!(f, "The {} character no longer exists", persona)
            }
            Self::Snapshot(err) => write!(f, "Character data error: {}", err),
        }
    }
}

impl std::error::Error for PersonaError {}

impl From<SnapshotError> for PersonaError {
    fn from(err: SnapshotError) -> Self {
        Self::Snapshot(err)
    }
}

/// Creates, switches and deletes personas.
#[derive(Debug)]
pub struct DualCharacterManager {
    engine: SnapshotEngine,
    pub alternate_name_suffix: String,
    pub alternate_blood: CharacterProfile,
}

impl Default for DualCharacterManager {
    fn default() -> Self {
        Self::new("PvP", CharacterProfile::default())
    }
}

impl DualCharacterManager {
    /// `alternate_blood` supplies the blood type and quality given to new
    /// alternates; its name is ignored.
    pub fn new(alternate_name_suffix: impl Into<String>, alternate_blood: CharacterProfile) -> Self {
        Self {
            engine: SnapshotEngine::new(),
            alternate_name_suffix: alternate_name_suffix.into(),
            alternate_blood,
        }
    }

    /// True if the player has an alternate whose object still exists.
    pub fn has_alternate(&self, world: &dyn World, session: &PlayerSessionState) -> bool {
        session
            .alternate_ref
            .map(|alt| world.exists(alt))
            .unwrap_or(false)
    }

    /// Create the alternate persona next to the normal one.
    ///
    /// The alternate copies the normal persona's character data with the name
    /// suffix and blood settings applied, and starts frozen.
    pub fn create_alternate(
        &self,
        world: &mut dyn World,
        session: &mut PlayerSessionState,
    ) -> Result<ObjectRef, PersonaError> {
        if let Some(alt) = session.alternate_ref {
            if world.exists(alt) {
                return Err(PersonaError::AlreadyExists);
            }
            warn!(player = session.player_id, object = %alt, "dropping stale alternate reference");
            session.alternate_ref = None;
        }

        let normal = session.normal_ref;
        if !world.exists(normal) {
            return Err(PersonaError::StaleReference(PersonaKind::Normal));
        }

        let mut mapper = EntityMapper::new();
        let data = world
            .read_component(normal, ComponentTag::CharacterProfile)
            .unwrap_or_else(|| CharacterProfile::default().into_data());
        let profile = self.alternate_profile(self.engine.save(&data, &mut mapper)?);

        let alternate = world.create();
        if let Some(position) = world.position(normal) {
            world.set_position(alternate, position);
        }
        if let Err(err) = self
            .engine
            .apply_to_object(world, &profile, alternate, None, &mapper.to_vec())
        {
            world.destroy(alternate);
            return Err(err.into());
        }
        write_component(
            world,
            alternate,
            Presence {
                state: PresenceState::Frozen,
                owner: normal,
            },
        );

        session.alternate_ref = Some(alternate);
        session.alternate_created_at = Some(Utc::now());
        info!(player = session.player_id, object = %alternate, "alternate persona created");
        Ok(alternate)
    }

    fn alternate_profile(&self, snapshot: ComponentSnapshot) -> ComponentSnapshot {
        let ComponentSnapshot::CharacterProfile(save) = snapshot else {
            return snapshot;
        };
        let name = save.name.unwrap_or_default();
        ComponentSnapshot::CharacterProfile(CharacterProfileSave {
            name: Some(format!("{}{}", name, self.alternate_name_suffix)),
            blood_type: Some(self.alternate_blood.blood_type.as_str().to_string()),
            blood_quality: Some(self.alternate_blood.blood_quality()),
        })
    }

    /// Put `target` in play.
    ///
    /// The target takes the current persona's position, the current persona
    /// is frozen. Leaving the normal persona saves its character data, which
    /// is written back when switching to it again.
    pub fn switch_to(
        &self,
        world: &mut dyn World,
        session: &mut PlayerSessionState,
        target: PersonaKind,
    ) -> Result<(), PersonaError> {
        if session.persona == target {
            return Err(PersonaError::AlreadyActive(target));
        }

        let alternate = match session.alternate_ref {
            Some(alt) if world.exists(alt) => alt,
            Some(alt) => {
                warn!(player = session.player_id, object = %alt, "alternate persona vanished");
                session.alternate_ref = None;
                if session.persona == PersonaKind::Alternate {
                    self.reactivate_normal(world, session);
                }
                return Err(PersonaError::StaleReference(PersonaKind::Alternate));
            }
            None => return Err(PersonaError::NoAlternate),
        };
        let normal = session.normal_ref;
        if !world.exists(normal) {
            return Err(PersonaError::StaleReference(PersonaKind::Normal));
        }

        let (current, next) = match target {
            PersonaKind::Alternate => (normal, alternate),
            PersonaKind::Normal => (alternate, normal),
        };

        let position = world.position(current);
        if target == PersonaKind::Alternate {
            session.last_normal_position = position;
            let mut mapper = EntityMapper::new();
            session.normal_profile = self
                .engine
                .save_object(world, normal, ComponentTag::CharacterProfile, &mut mapper)
                .ok();
        } else if let Some(profile) = session.normal_profile.take() {
            if let Err(err) = self.engine.apply_to_object(world, &profile, normal, None, &[]) {
                warn!(player = session.player_id, error = %err, "could not restore normal character data");
            }
        }

        if let Some(position) = position {
            world.set_position(next, position);
        }
        set_presence(world, current, PresenceState::Frozen);
        set_presence(world, next, PresenceState::Active);

        session.persona = target;
        session.last_swap_at = Some(Utc::now());
        info!(player = session.player_id, persona = %target, "persona switched");
        Ok(())
    }

    /// Destroy the alternate persona, switching back to normal first if it is
    /// in play.
    pub fn delete_alternate(
        &self,
        world: &mut dyn World,
        session: &mut PlayerSessionState,
    ) -> Result<(), PersonaError> {
        let Some(alternate) = session.alternate_ref else {
            return Err(PersonaError::NoAlternate);
        };

        if session.persona == PersonaKind::Alternate {
            if world.exists(alternate) {
                self.switch_to(world, session, PersonaKind::Normal)?;
            } else {
                self.reactivate_normal(world, session);
            }
        }
        if !world.destroy(alternate) {
            debug!(player = session.player_id, object = %alternate, "alternate already gone");
        }

        session.alternate_ref = None;
        session.alternate_created_at = None;
        session.persona = PersonaKind::Normal;
        info!(player = session.player_id, "alternate persona deleted");
        Ok(())
    }

    /// Put the normal persona back in play after the alternate vanished under
    /// the player.
    fn reactivate_normal(&self, world: &mut dyn World, session: &mut PlayerSessionState) {
        session.persona = PersonaKind::Normal;
        let normal = session.normal_ref;
        if !world.exists(normal) {
            warn!(player = session.player_id, object = %normal, "normal persona vanished too");
            return;
        }

        if let Some(profile) = session.normal_profile.take() {
            if let Err(err) = self.engine.apply_to_object(world, &profile, normal, None, &[]) {
                warn!(player = session.player_id, error = %err, "could not restore normal character data");
            }
        }
        if let Some(position) = session.last_normal_position {
            world.set_position(normal, position);
        }
        set_presence(world, normal, PresenceState::Active);
        session.last_swap_at = Some(Utc::now());
        info!(player = session.player_id, "normal persona reactivated");
    }
}

fn set_presence(world: &mut dyn World, object: ObjectRef, state: PresenceState) {
    let mut presence = read_component::<Presence>(world, object).unwrap_or_default();
    presence.state = state;
    if !write_component(world, object, presence) {
        warn!(%object, "could not update presence");
    }
}
