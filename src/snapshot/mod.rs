//! Component snapshot engine.
//!
//! Captures component state of world objects either as a sparse diff
//! against a template object of the same kind, or in full when no reliable
//! template exists. Snapshots are restored field by field: absent fields keep
//! the target's current value, or the template/default value when the target
//! was created for the replay.
//!
//! ```text
//!   live ──diff(template)──▶ ComponentSnapshot (changed fields only)
//!   live ──save()─────────▶ ComponentSnapshot (every field)
//!   ComponentSnapshot ──apply(base)──▶ ComponentData ──▶ World
//! ```
//!
//! Savers are looked up in a registry keyed by [`ComponentTag`].

pub mod components;
pub mod mapper;
pub mod savers;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::world::{ObjectRef, Vec3, World};

pub use components::{
    read_component, write_component, BloodType, CharacterProfile, Component, ComponentData,
    ComponentTag, ItemCategory, Presence, PresenceState, PrefabGuid, RestrictedInventory,
};
pub use mapper::{EntityMapper, MapperStatistics};
pub use savers::{
    CharacterProfileSave, CharacterProfileSaver, ComponentSaver, PresenceSave, PresenceSaver,
    RestrictedInventorySave, RestrictedInventorySaver,
};

/// Sparse saved state of one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "component", content = "fields", rename_all = "snake_case")]
pub enum ComponentSnapshot {
    RestrictedInventory(RestrictedInventorySave),
    CharacterProfile(CharacterProfileSave),
    Presence(PresenceSave),
}

impl ComponentSnapshot {
    pub fn tag(&self) -> ComponentTag {
        match self {
            Self::RestrictedInventory(_) => ComponentTag::RestrictedInventory,
            Self::CharacterProfile(_) => ComponentTag::CharacterProfile,
            Self::Presence(_) => ComponentTag::Presence,
        }
    }
}

/// Snapshot engine errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    /// No saver registered for this component type.
    UnregisteredTag(ComponentTag),
    /// A value or record of one component type was handed to another's saver.
    TagMismatch {
        expected: ComponentTag,
        found: ComponentTag,
    },
    /// The object does not carry the component.
    MissingComponent { object: ObjectRef, tag: ComponentTag },
    /// The object no longer exists.
    ObjectNotFound(ObjectRef),
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnregisteredTag(tag) => write!(f, "no saver registered for {}", tag),
            Self::TagMismatch { expected, found } => {
                write!(f, "expected {} data, found {}", expected, found)
            }
            Self::MissingComponent { object, tag } => {
                write!(f, "{} has no {} component", object, tag)
            }
            Self::ObjectNotFound(object) => write!(f, "{} no longer exists", object),
        }
    }
}

impl std::error::Error for SnapshotError {}

/// Saved state of one object inside an [`ObjectSetSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSnapshot {
    /// Mapper index of the object (1-based).
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Vec3>,
    pub components: Vec<ComponentSnapshot>,
}

/// Saved state of a set of objects that may reference each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSetSnapshot {
    pub objects: Vec<ObjectSnapshot>,
    /// Objects outside the set that components refer to, in mapper order
    /// after the set itself.
    #[serde(default)]
    pub external: Vec<ObjectRef>,
    pub captured_at: DateTime<Utc>,
}

impl ObjectSetSnapshot {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}))
    }
}

/// Registry of component savers plus the object-level capture/restore flows.
pub struct SnapshotEngine {
    savers: BTreeMap<ComponentTag, Box<dyn ComponentSaver>>,
}

impl fmt::Debug for SnapshotEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotEngine")
            .field("tags", &self.savers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for SnapshotEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotEngine {
    /// Engine with the built-in savers registered.
    pub fn new() -> Self {
        let mut engine = Self::empty();
        engine.register(Box::new(RestrictedInventorySaver));
        engine.register(Box::new(CharacterProfileSaver));
        engine.register(Box::new(PresenceSaver));
        engine
    }

    /// Engine with no savers.
    pub fn empty() -> Self {
        Self {
            savers: BTreeMap::new(),
        }
    }

    /// Register a saver, returning the one it replaced.
    pub fn register(&mut self, saver: Box<dyn ComponentSaver>) -> Option<Box<dyn ComponentSaver>> {
        self.savers.insert(saver.tag(), saver)
    }

    fn saver(&self, tag: ComponentTag) -> Result<&dyn ComponentSaver, SnapshotError> {
        self.savers
            .get(&tag)
            .map(|s| s.as_ref())
            .ok_or(SnapshotError::UnregisteredTag(tag))
    }

    // -------------------------------------------------------------------------
    // Value level
    // -------------------------------------------------------------------------

    /// Fields of `live` that differ from `template`; `None` if identical.
    pub fn diff(
        &self,
        template: &ComponentData,
        live: &ComponentData,
        mapper: &mut EntityMapper,
    ) -> Result<Option<ComponentSnapshot>, SnapshotError> {
        if template.tag() != live.tag() {
            return Err(SnapshotError::TagMismatch {
                expected: template.tag(),
                found: live.tag(),
            });
        }
        self.saver(live.tag())?.diff(template, live, mapper)
    }

    /// Every field of `live`.
    pub fn save(
        &self,
        live: &ComponentData,
        mapper: &mut EntityMapper,
    ) -> Result<ComponentSnapshot, SnapshotError> {
        self.saver(live.tag())?.save(live, mapper)
    }

    /// Present fields of `snapshot` written over `base`.
    pub fn apply(
        &self,
        snapshot: &ComponentSnapshot,
        base: ComponentData,
        loaded: &[ObjectRef],
    ) -> Result<ComponentData, SnapshotError> {
        self.saver(snapshot.tag())?.apply(snapshot, base, loaded)
    }

    // -------------------------------------------------------------------------
    // Object level
    // -------------------------------------------------------------------------

    /// Save one component of `live` in full.
    pub fn save_object(
        &self,
        world: &dyn World,
        live: ObjectRef,
        tag: ComponentTag,
        mapper: &mut EntityMapper,
    ) -> Result<ComponentSnapshot, SnapshotError> {
        let live_data = read_required(world, live, tag)?;
        self.save(&live_data, mapper)
    }

    /// Apply a snapshot to an object.
    ///
    /// The base is the target's current component if it has one; otherwise
    /// the template's component, otherwise the saver's default.
    pub fn apply_to_object(
        &self,
        world: &mut dyn World,
        snapshot: &ComponentSnapshot,
        target: ObjectRef,
        template: Option<ObjectRef>,
        loaded: &[ObjectRef],
    ) -> Result<(), SnapshotError> {
        if !world.exists(target) {
            return Err(SnapshotError::ObjectNotFound(target));
        }
        let tag = snapshot.tag();
        let saver = self.saver(tag)?;

        let base = world
            .read_component(target, tag)
            .or_else(|| template.and_then(|t| world.read_component(t, tag)))
            .unwrap_or_else(|| saver.default_data());

        let data = saver.apply(snapshot, base, loaded)?;
        if !world.write_component(target, data) {
            return Err(SnapshotError::ObjectNotFound(target));
        }
        Ok(())
    }

    /// Capture a set of objects.
    ///
    /// Components the template also carries are diffed against it; the rest
    /// are saved in full. Objects that vanished are skipped.
    pub fn capture_objects(
        &self,
        world: &dyn World,
        objects: &[ObjectRef],
        template: Option<ObjectRef>,
    ) -> ObjectSetSnapshot {
        let mut present = Vec::with_capacity(objects.len());
        for object in objects {
            if !world.exists(*object) {
                warn!(%object, "object vanished before capture, skipping");
            } else if !present.contains(object) {
                present.push(*object);
            }
        }

        let mut mapper = EntityMapper::from_objects(present.iter().copied());
        let mut saved = Vec::with_capacity(present.len());

        for object in &present {
            let Some(index) = mapper.try_index(*object) else {
                continue;
            };

            let mut components = Vec::new();
            for tag in self.savers.keys().copied() {
                let Some(live) = world.read_component(*object, tag) else {
                    continue;
                };
                let template_data = template.and_then(|t| world.read_component(t, tag));
                let result = match &template_data {
                    Some(template_data) => self.diff(template_data, &live, &mut mapper),
                    None => self.save(&live, &mut mapper).map(Some),
                };
                match result {
                    Ok(Some(snapshot)) => components.push(snapshot),
                    Ok(None) => {}
                    Err(err) => warn!(%object, %tag, error = %err, "component capture failed"),
                }
            }

            saved.push(ObjectSnapshot {
                index,
                position: world.position(*object),
                components,
            });
        }

        let external = mapper
            .to_vec()
            .into_iter()
            .skip(present.len() + 1)
            .collect();

        debug!(objects = saved.len(), "captured object set");
        ObjectSetSnapshot {
            objects: saved,
            external,
            captured_at: Utc::now(),
        }
    }

    /// Recreate a captured object set as new world objects.
    ///
    /// Returns the new handles in snapshot order. References between objects
    /// in the set are remapped to the new handles; external references are
    /// kept as captured.
    pub fn replay(
        &self,
        world: &mut dyn World,
        snapshot: &ObjectSetSnapshot,
        template: Option<ObjectRef>,
    ) -> Result<Vec<ObjectRef>, SnapshotError> {
        let slots = snapshot
            .objects
            .iter()
            .map(|o| o.index as usize)
            .max()
            .unwrap_or(0);

        let mut loaded = vec![ObjectRef::NULL; slots + 1];
        let mut created = Vec::with_capacity(snapshot.objects.len());
        for saved in &snapshot.objects {
            let object = world.create();
            if let Some(position) = saved.position {
                world.set_position(object, position);
            }
            loaded[saved.index as usize] = object;
            created.push(object);
        }
        loaded.extend(snapshot.external.iter().copied());

        for (saved, object) in snapshot.objects.iter().zip(&created) {
            for component in &saved.components {
                self.apply_to_object(world, component, *object, template, &loaded)?;
            }
        }

        debug!(objects = created.len(), "replayed object set");
        Ok(created)
    }
}

fn read_required(
    world: &dyn World,
    object: ObjectRef,
    tag: ComponentTag,
) -> Result<ComponentData, SnapshotError> {
    if !world.exists(object) {
        return Err(SnapshotError::ObjectNotFound(object));
    }
    world
        .read_component(object, tag)
        .ok_or(SnapshotError::MissingComponent { object, tag })
}
