//! Per-component savers.
//!
//! Each saver knows how to diff two values of its component against each
//! other, capture one in full, and write a sparse record back onto a base
//! value. Save records store every field as an `Option`; an absent field
//! means "keep whatever the base value has".

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::components::{
    BloodType, CharacterProfile, Component, ComponentData, ComponentTag, ItemCategory, Presence,
    PresenceState, PrefabGuid, RestrictedInventory,
};
use super::mapper::EntityMapper;
use super::{ComponentSnapshot, SnapshotError};
use crate::world::ObjectRef;

/// Save/diff/apply for a single component type.
pub trait ComponentSaver: Send + Sync {
    fn tag(&self) -> ComponentTag;

    /// Value used for a newly created target when no template is available.
    fn default_data(&self) -> ComponentData;

    /// Sparse record of fields where `live` differs from `template`, or
    /// `None` if nothing differs.
    fn diff(
        &self,
        template: &ComponentData,
        live: &ComponentData,
        mapper: &mut EntityMapper,
    ) -> Result<Option<ComponentSnapshot>, SnapshotError>;

    /// Record with every field present.
    fn save(
        &self,
        live: &ComponentData,
        mapper: &mut EntityMapper,
    ) -> Result<ComponentSnapshot, SnapshotError>;

    /// Write the present fields of `snapshot` over `base`.
    ///
    /// `loaded` maps mapper indices to the objects being restored.
    fn apply(
        &self,
        snapshot: &ComponentSnapshot,
        base: ComponentData,
        loaded: &[ObjectRef],
    ) -> Result<ComponentData, SnapshotError>;
}

fn downcast<T: Component>(data: &ComponentData) -> Result<&T, SnapshotError> {
    T::from_data_ref(data).ok_or(SnapshotError::TagMismatch {
        expected: T::TAG,
        found: data.tag(),
    })
}

fn downcast_owned<T: Component>(data: ComponentData) -> Result<T, SnapshotError> {
    let found = data.tag();
    T::from_data(data).ok_or(SnapshotError::TagMismatch {
        expected: T::TAG,
        found,
    })
}

fn resolve_index(index: u32, loaded: &[ObjectRef]) -> ObjectRef {
    match loaded.get(index as usize) {
        Some(object) => *object,
        None => {
            warn!(index, loaded = loaded.len(), "object index out of range, using null");
            ObjectRef::NULL
        }
    }
}

// =============================================================================
// RestrictedInventory
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictedInventorySave {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_type: Option<PrefabGuid>,
    /// Raw category code, validated on apply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<i32>,
}

#[derive(Debug, Default)]
pub struct RestrictedInventorySaver;

impl ComponentSaver for RestrictedInventorySaver {
    fn tag(&self) -> ComponentTag {
        ComponentTag::RestrictedInventory
    }

    fn default_data(&self) -> ComponentData {
        RestrictedInventory::default().into_data()
    }

    fn diff(
        &self,
        template: &ComponentData,
        live: &ComponentData,
        _mapper: &mut EntityMapper,
    ) -> Result<Option<ComponentSnapshot>, SnapshotError> {
        let template = downcast::<RestrictedInventory>(template)?;
        let live = downcast::<RestrictedInventory>(live)?;

        let mut save = RestrictedInventorySave::default();
        let mut changed = false;

        if template.item_type != live.item_type {
            save.item_type = Some(live.item_type);
            changed = true;
        }
        if template.category != live.category {
            save.category = Some(live.category.code());
            changed = true;
        }

        Ok(changed.then_some(ComponentSnapshot::RestrictedInventory(save)))
    }

    fn save(
        &self,
        live: &ComponentData,
        _mapper: &mut EntityMapper,
    ) -> Result<ComponentSnapshot, SnapshotError> {
        let live = downcast::<RestrictedInventory>(live)?;
        Ok(ComponentSnapshot::RestrictedInventory(RestrictedInventorySave {
            item_type: Some(live.item_type),
            category: Some(live.category.code()),
        }))
    }

    fn apply(
        &self,
        snapshot: &ComponentSnapshot,
        base: ComponentData,
        _loaded: &[ObjectRef],
    ) -> Result<ComponentData, SnapshotError> {
        let ComponentSnapshot::RestrictedInventory(save) = snapshot else {
            return Err(SnapshotError::TagMismatch {
                expected: self.tag(),
                found: snapshot.tag(),
            });
        };
        let mut data = downcast_owned::<RestrictedInventory>(base)?;

        if let Some(item_type) = save.item_type {
            data.item_type = item_type;
        }
        if let Some(code) = save.category {
            data.category = ItemCategory::parse_or_default(code);
        }

        debug!(item_type = data.item_type.0, category = data.category.code(), "applied restricted inventory");
        Ok(data.into_data())
    }
}

// =============================================================================
// CharacterProfile
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterProfileSave {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blood_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blood_quality: Option<f32>,
}

#[derive(Debug, Default)]
pub struct CharacterProfileSaver;

impl CharacterProfileSaver {
    fn valid_quality(quality: f32) -> f32 {
        if quality.is_finite() && (0.0..=100.0).contains(&quality) {
            quality
        } else {
            warn!(quality, "blood quality out of range, using default");
            0.0
        }
    }
}

impl ComponentSaver for CharacterProfileSaver {
    fn tag(&self) -> ComponentTag {
        ComponentTag::CharacterProfile
    }

    fn default_data(&self) -> ComponentData {
        CharacterProfile::default().into_data()
    }

    fn diff(
        &self,
        template: &ComponentData,
        live: &ComponentData,
        _mapper: &mut EntityMapper,
    ) -> Result<Option<ComponentSnapshot>, SnapshotError> {
        let template = downcast::<CharacterProfile>(template)?;
        let live = downcast::<CharacterProfile>(live)?;

        let save = CharacterProfileSave {
            name: (template.name != live.name).then(|| live.name.clone()),
            blood_type: (template.blood_type != live.blood_type)
                .then(|| live.blood_type.as_str().to_string()),
            blood_quality: (template.blood_quality().to_bits()
                != live.blood_quality().to_bits())
            .then_some(live.blood_quality()),
        };

        if save == CharacterProfileSave::default() {
            return Ok(None);
        }
        Ok(Some(ComponentSnapshot::CharacterProfile(save)))
    }

    fn save(
        &self,
        live: &ComponentData,
        _mapper: &mut EntityMapper,
    ) -> Result<ComponentSnapshot, SnapshotError> {
        let live = downcast::<CharacterProfile>(live)?;
        Ok(ComponentSnapshot::CharacterProfile(CharacterProfileSave {
            name: Some(live.name.clone()),
            blood_type: Some(live.blood_type.as_str().to_string()),
            blood_quality: Some(live.blood_quality()),
        }))
    }

    fn apply(
        &self,
        snapshot: &ComponentSnapshot,
        base: ComponentData,
        _loaded: &[ObjectRef],
    ) -> Result<ComponentData, SnapshotError> {
        let ComponentSnapshot::CharacterProfile(save) = snapshot else {
            return Err(SnapshotError::TagMismatch {
                expected: self.tag(),
                found: snapshot.tag(),
            });
        };
        let mut data = downcast_owned::<CharacterProfile>(base)?;

        if let Some(name) = &save.name {
            data.name = name.clone();
        }
        if let Some(blood_type) = &save.blood_type {
            data.blood_type = BloodType::parse_or_default(blood_type);
        }
        if let Some(quality) = save.blood_quality {
            data.set_blood_quality(Self::valid_quality(quality));
        }

        Ok(data.into_data())
    }
}

// =============================================================================
// Presence
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceSave {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Mapper index of the owning object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<u32>,
}

#[derive(Debug, Default)]
pub struct PresenceSaver;

impl ComponentSaver for PresenceSaver {
    fn tag(&self) -> ComponentTag {
        ComponentTag::Presence
    }

    fn default_data(&self) -> ComponentData {
        Presence::default().into_data()
    }

    fn diff(
        &self,
        template: &ComponentData,
        live: &ComponentData,
        mapper: &mut EntityMapper,
    ) -> Result<Option<ComponentSnapshot>, SnapshotError> {
        let template = downcast::<Presence>(template)?;
        let live = downcast::<Presence>(live)?;

        let save = PresenceSave {
            state: (template.state != live.state).then(|| live.state.as_str().to_string()),
            owner: (template.owner != live.owner).then(|| mapper.index_of(live.owner)),
        };

        if save == PresenceSave::default() {
            return Ok(None);
        }
        Ok(Some(ComponentSnapshot::Presence(save)))
    }

    fn save(
        &self,
        live: &ComponentData,
        mapper: &mut EntityMapper,
    ) -> Result<ComponentSnapshot, SnapshotError> {
        let live = downcast::<Presence>(live)?;
        Ok(ComponentSnapshot::Presence(PresenceSave {
            state: Some(live.state.as_str().to_string()),
            owner: Some(mapper.index_of(live.owner)),
        }))
    }

    fn apply(
        &self,
        snapshot: &ComponentSnapshot,
        base: ComponentData,
        loaded: &[ObjectRef],
    ) -> Result<ComponentData, SnapshotError> {
        let ComponentSnapshot::Presence(save) = snapshot else {
            return Err(SnapshotError::TagMismatch {
                expected: self.tag(),
                found: snapshot.tag(),
            });
        };
        let mut data = downcast_owned::<Presence>(base)?;

        if let Some(state) = &save.state {
            data.state = PresenceState::parse_or_default(state);
        }
        if let Some(owner) = save.owner {
            data.owner = resolve_index(owner, loaded);
        }

        Ok(data.into_data())
    }
}
