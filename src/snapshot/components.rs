//! Component types understood by the snapshot engine.
//!
//! Every component is a plain struct plus a variant in [`ComponentData`].
//! Enumerated fields carry a `parse_or_default` conversion so that a corrupt
//! stored value degrades to the type default instead of failing a restore.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::world::{ObjectRef, World};

/// Type tag identifying a component kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentTag {
    RestrictedInventory,
    CharacterProfile,
    Presence,
}

impl ComponentTag {
    /// All tags in capture order.
    pub const ALL: [ComponentTag; 3] = [
        ComponentTag::RestrictedInventory,
        ComponentTag::CharacterProfile,
        ComponentTag::Presence,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RestrictedInventory => "restricted_inventory",
            Self::CharacterProfile => "character_profile",
            Self::Presence => "presence",
        }
    }
}

impl fmt::Display for ComponentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live component value, one variant per component type.
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentData {
    RestrictedInventory(RestrictedInventory),
    CharacterProfile(CharacterProfile),
    Presence(Presence),
}

impl ComponentData {
    pub fn tag(&self) -> ComponentTag {
        match self {
            Self::RestrictedInventory(_) => ComponentTag::RestrictedInventory,
            Self::CharacterProfile(_) => ComponentTag::CharacterProfile,
            Self::Presence(_) => ComponentTag::Presence,
        }
    }
}

/// Typed access to a [`ComponentData`] variant.
pub trait Component: Sized {
    const TAG: ComponentTag;

    fn from_data(data: ComponentData) -> Option<Self>;

    fn from_data_ref(data: &ComponentData) -> Option<&Self>;

    fn into_data(self) -> ComponentData;
}

macro_rules! impl_component {
    ($ty:ident) => {
        impl Component for $ty {
            const TAG: ComponentTag = ComponentTag::$ty;

            fn from_data(data: ComponentData) -> Option<Self> {
                match data {
                    ComponentData::$ty(value) => Some(value),
                    _ => None,
                }
            }

            fn from_data_ref(data: &ComponentData) -> Option<&Self> {
                match data {
                    ComponentData::$ty(value) => Some(value),
                    _ => None,
                }
            }

            fn into_data(self) -> ComponentData {
                ComponentData::$ty(self)
            }
        }
    };
}

impl_component!(RestrictedInventory);
impl_component!(CharacterProfile);
impl_component!(Presence);

/// Read a typed component from the world.
pub fn read_component<T: Component>(world: &dyn World, object: ObjectRef) -> Option<T> {
    world
        .read_component(object, T::TAG)
        .and_then(T::from_data)
}

/// Write a typed component to the world.
pub fn write_component<T: Component>(world: &mut dyn World, object: ObjectRef, value: T) -> bool {
    world.write_component(object, value.into_data())
}

// =============================================================================
// Enumerated fields
// =============================================================================

/// Item category an inventory slot is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ItemCategory {
    #[default]
    None,
    Weapon,
    Armor,
    Consumable,
    Resource,
    Jewel,
}

impl ItemCategory {
    pub fn code(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Weapon => 1,
            Self::Armor => 2,
            Self::Consumable => 4,
            Self::Resource => 8,
            Self::Jewel => 16,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Weapon),
            2 => Some(Self::Armor),
            4 => Some(Self::Consumable),
            8 => Some(Self::Resource),
            16 => Some(Self::Jewel),
            _ => None,
        }
    }

    /// Convert a stored code, falling back to the default for unknown values.
    pub fn parse_or_default(code: i32) -> Self {
        Self::from_code(code).unwrap_or_else(|| {
            warn!(code, "invalid item category, using default");
            Self::default()
        })
    }
}

/// Blood type of a character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BloodType {
    #[default]
    None,
    Rogue,
    Warrior,
    Scholar,
    Brute,
    Creature,
    Worker,
}

impl BloodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Rogue => "rogue",
            Self::Warrior => "warrior",
            Self::Scholar => "scholar",
            Self::Brute => "brute",
            Self::Creature => "creature",
            Self::Worker => "worker",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "rogue" => Some(Self::Rogue),
            "warrior" => Some(Self::Warrior),
            "scholar" => Some(Self::Scholar),
            "brute" => Some(Self::Brute),
            "creature" => Some(Self::Creature),
            "worker" => Some(Self::Worker),
            _ => None,
        }
    }

    /// Case-insensitive parse, falling back to the default.
    pub fn parse_or_default(name: &str) -> Self {
        Self::from_name(name).unwrap_or_else(|| {
            warn!(value = %name, "invalid blood type, using default");
            Self::default()
        })
    }
}

/// Whether a persona is currently present in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PresenceState {
    #[default]
    Active,
    Frozen,
    Hidden,
}

impl PresenceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Frozen => "frozen",
            Self::Hidden => "hidden",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "frozen" => Some(Self::Frozen),
            "hidden" => Some(Self::Hidden),
            _ => None,
        }
    }

    pub fn parse_or_default(name: &str) -> Self {
        Self::from_name(name).unwrap_or_else(|| {
            warn!(value = %name, "invalid presence state, using default");
            Self::default()
        })
    }
}

// =============================================================================
// Components
// =============================================================================

/// Opaque game prefab identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PrefabGuid(pub i32);

/// Inventory slot restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RestrictedInventory {
    pub item_type: PrefabGuid,
    pub category: ItemCategory,
}

/// Character data carried by each persona.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CharacterProfile {
    pub name: String,
    pub blood_type: BloodType,
    blood_quality: f32,
}

impl CharacterProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_blood(name: impl Into<String>, blood_type: BloodType, blood_quality: f32) -> Self {
        let mut profile = Self {
            name: name.into(),
            blood_type,
            blood_quality: 0.0,
        };
        profile.set_blood_quality(blood_quality);
        profile
    }

    /// Always within 0..=100.
    pub fn blood_quality(&self) -> f32 {
        self.blood_quality
    }

    /// Clamped into 0..=100; NaN becomes 0.
    pub fn set_blood_quality(&mut self, quality: f32) {
        self.blood_quality = if quality.is_nan() {
            0.0
        } else {
            quality.clamp(0.0, 100.0)
        };
    }
}

/// Presence of a persona in the world and the object it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Presence {
    pub state: PresenceState,
    pub owner: ObjectRef,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_category_codes() {
        for category in [
            ItemCategory::None,
            ItemCategory::Weapon,
            ItemCategory::Armor,
            ItemCategory::Consumable,
            ItemCategory::Resource,
            ItemCategory::Jewel,
        ] {
            assert_eq!(ItemCategory::from_code(category.code()), Some(category));
        }
        assert_eq!(ItemCategory::parse_or_default(3), ItemCategory::None);
        assert_eq!(ItemCategory::parse_or_default(-1), ItemCategory::None);
        assert_eq!(ItemCategory::parse_or_default(16), ItemCategory::Jewel);
    }

    #[test]
    fn test_blood_type_parse() {
        assert_eq!(BloodType::parse_or_default("Rogue"), BloodType::Rogue);
        assert_eq!(BloodType::parse_or_default(" WORKER "), BloodType::Worker);
        assert_eq!(BloodType::parse_or_default("dragon"), BloodType::None);
    }

    #[test]
    fn test_presence_state_parse() {
        assert_eq!(PresenceState::parse_or_default("frozen"), PresenceState::Frozen);
        assert_eq!(PresenceState::parse_or_default("asleep"), PresenceState::Active);
    }

    #[test]
    fn test_component_downcast() {
        let data = CharacterProfile::new("Bob").into_data();
        assert_eq!(data.tag(), ComponentTag::CharacterProfile);
        assert!(Presence::from_data_ref(&data).is_none());
        assert_eq!(
            CharacterProfile::from_data(data).map(|p| p.name),
            Some("Bob".to_string())
        );
    }
}
