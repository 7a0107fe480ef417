//! World collaborator.
//!
//! The core never owns game objects. Everything it knows about the live world
//! goes through the [`World`] trait: liveness and position queries plus
//! component reads and writes. Handles are versioned, so a slot that was
//! destroyed and reused later is reported as gone rather than silently
//! pointing at a different object.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::snapshot::{ComponentData, ComponentTag};

/// A position in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Vec3) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Component-wise scale.
    pub fn scale(&self, factor: f32) -> Vec3 {
        Vec3::new(self.x * factor, self.y * factor, self.z * factor)
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1}, {:.1})", self.x, self.y, self.z)
    }
}

/// Transient handle to an in-world object.
///
/// Index 0 is never handed out; [`ObjectRef::NULL`] stands for "no object".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ObjectRef {
    pub index: u32,
    pub version: u32,
}

impl ObjectRef {
    pub const NULL: ObjectRef = ObjectRef {
        index: 0,
        version: 0,
    };

    pub const fn new(index: u32, version: u32) -> Self {
        Self { index, version }
    }

    pub fn is_null(&self) -> bool {
        self.index == 0
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Object(null)")
        } else {
            write!(f, "Object({}:{})", self.index, self.version)
        }
    }
}

/// Query/mutation surface of the live world.
///
/// Implementations report vanished objects through `false`/`None` rather
/// than panicking; callers treat that as "not found".
pub trait World {
    fn exists(&self, object: ObjectRef) -> bool;

    fn position(&self, object: ObjectRef) -> Option<Vec3>;

    fn set_position(&mut self, object: ObjectRef, position: Vec3) -> bool;

    fn read_component(&self, object: ObjectRef, tag: ComponentTag) -> Option<ComponentData>;

    /// Write (or add) a component. Returns false if the object is gone.
    fn write_component(&mut self, object: ObjectRef, data: ComponentData) -> bool;

    fn has_component(&self, object: ObjectRef, tag: ComponentTag) -> bool {
        self.read_component(object, tag).is_some()
    }

    fn create(&mut self) -> ObjectRef;

    fn destroy(&mut self, object: ObjectRef) -> bool;
}

#[derive(Debug, Clone, Default)]
struct Slot {
    version: u32,
    alive: bool,
    position: Vec3,
    components: HashMap<ComponentTag, ComponentData>,
}

/// In-memory world used by hosts without a game attached and by tests.
#[derive(Debug)]
pub struct MemoryWorld {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl Default for MemoryWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryWorld {
    pub fn new() -> Self {
        // Slot 0 backs the null handle and is never alive.
        Self {
            slots: vec![Slot::default()],
            free: Vec::new(),
        }
    }

    /// Create an object at a position.
    pub fn spawn_at(&mut self, position: Vec3) -> ObjectRef {
        let object = self.create();
        self.set_position(object, position);
        object
    }

    fn slot(&self, object: ObjectRef) -> Option<&Slot> {
        if object.is_null() {
            return None;
        }
        self.slots
            .get(object.index as usize)
            .filter(|s| s.alive && s.version == object.version)
    }

    fn slot_mut(&mut self, object: ObjectRef) -> Option<&mut Slot> {
        if object.is_null() {
            return None;
        }
        self.slots
            .get_mut(object.index as usize)
            .filter(|s| s.alive && s.version == object.version)
    }
}

impl World for MemoryWorld {
    fn exists(&self, object: ObjectRef) -> bool {
        self.slot(object).is_some()
    }

    fn position(&self, object: ObjectRef) -> Option<Vec3> {
        self.slot(object).map(|s| s.position)
    }

    fn set_position(&mut self, object: ObjectRef, position: Vec3) -> bool {
        match self.slot_mut(object) {
            Some(slot) => {
                slot.position = position;
                true
            }
            None => false,
        }
    }

    fn read_component(&self, object: ObjectRef, tag: ComponentTag) -> Option<ComponentData> {
        self.slot(object)
            .and_then(|s| s.components.get(&tag))
            .cloned()
    }

    fn write_component(&mut self, object: ObjectRef, data: ComponentData) -> bool {
        match self.slot_mut(object) {
            Some(slot) => {
                slot.components.insert(data.tag(), data);
                true
            }
            None => false,
        }
    }

    fn create(&mut self) -> ObjectRef {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.version += 1;
            slot.alive = true;
            slot.position = Vec3::ZERO;
            slot.components.clear();
            return ObjectRef::new(index, slot.version);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            version: 1,
            alive: true,
            ..Slot::default()
        });
        ObjectRef::new(index, 1)
    }

    fn destroy(&mut self, object: ObjectRef) -> bool {
        match self.slot_mut(object) {
            Some(slot) => {
                slot.alive = false;
                slot.components.clear();
                self.free.push(object.index);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{CharacterProfile, Component};

    #[test]
    fn test_create_and_destroy() {
        let mut world = MemoryWorld::new();
        let a = world.spawn_at(Vec3::new(1.0, 2.0, 3.0));

        assert!(world.exists(a));
        assert_eq!(world.position(a), Some(Vec3::new(1.0, 2.0, 3.0)));

        assert!(world.destroy(a));
        assert!(!world.exists(a));
        assert!(world.position(a).is_none());
        assert!(!world.destroy(a));
    }

    #[test]
    fn test_reused_slot_is_stale_for_old_handle() {
        let mut world = MemoryWorld::new();
        let a = world.create();
        world.destroy(a);

        let b = world.create();
        assert_eq!(a.index, b.index);
        assert_ne!(a.version, b.version);
        assert!(!world.exists(a));
        assert!(world.exists(b));
    }

    #[test]
    fn test_null_handle_never_exists() {
        let mut world = MemoryWorld::new();
        assert!(!world.exists(ObjectRef::NULL));
        assert!(!world.set_position(ObjectRef::NULL, Vec3::ZERO));
    }

    #[test]
    fn test_component_read_write() {
        let mut world = MemoryWorld::new();
        let a = world.create();
        let profile = CharacterProfile::new("Alice");

        assert!(!world.has_component(a, ComponentTag::CharacterProfile));
        assert!(world.write_component(a, profile.clone().into_data()));
        assert_eq!(
            world.read_component(a, ComponentTag::CharacterProfile),
            Some(profile.into_data())
        );
    }

    #[test]
    fn test_vec3_distance() {
        let a = Vec3::new(-1000.0, 5.0, -500.0);
        let b = Vec3::new(-1000.0, 5.0, -520.0);
        assert!((a.distance(&b) - 20.0).abs() < f32::EPSILON);
        assert_eq!(format!("{}", a), "(-1000.0, 5.0, -500.0)");
    }
}
