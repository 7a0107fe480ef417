//! Object reference mapping.
//!
//! Saved component data cannot hold raw [`ObjectRef`]s: the handles are only
//! meaningful for the lifetime of the objects they point at. The mapper turns
//! each handle into a stable logical index while saving, and on replay the
//! same indices are looked up in the list of freshly created objects.
//!
//! Index 0 is always the null object.

use std::collections::HashMap;
use std::fmt;

use crate::world::{ObjectRef, World};

#[derive(Debug, Clone)]
pub struct EntityMapper {
    lookup: HashMap<ObjectRef, u32>,
    objects: Vec<ObjectRef>,
}

impl Default for EntityMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityMapper {
    pub fn new() -> Self {
        let mut mapper = Self {
            lookup: HashMap::new(),
            objects: Vec::new(),
        };
        mapper.push_null();
        mapper
    }

    /// Mapper pre-seeded with objects at indices 1..=n, in order.
    pub fn from_objects<I>(objects: I) -> Self
    where
        I: IntoIterator<Item = ObjectRef>,
    {
        let mut mapper = Self::new();
        for object in objects {
            mapper.add(object);
        }
        mapper
    }

    fn push_null(&mut self) {
        self.lookup.insert(ObjectRef::NULL, 0);
        self.objects.push(ObjectRef::NULL);
    }

    /// Add an object, returning its index. Existing objects keep their index.
    pub fn add(&mut self, object: ObjectRef) -> u32 {
        if object.is_null() {
            return 0;
        }
        if let Some(index) = self.lookup.get(&object) {
            return *index;
        }
        let index = self.objects.len() as u32;
        self.lookup.insert(object, index);
        self.objects.push(object);
        index
    }

    /// Index of an object, adding it if unseen.
    pub fn index_of(&mut self, object: ObjectRef) -> u32 {
        self.add(object)
    }

    pub fn try_index(&self, object: ObjectRef) -> Option<u32> {
        self.lookup.get(&object).copied()
    }

    /// Object at an index, or null when out of range.
    pub fn get(&self, index: u32) -> ObjectRef {
        self.objects
            .get(index as usize)
            .copied()
            .unwrap_or(ObjectRef::NULL)
    }

    pub fn contains(&self, object: ObjectRef) -> bool {
        self.lookup.contains_key(&object)
    }

    /// Remove an object. Later indices shift down by one. The null object is
    /// never removed.
    pub fn remove(&mut self, object: ObjectRef) -> bool {
        if object.is_null() {
            return false;
        }
        let Some(index) = self.lookup.remove(&object) else {
            return false;
        };
        self.objects.remove(index as usize);
        for value in self.lookup.values_mut() {
            if *value > index {
                *value -= 1;
            }
        }
        true
    }

    /// Drop everything except the null object.
    pub fn clear(&mut self) {
        self.lookup.clear();
        self.objects.clear();
        self.push_null();
    }

    /// Total entries including the null object.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True when only the null object is present.
    pub fn is_empty(&self) -> bool {
        self.objects.len() <= 1
    }

    pub fn to_vec(&self) -> Vec<ObjectRef> {
        self.objects.clone()
    }

    pub fn statistics(&self, world: &dyn World) -> MapperStatistics {
        let mut stats = MapperStatistics {
            total: self.objects.len(),
            unique: self.lookup.len(),
            ..MapperStatistics::default()
        };
        for object in &self.objects {
            if object.is_null() {
                stats.null += 1;
            } else if world.exists(*object) {
                stats.live += 1;
            } else {
                stats.stale += 1;
            }
        }
        stats
    }
}

/// Counts reported by [`EntityMapper::statistics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapperStatistics {
    pub total: usize,
    pub null: usize,
    pub live: usize,
    pub stale: usize,
    pub unique: usize,
}

impl fmt::Display for MapperStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total={} live={} stale={} null={} unique={}",
            self.total, self.live, self.stale, self.null, self.unique
        )
    }
}
