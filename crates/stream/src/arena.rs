use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use worldstream_common::ResourceKey;

struct Slot<T> {
    value: Arc<T>,
    refs: u32,
}

/// Keyed, reference-counted resource store.
///
/// The first `acquire` of a key stores the value; later acquires only bump
/// the count. The value is dropped when the last reference is released.
pub struct ResourceArena<T> {
    slots: HashMap<ResourceKey, Slot<T>>,
}

impl<T> Default for ResourceArena<T> {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }
}

impl<T> ResourceArena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a reference to `key`, storing `make()` if absent.
    /// Returns `true` if the value was newly stored.
    pub fn acquire(&mut self, key: ResourceKey, make: impl FnOnce() -> Arc<T>) -> bool {
        match self.slots.entry(key) {
            Entry::Occupied(mut slot) => {
                slot.get_mut().refs += 1;
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(Slot {
                    value: make(),
                    refs: 1,
                });
                true
            }
        }
    }

    /// Drop one reference to `key`. Returns `true` if the value was freed.
    ///
    /// # Panics
    /// If `key` holds no references.
    pub fn release(&mut self, key: ResourceKey) -> bool {
        let Entry::Occupied(mut slot) = self.slots.entry(key) else {
            panic!("released {key:?} with no outstanding references");
        };
        slot.get_mut().refs -= 1;
        if slot.get().refs == 0 {
            slot.remove();
            true
        } else {
            false
        }
    }

    pub fn refcount(&self, key: ResourceKey) -> u32 {
        self.slots.get(&key).map_or(0, |s| s.refs)
    }

    pub fn get(&self, key: ResourceKey) -> Option<&Arc<T>> {
        self.slots.get(&key).map(|s| &s.value)
    }

    pub fn values(&self) -> impl Iterator<Item = &Arc<T>> + '_ {
        self.slots.values().map(|s| &s.value)
    }

    pub fn contains(&self, key: ResourceKey) -> bool {
        self.slots.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
