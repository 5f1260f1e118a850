use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use crate::debugger::id::Id;

const INITIAL_REAP_THRESHOLD: usize = 32;

/// Id-keyed registry that does not extend entity lifetime.
///
/// The owner of an entity is whatever structure logically contains it (a
/// thread owns its frames, a frame its scopes); the map only resolves lookups
/// while the owner keeps the entity alive. Expired entries are reaped lazily
/// once the map outgrows a doubling threshold, which bounds memory without
/// a sweep on every insert.
pub struct WeakMap<T> {
    map: BTreeMap<Id<T>, Weak<T>>,
    reap_at: usize,
}

impl<T> WeakMap<T> {
    pub fn new() -> WeakMap<T> {
        WeakMap {
            map: BTreeMap::new(),
            reap_at: INITIAL_REAP_THRESHOLD,
        }
    }

    /// Resolve an id to the entity, if it is still alive.
    pub fn get(&self, id: Id<T>) -> Option<Arc<T>> {
        self.map.get(&id).and_then(Weak::upgrade)
    }

    pub fn add(&mut self, id: Id<T>, value: &Arc<T>) {
        if self.map.len() > self.reap_at {
            self.reap();
            self.reap_at = self.map.len() * 2 + INITIAL_REAP_THRESHOLD;
        }
        self.map.insert(id, Arc::downgrade(value));
    }

    pub fn remove(&mut self, id: Id<T>) {
        self.map.remove(&id);
    }

    /// Snapshot of every entity still alive, in id order.
    pub fn live(&self) -> Vec<Arc<T>> {
        self.map.values().filter_map(Weak::upgrade).collect()
    }

    fn reap(&mut self) {
        self.map.retain(|_, weak| weak.strong_count() > 0);
    }

    #[cfg(test)]
    fn raw_len(&self) -> usize {
        self.map.len()
    }
}

impl<T> Default for WeakMap<T> {
    fn default() -> Self {
        WeakMap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_follows_lifetime() {
        let mut map = WeakMap::new();
        let id = Id::new(1);
        let value = Arc::new(17u32);
        map.add(id, &value);

        assert_eq!(map.get(id).as_deref(), Some(&17));
        drop(value);
        assert!(map.get(id).is_none());
    }

    #[test]
    fn live_skips_dropped_entries() {
        let mut map = WeakMap::new();
        let kept = Arc::new(1u32);
        let dropped = Arc::new(2u32);
        map.add(Id::new(1), &kept);
        map.add(Id::new(2), &dropped);
        drop(dropped);

        let live = map.live();
        assert_eq!(live.len(), 1);
        assert_eq!(*live[0], 1);
    }

    #[test]
    fn reap_bounds_expired_entries() {
        let mut map = WeakMap::new();
        for n in 0..100 {
            let value = Arc::new(n);
            map.add(Id::new(n), &value);
            // value dropped immediately, entry expires
        }
        // A reap must have run at least once while inserting 100 expired
        // entries with the initial threshold of 32.
        assert!(map.raw_len() < 100);
    }

    #[test]
    fn remove_discards_entry() {
        let mut map = WeakMap::new();
        let value = Arc::new(5u32);
        map.add(Id::new(5), &value);
        map.remove(Id::new(5));
        assert!(map.get(Id::new(5)).is_none());
    }
}
