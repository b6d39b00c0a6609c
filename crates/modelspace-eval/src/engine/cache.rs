//! Result caches.
//!
//! * [`CacheStore`] - per-cells table of computed results and explicit
//!   inputs, keyed by argument tuple.
//! * [`InstanceTable`] - per-parameterized-space table of live instances.

use modelspace_common::{SpaceId, Value};
use rustc_hash::FxHashMap;

use super::node::ArgKey;

#[derive(Debug, Default)]
pub(crate) struct CacheStore {
    values: FxHashMap<ArgKey, Value>,
    inputs: FxHashMap<ArgKey, Value>,
}

impl CacheStore {
    /// Inputs shadow computed values.
    pub fn get(&self, key: &ArgKey) -> Option<&Value> {
        self.inputs.get(key).or_else(|| self.values.get(key))
    }

    /// Store a computed result. Rejected (returns `false`) when `key`
    /// carries an input.
    pub fn put(&mut self, key: ArgKey, value: Value) -> bool {
        if self.inputs.contains_key(&key) {
            return false;
        }
        self.values.insert(key, value);
        true
    }

    /// The override-setting path: replaces any computed value for `key`.
    pub fn set_input(&mut self, key: ArgKey, value: Value) -> Option<Value> {
        self.values.remove(&key);
        self.inputs.insert(key, value)
    }

    pub fn remove_input(&mut self, key: &ArgKey) -> Option<Value> {
        self.inputs.remove(key)
    }

    pub fn is_input(&self, key: &ArgKey) -> bool {
        self.inputs.contains_key(key)
    }

    pub fn has_value(&self, key: &ArgKey) -> bool {
        self.values.contains_key(key)
    }

    /// Remove a computed entry; inputs are definitions and stay.
    pub fn evict(&mut self, key: &ArgKey) -> bool {
        self.values.remove(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ArgKey> + '_ {
        self.values.keys()
    }

    pub fn inputs(&self) -> impl Iterator<Item = (&ArgKey, &Value)> + '_ {
        self.inputs.iter()
    }

    pub fn input_keys(&self) -> Vec<ArgKey> {
        self.inputs.keys().cloned().collect()
    }
}

/// Instances of one parameterized space by canonical argument tuple.
///
/// The table never keeps an instance alive by itself: liveness is decided by
/// the instance's anchor. Eviction by key always works, live or not.
#[derive(Debug, Default)]
pub(crate) struct InstanceTable {
    slots: FxHashMap<ArgKey, SpaceId>,
}

impl InstanceTable {
    pub fn get(&self, key: &ArgKey) -> Option<SpaceId> {
        self.slots.get(key).copied()
    }

    pub fn insert(&mut self, key: ArgKey, space: SpaceId) {
        self.slots.insert(key, space);
    }

    pub fn evict(&mut self, key: &ArgKey) -> Option<SpaceId> {
        self.slots.remove(key)
    }

    pub fn drain(&mut self) -> Vec<(ArgKey, SpaceId)> {
        self.slots.drain().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ArgKey, SpaceId)> + '_ {
        self.slots.iter().map(|(k, s)| (k, *s))
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
