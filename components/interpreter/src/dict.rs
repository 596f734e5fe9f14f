//! Insertion-ordered dictionary storage

use std::collections::HashMap;

use crate::value::{HashKey, Value};

/// Insertion-ordered mapping used by script dicts
///
/// Removed entries leave a tombstone so iteration order stays stable; the
/// entry vector is compacted once tombstones outnumber live entries.
#[derive(Debug, Default, Clone)]
pub struct Dict {
    entries: Vec<Option<(Value, Value)>>,
    index: HashMap<HashKey, usize>,
}

impl Dict {
    /// Create an empty dict
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True if there are no entries
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Look up a value
    pub fn get(&self, key: &HashKey) -> Option<&Value> {
        let slot = *self.index.get(key)?;
        self.entries[slot].as_ref().map(|(_, v)| v)
    }

    /// True if the key is present
    pub fn contains(&self, key: &HashKey) -> bool {
        self.index.contains_key(key)
    }

    /// Insert or replace; an existing key keeps its position
    pub fn insert(&mut self, hash: HashKey, key: Value, value: Value) {
        if let Some(&slot) = self.index.get(&hash) {
            if let Some(entry) = self.entries[slot].as_mut() {
                entry.1 = value;
            }
            return;
        }
        self.index.insert(hash, self.entries.len());
        self.entries.push(Some((key, value)));
    }

    /// Remove an entry, returning its key and value
    pub fn remove(&mut self, hash: &HashKey) -> Option<(Value, Value)> {
        let slot = self.index.remove(hash)?;
        let removed = self.entries[slot].take();
        if self.entries.len() > 8 && self.index.len() * 2 < self.entries.len() {
            self.compact();
        }
        removed
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().flatten().map(|(k, v)| (k, v))
    }

    /// Keys in insertion order
    pub fn keys(&self) -> Vec<Value> {
        self.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Values in insertion order
    pub fn values(&self) -> Vec<Value> {
        self.iter().map(|(_, v)| v.clone()).collect()
    }

    fn compact(&mut self) {
        let live: Vec<(Value, Value)> = self.entries.drain(..).flatten().collect();
        let mut positions = HashMap::with_capacity(live.len());
        for (hash, slot) in self.index.drain() {
            positions.insert(slot, hash);
        }
        let mut old_slots: Vec<usize> = positions.keys().copied().collect();
        old_slots.sort_unstable();
        for (new_slot, old_slot) in old_slots.into_iter().enumerate() {
            if let Some(hash) = positions.remove(&old_slot) {
                self.index.insert(hash, new_slot);
            }
        }
        self.entries = live.into_iter().map(Some).collect();
    }
}
