//! Key Link Module
//!
//! Tracks which cached keys depend on each other so that invalidating one
//! also invalidates the rest. A conversation's member list, for instance, is
//! linked to the per-member keys derived from it.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::cache::ShardSelector;

type Links = HashMap<String, HashSet<String>>;

// == Link Index ==
/// Slot-sharded, bidirectional key association map.
///
/// An index with zero slots is disabled: `link` does nothing and `take`
/// always comes back empty.
pub struct LinkIndex {
    selector: ShardSelector,
    slots: Vec<Mutex<Links>>,
}

impl LinkIndex {
    /// Creates an index with `slot_num` slots; zero disables it.
    pub fn new(slot_num: usize) -> Self {
        Self {
            selector: ShardSelector::new(slot_num),
            slots: (0..slot_num).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    /// Returns false for an index created with zero slots.
    pub fn is_enabled(&self) -> bool {
        !self.slots.is_empty()
    }

    fn slot(&self, key: &str) -> &Mutex<Links> {
        &self.slots[self.selector.shard_for_key(key)]
    }

    // == Link ==
    /// Associates `key` with each of `links`, in both directions.
    pub fn link(&self, key: &str, links: &[String]) {
        if !self.is_enabled() {
            return;
        }
        for other in links.iter().filter(|other| other.as_str() != key) {
            self.slot(key)
                .lock()
                .entry(key.to_string())
                .or_default()
                .insert(other.clone());
            self.slot(other)
                .lock()
                .entry(other.clone())
                .or_default()
                .insert(key.to_string());
        }
    }

    // == Take ==
    /// Removes every association reachable from `key` and returns the keys
    /// reached, excluding `key` itself.
    ///
    /// Slots are locked one at a time, never two at once.
    pub fn take(&self, key: &str) -> HashSet<String> {
        let mut reached = HashSet::new();
        if !self.is_enabled() {
            return reached;
        }

        let mut pending = vec![key.to_string()];
        let mut visited = HashSet::new();
        while let Some(current) = pending.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let Some(neighbours) = self.slot(&current).lock().remove(&current) else {
                continue;
            };
            for next in neighbours {
                if next != key {
                    reached.insert(next.clone());
                }
                pending.push(next);
            }
        }
        reached
    }

    /// Number of keys with at least one association.
    pub fn len(&self) -> usize {
        self.slots.iter().map(|slot| slot.lock().len()).sum()
    }

    /// Returns true if no key has an association.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
