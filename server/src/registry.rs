//! Identity → item lookup, populated at spawn and cleared at despawn.

use shared::{ObjectId, ScorableItem};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct ItemRegistry {
    items: HashMap<ObjectId, ScorableItem>,
}

impl ItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an item; returns false if the id is already taken.
    pub fn insert(&mut self, item: ScorableItem) -> bool {
        if self.items.contains_key(&item.id) {
            return false;
        }
        self.items.insert(item.id, item);
        true
    }

    pub fn get(&self, id: ObjectId) -> Option<&ScorableItem> {
        self.items.get(&id)
    }

    /// Flags an item as consumed. Returns the item only on the false→true transition.
    pub fn consume(&mut self, id: ObjectId) -> Option<ScorableItem> {
        let item = self.items.get_mut(&id)?;
        if item.consumed {
            return None;
        }
        item.consumed = true;
        Some(*item)
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<ScorableItem> {
        self.items.remove(&id)
    }

    pub fn ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self.items.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Items sorted by id.
    pub fn items(&self) -> Vec<ScorableItem> {
        let mut items: Vec<ScorableItem> = self.items.values().copied().collect();
        items.sort_by_key(|item| item.id);
        items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
