//! At-most-once commit tracking for mutating requests.
//!
//! The guard remembers every subject id committed during the current epoch
//! (one round). The first commit of an id wins; every later attempt within
//! the same epoch is a replay. Starting a new round opens a new epoch, after
//! which ids may be reused.

use std::collections::HashSet;
use std::hash::Hash;

#[derive(Debug)]
pub struct IdempotencyGuard<K> {
    committed: HashSet<K>,
    epoch: u64,
}

impl<K: Eq + Hash> IdempotencyGuard<K> {
    pub fn new() -> Self {
        Self {
            committed: HashSet::new(),
            epoch: 0,
        }
    }

    /// Records `subject` and returns true on its first commit in this epoch.
    ///
    /// Decisions for one guard are serialized by `&mut self`; callers sharing
    /// a guard across tasks wrap it in a lock, so exactly one of them sees true.
    pub fn try_commit(&mut self, subject: K) -> bool {
        self.committed.insert(subject)
    }

    pub fn is_committed(&self, subject: &K) -> bool {
        self.committed.contains(subject)
    }

    /// Forgets every commit and returns the new epoch number.
    pub fn new_epoch(&mut self) -> u64 {
        self.committed.clear();
        self.epoch += 1;
        self.epoch
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn len(&self) -> usize {
        self.committed.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.committed.is_empty()
    }
}

impl<K: Eq + Hash> Default for IdempotencyGuard<K> {
    fn default() -> Self {
        Self::new()
    }
}
