//! Fixed-capacity keyed history
//!
//! Upsert-by-key into an insertion-ordered buffer; when an insert would
//! exceed capacity the oldest entries are evicted.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// An entry with a unique bucket key (a date, an ISO week)
pub trait Keyed {
    type Key: PartialEq + Clone;

    fn key(&self) -> &Self::Key;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoundedHistory<T, const N: usize> {
    entries: VecDeque<T>,
}

impl<T, const N: usize> Default for BoundedHistory<T, N> {
    fn default() -> Self {
        Self {
            entries: VecDeque::with_capacity(N),
        }
    }
}

impl<T: Keyed, const N: usize> BoundedHistory<T, N> {
    pub const CAPACITY: usize = N;

    pub fn get(&self, key: &T::Key) -> Option<&T> {
        self.entries.iter().find(|e| e.key() == key)
    }

    /// Replace the entry with the same key in place, or append and evict
    pub fn upsert(&mut self, item: T) {
        if let Some(slot) = self.entries.iter_mut().find(|e| e.key() == item.key()) {
            *slot = item;
            return;
        }
        self.push_evicting(item);
    }

    /// Mutate the entry for `key`, creating it with `init` if absent
    pub fn update_or_insert<F>(&mut self, key: &T::Key, init: impl FnOnce() -> T, f: F)
    where
        F: FnOnce(&mut T),
    {
        if let Some(slot) = self.entries.iter_mut().find(|e| e.key() == key) {
            f(slot);
            return;
        }
        let mut item = init();
        f(&mut item);
        self.push_evicting(item);
    }

    fn push_evicting(&mut self, item: T) {
        self.entries.push_back(item);
        while self.entries.len() > N {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    /// Most recent first, at most `n`
    pub fn latest(&self, n: usize) -> Vec<&T> {
        self.entries.iter().rev().take(n).collect()
    }
}
