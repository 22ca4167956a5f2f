use crate::access::AccessKey;
use std::collections::HashMap;

/// Vector clock over (thread, access kind) keys.
///
/// Counters start at 1 on the first access of a key and only ever grow by one
/// per access. Entries are never removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClockTable {
    counters: HashMap<AccessKey, u64>,
}

impl ClockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bump the counter for `key` and return its new value
    pub fn increment(&mut self, key: AccessKey) -> u64 {
        let counter = self.counters.entry(key).or_insert(0);
        *counter += 1;
        *counter
    }

    pub fn get(&self, key: &AccessKey) -> Option<u64> {
        self.counters.get(key).copied()
    }

    /// Overwrite a single entry (used for a thread's own snapshot entries)
    pub fn set(&mut self, key: AccessKey, counter: u64) {
        self.counters.insert(key, counter);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AccessKey, u64)> + '_ {
        self.counters.iter().map(|(key, counter)| (key, *counter))
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Total number of accesses recorded across all keys
    pub fn total(&self) -> u64 {
        self.counters.values().sum()
    }
}
