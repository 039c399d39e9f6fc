//! The RFC 7541 §2.3 dynamic table: a FIFO of (name, value) entries in a
//! single index space with the 61-entry static table. Lookups are O(1)
//! amortized via auxiliary maps keyed on a monotonic insertion generation —
//! evicting the oldest entry only ever pops the front of that entry's own
//! generation queues, so nothing needs to be rescanned or renumbered when an
//! entry leaves.

use super::static_table::{self, STATIC_TABLE_LEN};
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};

struct DynEntry {
    name: Bytes,
    value: Bytes,
    generation: u64,
}

impl DynEntry {
    fn size(&self) -> usize {
        self.name.len() + self.value.len() + 32
    }
}

/// The combined static(1..=61) + dynamic(62..) address space HPACK indexing
/// addresses headers in.
pub struct Table {
    /// Oldest entry at the front, newest at the back.
    entries: VecDeque<DynEntry>,
    max_size: usize,
    current_size: usize,
    next_generation: u64,
    name_index: HashMap<Vec<u8>, VecDeque<u64>>,
    name_value_index: HashMap<Vec<u8>, HashMap<Vec<u8>, VecDeque<u64>>>,
}

impl Table {
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_size,
            current_size: 0,
            next_generation: 0,
            name_index: HashMap::new(),
            name_value_index: HashMap::new(),
        }
    }

    #[must_use]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fetch by unified 1-based wire index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<(&[u8], &[u8])> {
        if index == 0 {
            return None;
        }
        if index <= STATIC_TABLE_LEN {
            let (name, value) = static_table::STATIC_TABLE[index - 1];
            return Some((name.as_bytes(), value.as_bytes()));
        }
        let from_newest = index - STATIC_TABLE_LEN - 1;
        let len = self.entries.len();
        if from_newest >= len {
            return None;
        }
        let entry = &self.entries[len - 1 - from_newest];
        Some((&entry.name, &entry.value))
    }

    /// Lowest wire index whose name matches, static table searched first.
    #[must_use]
    pub fn find_name(&self, name: &[u8]) -> Option<usize> {
        if let Some(idx) = static_table::find_name(name) {
            return Some(idx);
        }
        let generation = self.name_index.get(name)?.back().copied()?;
        self.index_of_generation(generation)
    }

    /// Lowest wire index whose (name, value) matches exactly, static table
    /// searched first.
    #[must_use]
    pub fn find_name_value(&self, name: &[u8], value: &[u8]) -> Option<usize> {
        if let Some(idx) = static_table::find_name_value(name, value) {
            return Some(idx);
        }
        let generation = self.name_value_index.get(name)?.get(value)?.back().copied()?;
        self.index_of_generation(generation)
    }

    fn index_of_generation(&self, generation: u64) -> Option<usize> {
        // The newest entry has generation `next_generation - 1`, which sits
        // at wire index STATIC_TABLE_LEN + 1.
        let age = (self.next_generation - 1).checked_sub(generation)?;
        Some(STATIC_TABLE_LEN + 1 + age as usize)
    }

    /// Insert a new entry at the front of the dynamic table's index space,
    /// evicting from the back (oldest) until the size cap is respected.
    pub fn insert(&mut self, name: Bytes, value: Bytes) {
        let generation = self.next_generation;
        self.next_generation += 1;

        self.name_index
            .entry(name.to_vec())
            .or_default()
            .push_back(generation);
        self.name_value_index
            .entry(name.to_vec())
            .or_default()
            .entry(value.to_vec())
            .or_default()
            .push_back(generation);

        let entry = DynEntry {
            name,
            value,
            generation,
        };
        self.current_size += entry.size();
        self.entries.push_back(entry);
        self.evict_to_fit();
    }

    /// Change the maximum size, evicting immediately if the new cap is
    /// smaller than the current contents.
    pub fn resize(&mut self, new_max_size: usize) {
        self.max_size = new_max_size;
        self.evict_to_fit();
    }

    fn evict_to_fit(&mut self) {
        while self.current_size > self.max_size {
            let Some(evicted) = self.entries.pop_front() else {
                break;
            };
            self.current_size -= evicted.size();
            if let Some(gens) = self.name_index.get_mut(evicted.name.as_ref()) {
                if gens.front() == Some(&evicted.generation) {
                    gens.pop_front();
                }
                if gens.is_empty() {
                    self.name_index.remove(evicted.name.as_ref());
                }
            }
            if let Some(by_value) = self.name_value_index.get_mut(evicted.name.as_ref()) {
                if let Some(gens) = by_value.get_mut(evicted.value.as_ref()) {
                    if gens.front() == Some(&evicted.generation) {
                        gens.pop_front();
                    }
                    if gens.is_empty() {
                        by_value.remove(evicted.value.as_ref());
                    }
                }
                if by_value.is_empty() {
                    self.name_value_index.remove(evicted.name.as_ref());
                }
            }
        }
    }
}
