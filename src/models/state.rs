//! Authoritative registry state: loaded entries plus the in-flight set.
//!
//! All mutation happens behind the registry's write lock, which is what
//! makes the key state machine (`Absent -> Loading -> Loaded -> Absent`)
//! atomic: a key can never be both loaded and in flight.

use super::handle::{ModelHandle, ModelId, ModelKey};
use super::inflight::InFlightLoadSet;
use super::loader::LoadedArtifact;
use super::registry::ModelError;
use std::collections::HashMap;

#[derive(Debug)]
pub(crate) struct ModelEntry {
    pub handle: ModelHandle,
    pub artifact: LoadedArtifact,
    seq: u64,
}

/// Single source of truth for `(path, kind)` -> handle uniqueness.
#[derive(Default)]
pub(crate) struct RegistryState {
    entries: HashMap<ModelId, ModelEntry>,
    by_key: HashMap<ModelKey, ModelId>,
    pub in_flight: InFlightLoadSet,
    next_seq: u64,
}

impl RegistryState {
    pub fn get(&self, id: ModelId) -> Option<&ModelEntry> {
        self.entries.get(&id)
    }

    /// Insert a freshly loaded artifact. The in-flight set guarantees the
    /// key is absent at this point.
    pub fn insert(&mut self, handle: ModelHandle, artifact: LoadedArtifact) -> ModelHandle {
        debug_assert!(!self.by_key.contains_key(&handle.key()));
        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_key.insert(handle.key(), handle.id);
        let snapshot = handle.clone();
        self.entries.insert(handle.id, ModelEntry { handle, artifact, seq });
        snapshot
    }

    /// Borrow an already-loaded artifact by key: bumps the ref count,
    /// refreshes recency, and returns a snapshot.
    pub fn borrow_by_key(&mut self, key: &ModelKey) -> Option<ModelHandle> {
        let id = *self.by_key.get(key)?;
        self.borrow(id)
    }

    /// Borrow an already-loaded artifact by id.
    pub fn borrow(&mut self, id: ModelId) -> Option<ModelHandle> {
        let entry = self.entries.get_mut(&id)?;
        entry.handle.ref_count += 1;
        entry.handle.touch();
        Some(entry.handle.clone())
    }

    /// Drop one borrow. Returns the new count, or `None` for unknown ids.
    pub fn release(&mut self, id: ModelId) -> Option<u32> {
        let entry = self.entries.get_mut(&id)?;
        entry.handle.ref_count = entry.handle.ref_count.saturating_sub(1);
        Some(entry.handle.ref_count)
    }

    /// Remove an entry that has no active borrows.
    pub fn remove_idle(&mut self, id: ModelId) -> Result<ModelEntry, ModelError> {
        let entry = self.entries.get(&id).ok_or(ModelError::NotFound(id))?;
        if entry.handle.is_pinned() {
            return Err(ModelError::InUse {
                id,
                ref_count: entry.handle.ref_count,
            });
        }
        let entry = self
            .entries
            .remove(&id)
            .ok_or(ModelError::NotFound(id))?;
        self.by_key.remove(&entry.handle.key());
        Ok(entry)
    }

    /// Remove every entry regardless of borrows. Shutdown path only.
    pub fn drain_all(&mut self) -> Vec<ModelEntry> {
        self.by_key.clear();
        let mut entries: Vec<ModelEntry> = self.entries.drain().map(|(_, e)| e).collect();
        entries.sort_by_key(|e| e.seq);
        entries
    }

    /// Snapshot of all handles in insertion order.
    pub fn snapshot(&self) -> Vec<ModelHandle> {
        let mut entries: Vec<&ModelEntry> = self.entries.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries.iter().map(|e| e.handle.clone()).collect()
    }

    /// Aggregate resident footprint of all loaded artifacts.
    pub fn loaded_bytes(&self) -> u64 {
        self.entries.values().map(|e| e.handle.memory_bytes).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
