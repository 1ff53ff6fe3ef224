//! Coalescing set for in-flight load operations.
//!
//! Replaces ad-hoc double-checked "is it loaded" initialization with an
//! explicit structure: every load in progress has exactly one entry here,
//! keyed by model identity, carrying a completion channel that all
//! duplicate callers await. Entries never outlive their originating load;
//! [`InFlightLoadSet::complete`] removes them on success and failure alike.

use std::collections::HashMap;

use tokio::sync::broadcast;

use super::handle::{ModelId, ModelKey};
use super::registry::ModelError;

/// Outcome delivered to every caller attached to a coalesced load.
pub(crate) type LoadOutcome = Result<ModelId, ModelError>;

/// Result of attaching a caller to a key.
pub(crate) enum Attach {
    /// No load was running: the caller is the leader and must start the
    /// physical load. The receiver resolves when that load completes.
    Leader(broadcast::Receiver<LoadOutcome>),
    /// A load for the key is already running; await the receiver instead
    /// of starting a redundant load.
    Joined(broadcast::Receiver<LoadOutcome>),
}

struct InFlightLoad {
    tx: broadcast::Sender<LoadOutcome>,
    waiters: u32,
}

/// Loads in progress, keyed by `(path, kind)`.
///
/// Mutation happens behind the registry state lock, so attach and complete
/// are serialized: a caller can never subscribe after the outcome was sent.
#[derive(Default)]
pub(crate) struct InFlightLoadSet {
    loads: HashMap<ModelKey, InFlightLoad>,
}

impl InFlightLoadSet {
    /// Attach a caller to `key`, creating the entry if none exists.
    pub fn attach(&mut self, key: &ModelKey) -> Attach {
        if let Some(entry) = self.loads.get_mut(key) {
            entry.waiters += 1;
            return Attach::Joined(entry.tx.subscribe());
        }
        // A single message is ever sent per entry.
        let (tx, rx) = broadcast::channel(1);
        self.loads.insert(key.clone(), InFlightLoad { tx, waiters: 1 });
        Attach::Leader(rx)
    }

    /// Resolve the load for `key`: notify every attached caller and drop
    /// the entry. Returns the number of callers that were attached.
    pub fn complete(&mut self, key: &ModelKey, outcome: LoadOutcome) -> u32 {
        match self.loads.remove(key) {
            Some(entry) => {
                // Send fails only if every receiver was dropped; the entry
                // is gone either way.
                let _ = entry.tx.send(outcome);
                entry.waiters
            }
            None => 0,
        }
    }

    #[cfg(test)]
    pub fn contains(&self, key: &ModelKey) -> bool {
        self.loads.contains_key(key)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.loads.len()
    }
}
