use std::collections::BTreeSet;

use crate::storage::{StateSlot, StorageError};

/// The global, cross-page set of selected user ids. Holds ids only, never
/// records: membership is independent of whatever page is on screen.
///
/// Every mutation is written through to the durable slot immediately. A
/// failed write is returned to the caller for reporting but the in-memory
/// set stays authoritative for the rest of the session.
pub struct SelectionStore<S: StateSlot> {
    ids: BTreeSet<u64>,
    slot: S,
}

impl<S: StateSlot> SelectionStore<S> {
    pub fn new(slot: S) -> Self {
        Self {
            ids: BTreeSet::new(),
            slot,
        }
    }

    /// Reads the durable slot. Missing data yields an empty selection;
    /// unreadable or corrupt data also degrades to empty, with the error
    /// handed back so the caller can report it.
    pub fn load(&mut self) -> Result<usize, StorageError> {
        match self.slot.load() {
            Ok(ids) => {
                self.ids = ids.into_iter().collect();
                Ok(self.ids.len())
            }
            Err(e) => {
                self.ids.clear();
                Err(e)
            }
        }
    }

    /// Adds or removes one id, then persists the full set synchronously.
    pub fn toggle(&mut self, id: u64, selected: bool) -> Result<(), StorageError> {
        if selected {
            self.ids.insert(id);
        } else {
            self.ids.remove(&id);
        }
        self.persist()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Snapshot of the current membership. The order carries no meaning; it
    /// is only used to build the export payload.
    pub fn snapshot_ids(&self) -> Vec<u64> {
        self.ids.iter().copied().collect()
    }

    pub fn persist(&self) -> Result<(), StorageError> {
        self.slot.save(&self.snapshot_ids())
    }
}
