//! Cross-chunk block overrides.
//!
//! When a rule stamps an object whose cells spill past the chunk being
//! generated, the out-of-chunk cells are deposited here keyed by target
//! chunk. A later (or concurrent) generation of the target chunk consumes
//! its pending overrides during the default-fill pass; an already-generated
//! neighbor is written directly instead.
//!
//! Conflicting deposits at the same voxel resolve by priority: a new entry
//! replaces an existing one only when its priority is strictly greater, so
//! ties keep the first writer and replay order cannot change the outcome.

use dashmap::DashMap;
use rustc_hash::FxHashMap;
use strata_voxel::{BlockId, ChunkPos, LocalPos};

/// One pending block write in a not-yet-generated chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OverrideEntry {
    /// Effective priority of the rule that produced the write.
    pub priority: i64,
    /// Block to place.
    pub block: BlockId,
}

/// Pending overrides for all chunks, keyed by target chunk position.
#[derive(Debug, Default)]
pub struct OverrideTable {
    pending: DashMap<ChunkPos, FxHashMap<LocalPos, OverrideEntry>>,
}

impl OverrideTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deposits an override for a voxel of `chunk`.
    ///
    /// Returns `true` if the entry was stored: the slot was empty, or the new
    /// priority strictly exceeds the stored one.
    pub fn try_write(&self, chunk: ChunkPos, pos: LocalPos, entry: OverrideEntry) -> bool {
        let mut slots = self.pending.entry(chunk).or_default();
        match slots.get(&pos) {
            Some(existing) if entry.priority <= existing.priority => false,
            _ => {
                slots.insert(pos, entry);
                true
            }
        }
    }

    /// Returns the pending entry for a voxel, if any.
    pub fn get(&self, chunk: ChunkPos, pos: LocalPos) -> Option<OverrideEntry> {
        self.pending.get(&chunk).and_then(|slots| slots.get(&pos).copied())
    }

    /// Removes and returns all pending entries for a chunk.
    ///
    /// Called when the chunk finishes generating; entries deposited after
    /// that point are applied directly to the live chunk instead.
    pub fn take(&self, chunk: ChunkPos) -> FxHashMap<LocalPos, OverrideEntry> {
        self.pending
            .remove(&chunk)
            .map(|(_, slots)| slots)
            .unwrap_or_default()
    }

    /// Number of chunks with at least one pending entry.
    pub fn pending_chunks(&self) -> usize {
        self.pending.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
