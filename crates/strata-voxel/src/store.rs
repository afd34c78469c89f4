//! Concurrent chunk store keyed by [`ChunkPos`].
//!
//! Chunks live behind `Arc<Mutex<_>>` so that independent chunks can be
//! generated on separate worker threads while light propagation and world
//! edits take a per-chunk lock during mutation.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;

use crate::chunk::Chunk;
use crate::coords::ChunkPos;

/// Shared handle to a single chunk.
pub type ChunkHandle = Arc<Mutex<Chunk>>;

/// Locks a chunk handle, recovering the guard if a holder panicked. Chunk
/// data stays structurally valid mid-mutation, so a poisoned lock is usable.
pub fn lock_chunk(handle: &ChunkHandle) -> MutexGuard<'_, Chunk> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns all currently-loaded chunks and provides get-or-create access.
///
/// This is the single authority for which chunks exist in memory. Generation,
/// lighting, and world edits all resolve chunks through this store.
pub struct ChunkStore {
    chunks: DashMap<ChunkPos, ChunkHandle>,
}

impl ChunkStore {
    /// Creates an empty store with no loaded chunks.
    pub fn new() -> Self {
        Self {
            chunks: DashMap::new(),
        }
    }

    /// Returns the chunk at `pos` if it is loaded.
    pub fn get(&self, pos: ChunkPos) -> Option<ChunkHandle> {
        self.chunks.get(&pos).map(|entry| Arc::clone(entry.value()))
    }

    /// Returns the chunk at `pos`, creating an empty `NotStarted` chunk if
    /// none is loaded there.
    pub fn get_or_create(&self, pos: ChunkPos) -> ChunkHandle {
        Arc::clone(
            self.chunks
                .entry(pos)
                .or_insert_with(|| Arc::new(Mutex::new(Chunk::new())))
                .value(),
        )
    }

    /// Returns `true` if a chunk is loaded at `pos`.
    pub fn contains(&self, pos: ChunkPos) -> bool {
        self.chunks.contains_key(&pos)
    }

    /// Removes and returns the chunk at `pos`.
    ///
    /// Outstanding light-queue entries referencing the removed chunk become
    /// no-ops, since queue nodes resolve chunks through this store at dequeue.
    pub fn unload(&self, pos: ChunkPos) -> Option<ChunkHandle> {
        self.chunks.remove(&pos).map(|(_, handle)| handle)
    }

    /// Number of currently loaded chunks.
    pub fn loaded_count(&self) -> usize {
        self.chunks.len()
    }

    /// Returns the positions of all loaded chunks.
    pub fn loaded_positions(&self) -> Vec<ChunkPos> {
        self.chunks.iter().map(|entry| *entry.key()).collect()
    }
}

impl Default for ChunkStore {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::LocalPos;
    use crate::registry::BlockId;

    #[test]
    fn test_get_or_create_then_get_returns_same_chunk() {
        let store = ChunkStore::new();
        let pos = ChunkPos::new(1, 2, 3);

        let handle = store.get_or_create(pos);
        handle
            .lock()
            .unwrap()
            .set_block(LocalPos::new(0, 0, 0), BlockId(9));

        let again = store.get(pos).expect("chunk should be loaded");
        assert_eq!(again.lock().unwrap().block(LocalPos::new(0, 0, 0)), BlockId(9));
    }

    #[test]
    fn test_get_missing_returns_none() {
        let store = ChunkStore::new();
        assert!(store.get(ChunkPos::new(5, 5, 5)).is_none());
    }

    #[test]
    fn test_unload_removes_chunk() {
        let store = ChunkStore::new();
        let pos = ChunkPos::new(0, 0, 0);
        store.get_or_create(pos);
        assert_eq!(store.loaded_count(), 1);

        let removed = store.unload(pos);
        assert!(removed.is_some());
        assert!(store.get(pos).is_none());
        assert_eq!(store.loaded_count(), 0);
    }

    #[test]
    fn test_concurrent_get_or_create_distinct_chunks() {
        let store = Arc::new(ChunkStore::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                let pos = ChunkPos::new(i, 0, 0);
                let chunk = store.get_or_create(pos);
                chunk
                    .lock()
                    .unwrap()
                    .set_block(LocalPos::new(0, 0, 0), BlockId(i as u16 + 1));
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.loaded_count(), 8);
        for i in 0..8 {
            let chunk = store.get(ChunkPos::new(i, 0, 0)).unwrap();
            assert_eq!(
                chunk.lock().unwrap().block(LocalPos::new(0, 0, 0)),
                BlockId(i as u16 + 1)
            );
        }
    }
}
