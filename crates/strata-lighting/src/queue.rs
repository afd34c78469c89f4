//! Work queues feeding the light engine.
//!
//! Three unbounded channels, drained in a fixed order each step: removals
//! first so stale light is retracted before new light floods in, then block
//! light additions, then sunlight. Producers (world edits, chunk generation)
//! push from any thread; the engine drains on its own schedule.

use crossbeam_channel::{Receiver, Sender, unbounded};
use strata_voxel::{ChunkPos, LocalPos};

/// One queued light update: a voxel addressed by chunk and local position.
///
/// Nodes carry no light payload. The engine reads the voxel's current record
/// at dequeue, so a node outlives any number of intervening edits and a node
/// for an unloaded chunk is simply a no-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LightNode {
    /// Chunk containing the voxel.
    pub chunk: ChunkPos,
    /// Position within the chunk.
    pub pos: LocalPos,
}

impl LightNode {
    /// Creates a node for a voxel.
    pub fn new(chunk: ChunkPos, pos: LocalPos) -> Self {
        Self { chunk, pos }
    }
}

pub(crate) struct LightQueues {
    remove: (Sender<LightNode>, Receiver<LightNode>),
    add: (Sender<LightNode>, Receiver<LightNode>),
    sunlight: (Sender<LightNode>, Receiver<LightNode>),
}

impl LightQueues {
    pub(crate) fn new() -> Self {
        Self {
            remove: unbounded(),
            add: unbounded(),
            sunlight: unbounded(),
        }
    }

    pub(crate) fn push_remove(&self, node: LightNode) {
        // Send on an unbounded channel only fails when the receiver is gone,
        // and we own both ends.
        let _ = self.remove.0.send(node);
    }

    pub(crate) fn push_add(&self, node: LightNode) {
        let _ = self.add.0.send(node);
    }

    pub(crate) fn push_sunlight(&self, node: LightNode) {
        let _ = self.sunlight.0.send(node);
    }

    pub(crate) fn pop_remove(&self) -> Option<LightNode> {
        self.remove.1.try_recv().ok()
    }

    pub(crate) fn pop_add(&self) -> Option<LightNode> {
        self.add.1.try_recv().ok()
    }

    pub(crate) fn pop_sunlight(&self) -> Option<LightNode> {
        self.sunlight.1.try_recv().ok()
    }

    pub(crate) fn pending(&self) -> usize {
        self.remove.1.len() + self.add.1.len() + self.sunlight.1.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queues_are_fifo_and_independent() {
        let queues = LightQueues::new();
        let a = LightNode::new(ChunkPos::new(0, 0, 0), LocalPos::new(1, 2, 3));
        let b = LightNode::new(ChunkPos::new(0, 0, 0), LocalPos::new(4, 5, 6));

        queues.push_add(a);
        queues.push_add(b);
        queues.push_remove(b);
        assert_eq!(queues.pending(), 3);

        assert_eq!(queues.pop_remove(), Some(b));
        assert_eq!(queues.pop_add(), Some(a));
        assert_eq!(queues.pop_add(), Some(b));
        assert_eq!(queues.pop_add(), None);
        assert_eq!(queues.pop_sunlight(), None);
        assert_eq!(queues.pending(), 0);
    }
}
