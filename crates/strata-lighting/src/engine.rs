//! Budgeted flood-fill light propagation.
//!
//! Each step drains up to a fixed number of nodes from the removal queue,
//! then the block-light queue, then the sunlight queue. Removals run first so
//! that a retracting light hole is fully carved before surviving sources
//! flood back in; the frontier where a retraction meets equal-or-brighter
//! light in a transparent voxel is re-enqueued for addition.
//!
//! Block light loses one level per voxel in every direction. Sunlight loses
//! one level laterally and upward but travels downward without falloff, so a
//! level-15 sky column stays 15 all the way to the first obstruction.

use strata_voxel::{BlockRegistry, ChunkStore, WorldPos, lock_chunk};

use crate::queue::{LightNode, LightQueues};

/// Default number of nodes drained per queue per step.
pub const DEFAULT_STEP_BUDGET: usize = 500;

const NEIGHBORS: [(i64, i64, i64); 6] = [
    (1, 0, 0),
    (-1, 0, 0),
    (0, 1, 0),
    (0, -1, 0),
    (0, 0, 1),
    (0, 0, -1),
];

/// The light propagation engine.
///
/// Holds the three work queues; all methods take `&self`, so one engine is
/// shared between producer threads and whichever thread drives [`step`].
///
/// [`step`]: LightEngine::step
pub struct LightEngine {
    queues: LightQueues,
}

impl LightEngine {
    /// Creates an engine with empty queues.
    pub fn new() -> Self {
        Self {
            queues: LightQueues::new(),
        }
    }

    /// Queues a voxel whose light record should flood outward.
    pub fn enqueue_add(&self, node: LightNode) {
        self.queues.push_add(node);
    }

    /// Queues a voxel whose block light should be retracted.
    ///
    /// The voxel's record is read and cleared at dequeue, so callers enqueue
    /// *before* zeroing anything themselves.
    pub fn enqueue_removal(&self, node: LightNode) {
        self.queues.push_remove(node);
    }

    /// Queues a voxel whose sunlight should flood outward.
    pub fn enqueue_sunlight(&self, node: LightNode) {
        self.queues.push_sunlight(node);
    }

    /// Total queued nodes across all three queues.
    pub fn pending(&self) -> usize {
        self.queues.pending()
    }

    /// Drains up to `budget` nodes from each queue and returns the number of
    /// nodes processed. Callers loop until this returns 0 to run light to
    /// convergence, or call it once per tick to amortize large floods.
    pub fn step(&self, store: &ChunkStore, registry: &BlockRegistry, budget: usize) -> usize {
        let mut processed = 0;

        for _ in 0..budget {
            let Some(node) = self.queues.pop_remove() else {
                break;
            };
            self.process_remove(store, registry, node);
            processed += 1;
        }
        for _ in 0..budget {
            let Some(node) = self.queues.pop_add() else {
                break;
            };
            self.process_add(store, registry, node);
            processed += 1;
        }
        for _ in 0..budget {
            let Some(node) = self.queues.pop_sunlight() else {
                break;
            };
            self.process_sunlight(store, registry, node);
            processed += 1;
        }

        if processed > 0 {
            tracing::trace!(processed, pending = self.pending(), "light step");
        }
        processed
    }

    /// Retracts block light at one voxel and classifies its neighbors:
    /// dimmer lit neighbors retract too, equal-or-brighter transparent ones
    /// become the re-flood frontier.
    fn process_remove(&self, store: &ChunkStore, registry: &BlockRegistry, node: LightNode) {
        let Some(handle) = store.get(node.chunk) else {
            return;
        };
        let own = {
            let mut chunk = lock_chunk(&handle);
            let mut own = chunk.light(node.pos);
            if own.luminosity == 0 {
                return;
            }
            let before = own;
            own.clear_block_light();
            chunk.set_light(node.pos, own);
            before
        };

        let world = WorldPos::from_parts(node.chunk, node.pos);
        for (dx, dy, dz) in NEIGHBORS {
            let (target_chunk, target_pos) = world.offset(dx, dy, dz).split();
            let Some(neighbor) = store.get(target_chunk) else {
                continue;
            };
            let (level, transparent) = {
                let chunk = lock_chunk(&neighbor);
                let level = chunk.light(target_pos).luminosity;
                (level, registry.is_transparent(chunk.block(target_pos)))
            };
            if level == 0 {
                continue;
            }
            let target = LightNode::new(target_chunk, target_pos);
            if level < own.luminosity {
                self.queues.push_remove(target);
            } else if transparent {
                self.queues.push_add(target);
            }
        }
    }

    /// Floods block light from one voxel to transparent neighbors that are at
    /// least two levels dimmer, carrying the source color.
    fn process_add(&self, store: &ChunkStore, registry: &BlockRegistry, node: LightNode) {
        let Some(handle) = store.get(node.chunk) else {
            return;
        };
        let own = lock_chunk(&handle).light(node.pos);
        if own.luminosity < 2 {
            return;
        }

        let world = WorldPos::from_parts(node.chunk, node.pos);
        for (dx, dy, dz) in NEIGHBORS {
            let (target_chunk, target_pos) = world.offset(dx, dy, dz).split();
            let Some(neighbor) = store.get(target_chunk) else {
                continue;
            };
            let mut chunk = lock_chunk(&neighbor);
            if !registry.is_transparent(chunk.block(target_pos)) {
                continue;
            }
            let mut light = chunk.light(target_pos);
            if light.luminosity + 2 > own.luminosity {
                continue;
            }
            light.luminosity = own.luminosity - 1;
            light.r = own.r;
            light.g = own.g;
            light.b = own.b;
            chunk.set_light(target_pos, light);
            drop(chunk);
            self.queues.push_add(LightNode::new(target_chunk, target_pos));
        }
    }

    /// Floods sunlight from one voxel. Downward neighbors inherit the full
    /// level; every other direction loses one. The level is recorded even on
    /// opaque neighbors (the surface is lit), but only transparent ones
    /// propagate further.
    fn process_sunlight(&self, store: &ChunkStore, registry: &BlockRegistry, node: LightNode) {
        let Some(handle) = store.get(node.chunk) else {
            return;
        };
        let own = lock_chunk(&handle).light(node.pos).sunlight;
        if own == 0 {
            return;
        }

        let world = WorldPos::from_parts(node.chunk, node.pos);
        for (dx, dy, dz) in NEIGHBORS {
            let target_level = if dy < 0 { own } else { own - 1 };
            if target_level == 0 {
                continue;
            }
            let (target_chunk, target_pos) = world.offset(dx, dy, dz).split();
            let Some(neighbor) = store.get(target_chunk) else {
                continue;
            };
            let mut chunk = lock_chunk(&neighbor);
            let mut light = chunk.light(target_pos);
            if light.sunlight >= target_level {
                continue;
            }
            light.sunlight = target_level;
            chunk.set_light(target_pos, light);
            let transparent = registry.is_transparent(chunk.block(target_pos));
            drop(chunk);
            if transparent {
                self.queues
                    .push_sunlight(LightNode::new(target_chunk, target_pos));
            }
        }
    }
}

impl Default for LightEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
