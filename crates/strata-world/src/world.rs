//! World facade: owns the chunk store, drives generation, and keeps the
//! light queues fed as blocks change.

use std::sync::Arc;

use strata_lighting::{LightEngine, LightNode};
use strata_terrain::{ChunkGenerator, CompiledBundle};
use strata_voxel::{
    BlockId, BlockRegistry, ChunkPos, ChunkStore, LightData, LocalPos, WorldPos, lock_chunk,
};

const NEIGHBORS: [(i64, i64, i64); 6] = [
    (1, 0, 0),
    (-1, 0, 0),
    (0, 1, 0),
    (0, -1, 0),
    (0, 0, 1),
    (0, 0, -1),
];

/// A running world: one compiled bundle, its chunks, and its light state.
///
/// All methods take `&self`; the world is shared across worker threads behind
/// an `Arc`.
pub struct World {
    bundle: Arc<CompiledBundle>,
    store: ChunkStore,
    generator: ChunkGenerator,
    lighting: LightEngine,
}

impl World {
    /// Creates a world from a compiled bundle.
    pub fn new(bundle: CompiledBundle) -> Self {
        let bundle = Arc::new(bundle);
        Self {
            generator: ChunkGenerator::new(Arc::clone(&bundle)),
            bundle,
            store: ChunkStore::new(),
            lighting: LightEngine::new(),
        }
    }

    /// The bundle this world was created from.
    pub fn bundle(&self) -> &CompiledBundle {
        &self.bundle
    }

    /// The block registry.
    pub fn registry(&self) -> &BlockRegistry {
        self.bundle.registry()
    }

    /// The chunk store.
    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    /// The light engine.
    pub fn lighting(&self) -> &LightEngine {
        &self.lighting
    }

    /// Generates the chunk at `pos` if it has not been generated yet, then
    /// seeds its initial light: one add node per emissive voxel, and top-face
    /// sunlight when no chunk is loaded above.
    pub fn generate_chunk(&self, pos: ChunkPos) {
        let fresh = !self
            .store
            .get(pos)
            .is_some_and(|handle| lock_chunk(&handle).is_generated());
        self.generator.generate(&self.store, pos);
        if fresh {
            self.seed_initial_light(pos);
        }
    }

    fn seed_initial_light(&self, pos: ChunkPos) {
        let Some(handle) = self.store.get(pos) else {
            return;
        };
        let registry = self.bundle.registry();
        let mut chunk = lock_chunk(&handle);

        for z in 0..strata_voxel::CHUNK_SIZE as u8 {
            for y in 0..strata_voxel::CHUNK_SIZE as u8 {
                for x in 0..strata_voxel::CHUNK_SIZE as u8 {
                    let local = LocalPos::new(x, y, z);
                    let block = chunk.block(local);
                    let luminosity = registry.luminosity(block);
                    if luminosity == 0 {
                        continue;
                    }
                    let mut light = chunk.light(local);
                    if light.luminosity < luminosity {
                        let (r, g, b) = registry.get(block).light_color;
                        light.luminosity = luminosity;
                        light.r = r;
                        light.g = g;
                        light.b = b;
                        chunk.set_light(local, light);
                    }
                    self.lighting.enqueue_add(LightNode::new(pos, local));
                }
            }
        }

        // Without a loaded chunk above, the top face is open sky.
        if !self.store.contains(pos.offset(0, 1, 0)) {
            let top_y = strata_voxel::CHUNK_SIZE as u8 - 1;
            for z in 0..strata_voxel::CHUNK_SIZE as u8 {
                for x in 0..strata_voxel::CHUNK_SIZE as u8 {
                    let local = LocalPos::new(x, top_y, z);
                    if !registry.is_transparent(chunk.block(local)) {
                        continue;
                    }
                    let mut light = chunk.light(local);
                    if light.sunlight < LightData::MAX_LEVEL {
                        light.sunlight = LightData::MAX_LEVEL;
                        chunk.set_light(local, light);
                    }
                    self.lighting.enqueue_sunlight(LightNode::new(pos, local));
                }
            }
        }
    }

    /// Returns the block at a world position, or air if its chunk is not
    /// loaded.
    pub fn block_at(&self, pos: WorldPos) -> BlockId {
        let (chunk, local) = pos.split();
        match self.store.get(chunk) {
            Some(handle) => lock_chunk(&handle).block(local),
            None => BlockId::AIR,
        }
    }

    /// Returns the light record at a world position, or darkness if its
    /// chunk is not loaded.
    pub fn light_at(&self, pos: WorldPos) -> LightData {
        let (chunk, local) = pos.split();
        match self.store.get(chunk) {
            Some(handle) => lock_chunk(&handle).light(local),
            None => LightData::DARK,
        }
    }

    /// Replaces the block at a world position and queues the light updates
    /// the edit implies. No-op if the chunk is not loaded.
    pub fn set_block(&self, pos: WorldPos, block: BlockId) {
        let (chunk_pos, local) = pos.split();
        let Some(handle) = self.store.get(chunk_pos) else {
            tracing::warn!(?pos, "set_block on unloaded chunk ignored");
            return;
        };
        let old = {
            let mut chunk = lock_chunk(&handle);
            let old = chunk.block(local);
            chunk.set_block(local, block);
            old
        };
        self.notify_block_changed(pos, old, block);
    }

    /// Queues the light updates implied by a block change.
    ///
    /// An emissive block seeds its own record and floods out. Removing an
    /// emissive block, or occluding a lit voxel, retracts through the removal
    /// queue, which reads the not-yet-cleared record at dequeue. A newly
    /// transparent voxel re-floods from all six neighbors on both channels.
    pub fn notify_block_changed(&self, pos: WorldPos, old: BlockId, new: BlockId) {
        let registry = self.bundle.registry();
        let (chunk_pos, local) = pos.split();
        let node = LightNode::new(chunk_pos, local);

        let new_luminosity = registry.luminosity(new);
        if new_luminosity > 0 {
            if let Some(handle) = self.store.get(chunk_pos) {
                let mut chunk = lock_chunk(&handle);
                let mut light = chunk.light(local);
                let (r, g, b) = registry.get(new).light_color;
                light.luminosity = new_luminosity;
                light.r = r;
                light.g = g;
                light.b = b;
                chunk.set_light(local, light);
            }
            self.lighting.enqueue_add(node);
        } else if registry.luminosity(old) > 0 || !registry.is_transparent(new) {
            self.lighting.enqueue_removal(node);
        }

        if registry.is_transparent(new) {
            for (dx, dy, dz) in NEIGHBORS {
                let (nc, nl) = pos.offset(dx, dy, dz).split();
                let neighbor = LightNode::new(nc, nl);
                self.lighting.enqueue_add(neighbor);
                self.lighting.enqueue_sunlight(neighbor);
            }
        }
    }

    /// Runs one lighting step. Returns the number of nodes processed; loop
    /// until 0 to converge.
    pub fn step_lighting(&self, budget: usize) -> usize {
        self.lighting
            .step(&self.store, self.bundle.registry(), budget)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
