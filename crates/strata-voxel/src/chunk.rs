//! Dense chunk storage: one block ID and one light record per voxel, plus
//! the per-chunk generation state, NPC spawn table, and mesh-dirty tracking.

use serde::{Deserialize, Serialize};

use crate::coords::LocalPos;
use crate::registry::BlockId;

/// Side length of a chunk in voxels.
pub const CHUNK_SIZE: usize = 32;

/// Total number of voxels in a chunk (32³).
pub const CHUNK_VOLUME: usize = CHUNK_SIZE * CHUNK_SIZE * CHUNK_SIZE;

/// Per-voxel light record: block light with color, plus a sunlight channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightData {
    /// Block light level (0-15).
    pub luminosity: u8,
    /// Block light red component.
    pub r: u8,
    /// Block light green component.
    pub g: u8,
    /// Block light blue component.
    pub b: u8,
    /// Sunlight level (0-15).
    pub sunlight: u8,
}

impl LightData {
    /// Maximum level for either light channel.
    pub const MAX_LEVEL: u8 = 15;

    /// A fully dark record.
    pub const DARK: LightData = LightData {
        luminosity: 0,
        r: 0,
        g: 0,
        b: 0,
        sunlight: 0,
    };

    /// Zeroes the block-light fields, preserving sunlight.
    pub fn clear_block_light(&mut self) {
        self.luminosity = 0;
        self.r = 0;
        self.g = 0;
        self.b = 0;
    }
}

/// Progress of a chunk through its generation pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GenerationState {
    /// The chunk exists but generation has not begun.
    #[default]
    NotStarted,
    /// The default-block fill (honoring deposited overrides) is in progress.
    FillingDefault,
    /// The rule forest is being evaluated.
    Evaluating,
    /// Generation is complete; the block grid is authoritative.
    Done,
}

/// An NPC spawn entry attached to a chunk by an `AddSpawnData` rule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpawnEntry {
    /// Character name to spawn.
    pub character: String,
    /// Spawn rate (interpretation is up to the entity layer).
    pub rate: f32,
}

/// A voxel chunk: dense block and light grids with generation and dirty state.
///
/// Accessors take [`LocalPos`] coordinates. Out-of-bounds reads return air /
/// darkness with a warning; out-of-bounds writes are ignored with a warning.
pub struct Chunk {
    /// One block ID per voxel, x varying fastest.
    blocks: Vec<BlockId>,
    /// One light record per voxel, same layout as `blocks`.
    light: Vec<LightData>,
    /// NPC spawn table for this chunk.
    spawns: Vec<SpawnEntry>,
    /// Where this chunk is in its generation pass.
    state: GenerationState,
    /// Set when the block or light grid changes; cleared by the mesher.
    mesh_dirty: bool,
    /// Monotonically increasing counter, incremented on each mutation.
    version: u64,
}

impl Chunk {
    /// Creates a new chunk filled with air and darkness, state `NotStarted`.
    pub fn new() -> Self {
        Self {
            blocks: vec![BlockId::AIR; CHUNK_VOLUME],
            light: vec![LightData::DARK; CHUNK_VOLUME],
            spawns: Vec::new(),
            state: GenerationState::NotStarted,
            mesh_dirty: false,
            version: 0,
        }
    }

    /// Returns the block at `pos`, or air if `pos` is out of bounds.
    pub fn block(&self, pos: LocalPos) -> BlockId {
        if !pos.in_bounds() {
            tracing::warn!("Chunk::block out of bounds: {:?}", pos);
            return BlockId::AIR;
        }
        self.blocks[pos.index()]
    }

    /// Sets the block at `pos`. No-op with a warning if out of bounds.
    pub fn set_block(&mut self, pos: LocalPos, block: BlockId) {
        if !pos.in_bounds() {
            tracing::warn!("Chunk::set_block out of bounds: {:?}", pos);
            return;
        }
        self.blocks[pos.index()] = block;
        self.mesh_dirty = true;
        self.version += 1;
    }

    /// Returns the light record at `pos`, or darkness if out of bounds.
    pub fn light(&self, pos: LocalPos) -> LightData {
        if !pos.in_bounds() {
            tracing::warn!("Chunk::light out of bounds: {:?}", pos);
            return LightData::DARK;
        }
        self.light[pos.index()]
    }

    /// Sets the light record at `pos`. No-op with a warning if out of bounds.
    pub fn set_light(&mut self, pos: LocalPos, light: LightData) {
        if !pos.in_bounds() {
            tracing::warn!("Chunk::set_light out of bounds: {:?}", pos);
            return;
        }
        self.light[pos.index()] = light;
        self.mesh_dirty = true;
        self.version += 1;
    }

    /// Fills every voxel with the given block without touching light data.
    pub fn fill(&mut self, block: BlockId) {
        self.blocks.fill(block);
        self.mesh_dirty = true;
        self.version += 1;
    }

    /// Returns the current generation state.
    pub fn state(&self) -> GenerationState {
        self.state
    }

    /// Advances the generation state.
    pub fn set_state(&mut self, state: GenerationState) {
        self.state = state;
    }

    /// Returns `true` once the generation pass has completed.
    pub fn is_generated(&self) -> bool {
        self.state == GenerationState::Done
    }

    /// Appends an NPC spawn entry.
    pub fn add_spawn(&mut self, entry: SpawnEntry) {
        self.spawns.push(entry);
    }

    /// Returns the NPC spawn table.
    pub fn spawn_entries(&self) -> &[SpawnEntry] {
        &self.spawns
    }

    /// Returns `true` if the chunk needs remeshing.
    pub fn is_mesh_dirty(&self) -> bool {
        self.mesh_dirty
    }

    /// Marks the chunk for remeshing.
    pub fn mark_mesh_dirty(&mut self) {
        self.mesh_dirty = true;
    }

    /// Clears the mesh-dirty flag after the mesher has consumed the chunk.
    pub fn clear_mesh_dirty(&mut self) {
        self.mesh_dirty = false;
    }

    /// Returns the current version counter.
    pub fn version(&self) -> u64 {
        self.version
    }
}

impl Default for Chunk {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
