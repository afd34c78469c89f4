//! Deterministic seed derivation.
//!
//! Derives per-chunk RNGs and per-module noise seeds from the world seed, so
//! that generating the same chunk with the same bundle always produces the
//! same voxels regardless of thread or generation order.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use strata_voxel::{CHUNK_SIZE, Chunk, ChunkPos, LocalPos};

/// Derive a u64 seed for a chunk from the world seed and chunk position.
///
/// Uses SipHash (via std's `DefaultHasher`) to combine the world seed with
/// the chunk position into a well-distributed u64.
pub fn derive_chunk_seed(world_seed: u64, pos: ChunkPos) -> u64 {
    let mut hasher = DefaultHasher::new();
    world_seed.hash(&mut hasher);
    pos.x.hash(&mut hasher);
    pos.y.hash(&mut hasher);
    pos.z.hash(&mut hasher);
    hasher.finish()
}

/// Derive a u32 seed for a named noise module.
///
/// Each module samples an independent noise lattice, so two modules with the
/// same generator parameters still produce different fields.
pub fn derive_module_seed(world_seed: u64, name: &str) -> u32 {
    let mut hasher = DefaultHasher::new();
    world_seed.hash(&mut hasher);
    name.hash(&mut hasher);
    hasher.finish() as u32
}

/// Derive a deterministic RNG for a chunk's generation pass.
///
/// The returned RNG produces an identical sequence for the same
/// `(world_seed, pos)` pair, regardless of thread or platform. Used for
/// object orientation rolls.
pub fn chunk_rng(world_seed: u64, pos: ChunkPos) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(derive_chunk_seed(world_seed, pos))
}

/// Hash the block contents of a chunk for determinism comparison.
pub fn hash_chunk(chunk: &Chunk) -> u64 {
    let mut hasher = DefaultHasher::new();
    for z in 0..CHUNK_SIZE as u8 {
        for y in 0..CHUNK_SIZE as u8 {
            for x in 0..CHUNK_SIZE as u8 {
                chunk.block(LocalPos::new(x, y, z)).0.hash(&mut hasher);
            }
        }
    }
    hasher.finish()
}
