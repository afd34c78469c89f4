//! Voxel chunk storage: block grids, per-voxel light records, the block
//! registry, and the concurrent chunk store.

pub mod chunk;
pub mod coords;
pub mod registry;
pub mod store;

pub use chunk::{CHUNK_SIZE, CHUNK_VOLUME, Chunk, GenerationState, LightData, SpawnEntry};
pub use coords::{ChunkPos, LocalPos, WorldPos};
pub use registry::{BlockDef, BlockId, BlockRegistry, RegistryError};
pub use store::{ChunkHandle, ChunkStore, lock_chunk};
