//! Coordinate types: world-absolute voxel positions, chunk-grid positions,
//! and chunk-local positions, with floor-division conversions between them.
//!
//! A world coordinate maps to a chunk by `div_euclid(CHUNK_SIZE)` and to a
//! local coordinate by `rem_euclid(CHUNK_SIZE)`, so negative world axes are
//! handled correctly (`-1` lands in chunk `-1` at local `31`).

use serde::{Deserialize, Serialize};

use crate::chunk::CHUNK_SIZE;

/// Identifies a chunk's position in the chunk grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkPos {
    /// Chunk-grid X coordinate.
    pub x: i32,
    /// Chunk-grid Y coordinate.
    pub y: i32,
    /// Chunk-grid Z coordinate.
    pub z: i32,
}

impl ChunkPos {
    /// Creates a new chunk position.
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Returns the position of the neighboring chunk offset by `(dx, dy, dz)`.
    ///
    /// Typically called with unit offsets (e.g. `(1, 0, 0)` for the +X neighbor).
    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
        }
    }

    /// Returns the world position of this chunk's minimum-corner voxel.
    pub fn origin(self) -> WorldPos {
        let s = CHUNK_SIZE as i64;
        WorldPos {
            x: self.x as i64 * s,
            y: self.y as i64 * s,
            z: self.z as i64 * s,
        }
    }
}

/// A world-absolute voxel coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorldPos {
    /// World X coordinate in voxels.
    pub x: i64,
    /// World Y coordinate in voxels.
    pub y: i64,
    /// World Z coordinate in voxels.
    pub z: i64,
}

impl WorldPos {
    /// Creates a new world position.
    pub fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    /// Reassembles a world position from a chunk position and a local offset.
    pub fn from_parts(chunk: ChunkPos, local: LocalPos) -> Self {
        let origin = chunk.origin();
        Self {
            x: origin.x + local.x as i64,
            y: origin.y + local.y as i64,
            z: origin.z + local.z as i64,
        }
    }

    /// Returns this position offset by `(dx, dy, dz)`.
    pub fn offset(self, dx: i64, dy: i64, dz: i64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
        }
    }

    /// Returns the chunk containing this voxel.
    pub fn chunk(self) -> ChunkPos {
        let s = CHUNK_SIZE as i64;
        ChunkPos {
            x: self.x.div_euclid(s) as i32,
            y: self.y.div_euclid(s) as i32,
            z: self.z.div_euclid(s) as i32,
        }
    }

    /// Returns this voxel's position within its chunk.
    pub fn local(self) -> LocalPos {
        let s = CHUNK_SIZE as i64;
        LocalPos {
            x: self.x.rem_euclid(s) as u8,
            y: self.y.rem_euclid(s) as u8,
            z: self.z.rem_euclid(s) as u8,
        }
    }

    /// Splits this position into its owning chunk and local offset.
    pub fn split(self) -> (ChunkPos, LocalPos) {
        (self.chunk(), self.local())
    }
}

/// A chunk-local voxel coordinate with each component in `[0, CHUNK_SIZE)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalPos {
    /// Local X coordinate.
    pub x: u8,
    /// Local Y coordinate.
    pub y: u8,
    /// Local Z coordinate.
    pub z: u8,
}

impl LocalPos {
    /// Creates a new local position. Components are not range-checked here;
    /// chunk accessors validate bounds.
    pub fn new(x: u8, y: u8, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Returns `true` if every component is below [`CHUNK_SIZE`].
    pub fn in_bounds(self) -> bool {
        let s = CHUNK_SIZE as u8;
        self.x < s && self.y < s && self.z < s
    }

    /// Converts to a linear index (x varies fastest).
    pub fn index(self) -> usize {
        debug_assert!(self.in_bounds());
        self.x as usize + self.y as usize * CHUNK_SIZE + self.z as usize * CHUNK_SIZE * CHUNK_SIZE
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_to_chunk_positive() {
        let w = WorldPos::new(33, 0, 95);
        assert_eq!(w.chunk(), ChunkPos::new(1, 0, 2));
        assert_eq!(w.local(), LocalPos::new(1, 0, 31));
    }

    #[test]
    fn test_world_to_chunk_negative_floor_division() {
        let w = WorldPos::new(-1, -32, -33);
        assert_eq!(w.chunk(), ChunkPos::new(-1, -1, -2));
        assert_eq!(w.local(), LocalPos::new(31, 0, 31));
    }

    #[test]
    fn test_split_round_trips() {
        for &(x, y, z) in &[(0i64, 0, 0), (31, 31, 31), (-100, 250, -7), (1000, -1, 64)] {
            let w = WorldPos::new(x, y, z);
            let (chunk, local) = w.split();
            assert_eq!(WorldPos::from_parts(chunk, local), w, "round trip for ({x}, {y}, {z})");
        }
    }

    #[test]
    fn test_chunk_origin() {
        assert_eq!(ChunkPos::new(2, -1, 0).origin(), WorldPos::new(64, -32, 0));
    }

    #[test]
    fn test_neighbor_translation_across_border() {
        // Stepping -1 in x from local 0 lands at local 31 of the -X neighbor.
        let w = WorldPos::from_parts(ChunkPos::new(0, 0, 0), LocalPos::new(0, 5, 5));
        let n = w.offset(-1, 0, 0);
        assert_eq!(n.chunk(), ChunkPos::new(-1, 0, 0));
        assert_eq!(n.local(), LocalPos::new(31, 5, 5));
    }

    #[test]
    fn test_linear_index_unique() {
        let a = LocalPos::new(1, 0, 0).index();
        let b = LocalPos::new(0, 1, 0).index();
        let c = LocalPos::new(0, 0, 1).index();
        assert_eq!(a, 1);
        assert_eq!(b, CHUNK_SIZE);
        assert_eq!(c, CHUNK_SIZE * CHUNK_SIZE);
    }
}
