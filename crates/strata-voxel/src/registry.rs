//! Block registry: maps compact [`BlockId`] values to [`BlockDef`] metadata.
//!
//! The registry is built once when the bundle is compiled. Air is always ID 0
//! so that zero-initialized chunk memory represents empty space.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Compact identifier stored inside every voxel cell (2 bytes).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId(pub u16);

impl BlockId {
    /// The air block, always ID 0.
    pub const AIR: BlockId = BlockId(0);
}

/// Full descriptor for a block type.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockDef {
    /// Human-readable name (e.g. "stone", "grass", "lantern").
    pub name: String,
    /// Whether entities collide with this block.
    pub solid: bool,
    /// Whether light passes through this block.
    pub transparent: bool,
    /// Light emission level (0 = none, 15 = max).
    pub luminosity: u8,
    /// Emitted light color as `(r, g, b)`, each 0-255.
    pub light_color: (u8, u8, u8),
}

/// Errors that can occur during block registration.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A block with the same name has already been registered.
    #[error("duplicate block name: {0}")]
    DuplicateName(String),
    /// All 65 536 slots have been consumed.
    #[error("block registry is full (max 65536 types)")]
    RegistryFull,
}

/// Maps [`BlockId`] → [`BlockDef`] with O(1) lookup by index and O(1)
/// reverse lookup by name.
pub struct BlockRegistry {
    /// Dense array where `index == BlockId.0`.
    defs: Vec<BlockDef>,
    /// Reverse lookup: name → ID.
    name_to_id: FxHashMap<String, BlockId>,
}

impl BlockRegistry {
    /// Creates a new registry with air pre-registered as ID 0.
    pub fn new() -> Self {
        let air = BlockDef {
            name: "air".to_string(),
            solid: false,
            transparent: true,
            luminosity: 0,
            light_color: (0, 0, 0),
        };

        let mut name_to_id = FxHashMap::default();
        name_to_id.insert("air".to_string(), BlockId::AIR);

        Self {
            defs: vec![air],
            name_to_id,
        }
    }

    /// Registers a new block type and returns its assigned ID.
    ///
    /// IDs are assigned sequentially starting from 1 (0 is air).
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateName`] if a block with the same name
    /// already exists, or [`RegistryError::RegistryFull`] if all 65 536 slots
    /// are consumed.
    pub fn register(&mut self, def: BlockDef) -> Result<BlockId, RegistryError> {
        if self.name_to_id.contains_key(&def.name) {
            return Err(RegistryError::DuplicateName(def.name));
        }
        if self.defs.len() > u16::MAX as usize {
            return Err(RegistryError::RegistryFull);
        }

        let id = BlockId(self.defs.len() as u16);
        self.name_to_id.insert(def.name.clone(), id);
        self.defs.push(def);
        Ok(id)
    }

    /// Returns the definition for a given ID.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of range — this indicates a programming error
    /// since IDs are only produced by the registry itself.
    pub fn get(&self, id: BlockId) -> &BlockDef {
        &self.defs[id.0 as usize]
    }

    /// Returns the ID for a named block, or `None` if not found.
    pub fn lookup_by_name(&self, name: &str) -> Option<BlockId> {
        self.name_to_id.get(name).copied()
    }

    /// Returns the total number of registered blocks (including air).
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// Returns `true` if only air is registered.
    pub fn is_empty(&self) -> bool {
        self.defs.len() <= 1
    }

    /// Returns `true` if the given block is air (ID 0).
    pub fn is_air(&self, id: BlockId) -> bool {
        id.0 == 0
    }

    /// Returns `true` if light passes through the given block.
    ///
    /// Air is transparent. Returns `true` for unknown IDs as a conservative
    /// fallback (treat missing types like air).
    pub fn is_transparent(&self, id: BlockId) -> bool {
        match self.defs.get(id.0 as usize) {
            Some(def) => def.transparent,
            None => true,
        }
    }

    /// Returns the light emission level for the given block, 0 for unknown IDs.
    pub fn luminosity(&self, id: BlockId) -> u8 {
        self.defs.get(id.0 as usize).map_or(0, |def| def.luminosity)
    }
}

impl Default for BlockRegistry {
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

    fn stone_def() -> BlockDef {
        BlockDef {
            name: "stone".to_string(),
            solid: true,
            transparent: false,
            luminosity: 0,
            light_color: (0, 0, 0),
        }
    }

    fn lantern_def() -> BlockDef {
        BlockDef {
            name: "lantern".to_string(),
            solid: true,
            transparent: false,
            luminosity: 15,
            light_color: (255, 220, 160),
        }
    }

    #[test]
    fn test_air_is_id_zero() {
        let registry = BlockRegistry::new();
        let air = registry.get(BlockId::AIR);
        assert_eq!(air.name, "air");
        assert!(!air.solid);
        assert!(air.transparent);
    }

    #[test]
    fn test_register_returns_sequential_ids() {
        let mut registry = BlockRegistry::new();
        let id1 = registry.register(stone_def()).unwrap();
        let id2 = registry.register(lantern_def()).unwrap();
        assert_eq!(id1, BlockId(1));
        assert_eq!(id2, BlockId(2));
    }

    #[test]
    fn test_lookup_by_name() {
        let mut registry = BlockRegistry::new();
        let id = registry.register(lantern_def()).unwrap();
        assert_eq!(registry.lookup_by_name("lantern"), Some(id));
        assert_eq!(registry.lookup_by_name("nonexistent"), None);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = BlockRegistry::new();
        registry.register(stone_def()).unwrap();
        let result = registry.register(stone_def());
        assert!(matches!(result, Err(RegistryError::DuplicateName(_))));
    }

    #[test]
    fn test_unknown_id_is_transparent_and_dark() {
        let registry = BlockRegistry::new();
        assert!(registry.is_transparent(BlockId(999)));
        assert_eq!(registry.luminosity(BlockId(999)), 0);
    }

    #[test]
    fn test_luminosity_reported() {
        let mut registry = BlockRegistry::new();
        let id = registry.register(lantern_def()).unwrap();
        assert_eq!(registry.luminosity(id), 15);
        assert_eq!(registry.luminosity(BlockId::AIR), 0);
    }
}
