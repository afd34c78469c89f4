//! The chunk generation pass.
//!
//! Generation runs in two phases under the chunk's lock. The default-fill
//! phase fills the volume with the bundle's default block and applies any
//! overrides other chunks deposited here. The evaluation phase walks the rule
//! forest once per voxel with `height` bound to the voxel's world Y and one
//! parameter per referenced noise field.
//!
//! Every placement carries an effective priority. A per-voxel priority
//! record, seeded by the overrides consumed at default fill, arbitrates
//! writes during the pass: a voxel written at priority P is only replaced by
//! a later write with a strictly greater priority. The record lives for one
//! pass; consumed table entries are cleared with it.
//!
//! Object cells that land outside the generating chunk are never written
//! under another chunk's lock while ours is held. They are deposited in the
//! override table, and targets that already finished generating are patched
//! afterwards from the table.

use std::sync::Arc;

use glam::IVec3;
use hashbrown::{HashMap, HashSet};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rustc_hash::FxHashMap;

use strata_voxel::{
    BlockId, CHUNK_SIZE, Chunk, ChunkPos, ChunkStore, GenerationState, LocalPos, SpawnEntry,
    WorldPos, lock_chunk,
};

use crate::bundle::CompiledBundle;
use crate::expr::ParamSource;
use crate::field::{FieldResolver, NoiseField};
use crate::overrides::{OverrideEntry, OverrideTable};
use crate::rules::NodeAction;
use crate::seed::chunk_rng;

/// Binds rule-condition parameters for one voxel.
struct VoxelParams<'a> {
    fields: &'a HashMap<String, NoiseField>,
    x: usize,
    y: usize,
    z: usize,
    height: f64,
}

impl ParamSource for VoxelParams<'_> {
    fn value(&self, name: &str) -> Option<f64> {
        if name == "height" {
            return Some(self.height);
        }
        self.fields.get(name).map(|f| f.get(self.x, self.y, self.z))
    }
}

/// Rotates an object-cell offset around the vertical axis by `r` quarter
/// turns. Vertical offsets are unaffected.
fn rotate_y(v: IVec3, r: u8) -> IVec3 {
    match r & 3 {
        0 => v,
        1 => IVec3::new(-v.z, v.y, v.x),
        2 => IVec3::new(-v.x, v.y, -v.z),
        _ => IVec3::new(v.z, v.y, -v.x),
    }
}

/// Generates chunks from a compiled bundle.
///
/// The generator is shared across worker threads; all of its state is either
/// immutable or internally synchronized.
pub struct ChunkGenerator {
    bundle: Arc<CompiledBundle>,
    overrides: OverrideTable,
    /// Noise field names referenced by any rule condition, collected once.
    /// Excludes the built-in `height` parameter.
    params: Vec<String>,
}

impl ChunkGenerator {
    /// Creates a generator over a compiled bundle.
    pub fn new(bundle: Arc<CompiledBundle>) -> Self {
        let mut names = HashSet::new();
        bundle.rules().collect_params(&mut names);
        names.remove("height");
        let mut params: Vec<String> = names.into_iter().collect();
        params.sort();
        Self {
            bundle,
            overrides: OverrideTable::new(),
            params,
        }
    }

    /// The bundle this generator was built from.
    pub fn bundle(&self) -> &CompiledBundle {
        &self.bundle
    }

    /// The cross-chunk override table.
    pub fn overrides(&self) -> &OverrideTable {
        &self.overrides
    }

    /// Runs the full generation pass for one chunk.
    ///
    /// Returns immediately if the chunk has already been generated. The same
    /// `(world seed, position)` pair always produces the same voxels, except
    /// where overrides from neighboring generations have landed.
    pub fn generate(&self, store: &ChunkStore, pos: ChunkPos) {
        let handle = store.get_or_create(pos);
        let mut chunk = lock_chunk(&handle);
        if chunk.is_generated() {
            return;
        }

        let resolver = FieldResolver::new(self.bundle.modules());
        let fields = resolver.resolve_for_chunk(pos, self.params.iter());

        chunk.set_state(GenerationState::FillingDefault);
        chunk.fill(self.bundle.default_block());
        let mut priorities: FxHashMap<LocalPos, i64> = FxHashMap::default();
        for (local, entry) in self.overrides.take(pos) {
            chunk.set_block(local, entry.block);
            priorities.insert(local, entry.priority);
        }

        chunk.set_state(GenerationState::Evaluating);
        let mut rng = chunk_rng(self.bundle.world_seed(), pos);
        let mut deferred: Vec<(ChunkPos, LocalPos, OverrideEntry)> = Vec::new();
        let mut spawned: HashSet<String> = HashSet::new();
        let origin = pos.origin();
        let forest = self.bundle.rules();

        for z in 0..CHUNK_SIZE {
            for y in 0..CHUNK_SIZE {
                for x in 0..CHUNK_SIZE {
                    let params = VoxelParams {
                        fields: &fields,
                        x,
                        y,
                        z,
                        height: (origin.y + y as i64) as f64,
                    };
                    let local = LocalPos::new(x as u8, y as u8, z as u8);
                    forest.apply(&params, &mut |priority, action| match action {
                        NodeAction::PlaceBlock(block) => {
                            write_arbitrated(&mut chunk, &mut priorities, local, *block, priority);
                        }
                        NodeAction::PlaceObject(object) => place_object(
                            &self.bundle,
                            &mut chunk,
                            &mut priorities,
                            pos,
                            local,
                            *object,
                            priority,
                            &mut rng,
                            &mut deferred,
                        ),
                        NodeAction::AddSpawnData { character, rate } => {
                            // Once per chunk per character, not per voxel.
                            if spawned.insert(character.clone()) {
                                chunk.add_spawn(SpawnEntry {
                                    character: character.clone(),
                                    rate: *rate,
                                });
                            }
                        }
                        NodeAction::Subrules(_) => {}
                    });
                }
            }
        }

        // Overrides deposited while this pass ran still arbitrate against it.
        for (local, entry) in self.overrides.take(pos) {
            write_arbitrated(&mut chunk, &mut priorities, local, entry.block, entry.priority);
        }
        chunk.set_state(GenerationState::Done);
        drop(chunk);

        let mut touched: Vec<ChunkPos> = Vec::new();
        for (target, local, entry) in deferred {
            self.overrides.try_write(target, local, entry);
            if !touched.contains(&target) {
                touched.push(target);
            }
        }
        for target in touched {
            self.patch_generated(store, target);
        }

        tracing::debug!(?pos, "generated chunk");
    }

    /// Applies a chunk's pending overrides if it has already been generated.
    /// A chunk still waiting to generate consumes them itself.
    fn patch_generated(&self, store: &ChunkStore, pos: ChunkPos) {
        let Some(handle) = store.get(pos) else {
            return;
        };
        let mut chunk = lock_chunk(&handle);
        if !chunk.is_generated() {
            return;
        }
        for (local, entry) in self.overrides.take(pos) {
            chunk.set_block(local, entry.block);
        }
    }
}

/// Writes a block unless an earlier write at the voxel holds an equal or
/// higher priority, recording the new priority on success.
fn write_arbitrated(
    chunk: &mut Chunk,
    priorities: &mut FxHashMap<LocalPos, i64>,
    local: LocalPos,
    block: BlockId,
    priority: i64,
) {
    if priorities.get(&local).is_some_and(|&held| held >= priority) {
        return;
    }
    chunk.set_block(local, block);
    priorities.insert(local, priority);
}

#[allow(clippy::too_many_arguments)]
fn place_object(
    bundle: &CompiledBundle,
    chunk: &mut Chunk,
    priorities: &mut FxHashMap<LocalPos, i64>,
    pos: ChunkPos,
    anchor: LocalPos,
    object: crate::bundle::ObjectId,
    priority: i64,
    rng: &mut ChaCha8Rng,
    deferred: &mut Vec<(ChunkPos, LocalPos, OverrideEntry)>,
) {
    let Some(template) = bundle.object(object) else {
        return;
    };
    // The orientation roll is consumed even for empty templates so that
    // editing a template does not shift later rolls in the same chunk.
    let rotation: u8 = rng.random_range(0..4);
    let anchor_world = WorldPos::from_parts(pos, anchor);
    for (offset, block) in &template.cells {
        let r = rotate_y(*offset, rotation);
        let world = anchor_world.offset(r.x as i64, r.y as i64, r.z as i64);
        let (target_chunk, target_local) = world.split();
        if target_chunk == pos {
            write_arbitrated(chunk, priorities, target_local, *block, priority);
        } else {
            deferred.push((
                target_chunk,
                target_local,
                OverrideEntry {
                    priority,
                    block: *block,
                },
            ));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{BundleBuilder, ObjectTemplate};
    use crate::noise_module::{GeneratorSource, NoiseModuleDef};
    use crate::rules::{RuleAction, RuleDef};
    use crate::seed::hash_chunk;
    use strata_voxel::{BlockDef, BlockId, BlockRegistry};

    fn registry() -> BlockRegistry {
        let mut registry = BlockRegistry::new();
        for name in ["stone", "dirt", "wood"] {
            registry
                .register(BlockDef {
                    name: name.to_string(),
                    solid: true,
                    transparent: false,
                    luminosity: 0,
                    light_color: (0, 0, 0),
                })
                .unwrap();
        }
        registry
    }

    fn place_rule(key: i64, condition: &str, block: &str) -> RuleDef {
        RuleDef {
            key,
            condition: condition.to_string(),
            action: RuleAction::PlaceBlock {
                block: block.to_string(),
            },
        }
    }

    fn pillar() -> ObjectTemplate {
        ObjectTemplate {
            name: "pillar".to_string(),
            cells: vec![
                (IVec3::new(0, 0, 0), "wood".to_string()),
                (IVec3::new(0, 1, 0), "wood".to_string()),
            ],
        }
    }

    fn generator(bundle: CompiledBundle) -> ChunkGenerator {
        ChunkGenerator::new(Arc::new(bundle))
    }

    fn block_at(store: &ChunkStore, pos: ChunkPos, local: LocalPos) -> BlockId {
        store.get(pos).unwrap().lock().unwrap().block(local)
    }

    #[test]
    fn test_height_rule_fills_below_surface() {
        let bundle = BundleBuilder::new(7, registry())
            .rule(place_rule(0, "height < 64", "stone"))
            .build()
            .unwrap();
        let stone = bundle.registry().lookup_by_name("stone").unwrap();
        let generator = generator(bundle);
        let store = ChunkStore::new();

        // Chunk (0, 1, 0) spans world y 32..64: entirely below the surface.
        generator.generate(&store, ChunkPos::new(0, 1, 0));
        // Chunk (0, 2, 0) spans world y 64..96: entirely above it.
        generator.generate(&store, ChunkPos::new(0, 2, 0));

        assert_eq!(block_at(&store, ChunkPos::new(0, 1, 0), LocalPos::new(5, 0, 5)), stone);
        assert_eq!(block_at(&store, ChunkPos::new(0, 1, 0), LocalPos::new(5, 31, 5)), stone);
        assert_eq!(
            block_at(&store, ChunkPos::new(0, 2, 0), LocalPos::new(5, 0, 5)),
            BlockId::AIR
        );
    }

    #[test]
    fn test_later_key_overwrites_earlier() {
        let bundle = BundleBuilder::new(7, registry())
            .rule(place_rule(0, "height < 64", "stone"))
            .rule(place_rule(1, "height >= 60 && height < 64", "dirt"))
            .build()
            .unwrap();
        let stone = bundle.registry().lookup_by_name("stone").unwrap();
        let dirt = bundle.registry().lookup_by_name("dirt").unwrap();
        let generator = generator(bundle);
        let store = ChunkStore::new();
        generator.generate(&store, ChunkPos::new(0, 1, 0));

        // World y 59 (local 27) keeps stone; y 60..64 (local 28..) is dirt.
        assert_eq!(block_at(&store, ChunkPos::new(0, 1, 0), LocalPos::new(0, 27, 0)), stone);
        assert_eq!(block_at(&store, ChunkPos::new(0, 1, 0), LocalPos::new(0, 28, 0)), dirt);
        assert_eq!(block_at(&store, ChunkPos::new(0, 1, 0), LocalPos::new(0, 31, 0)), dirt);
    }

    #[test]
    fn test_noise_field_drives_conditions() {
        // Terrain whose surface height is 48 plus a noise term: the bottom
        // chunk row must be solid and the top row empty in any case, since
        // the amplitude cannot reach them.
        let bundle = BundleBuilder::new(1234, registry())
            .module(
                "hills",
                NoiseModuleDef::Generator {
                    source: GeneratorSource::Simplex,
                    octaves: 3,
                    frequency: 0.02,
                    vertical_frequency: 0.02,
                    lacunarity: 2.0,
                    persistence: 0.5,
                    amplitude: 8.0,
                    offset: 0.0,
                },
            )
            .rule(place_rule(0, "height < 48 + hills", "stone"))
            .build()
            .unwrap();
        let stone = bundle.registry().lookup_by_name("stone").unwrap();
        let generator = generator(bundle);
        let store = ChunkStore::new();
        generator.generate(&store, ChunkPos::new(0, 1, 0));

        let handle = store.get(ChunkPos::new(0, 1, 0)).unwrap();
        let chunk = handle.lock().unwrap();
        for x in 0..CHUNK_SIZE as u8 {
            for z in 0..CHUNK_SIZE as u8 {
                // World y 32: below 48 - 8.
                assert_eq!(chunk.block(LocalPos::new(x, 0, z)), stone);
                // World y 63: above 48 + 8.
                assert_eq!(chunk.block(LocalPos::new(x, 31, z)), BlockId::AIR);
            }
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        let build = |seed: u64| {
            BundleBuilder::new(seed, registry())
                .module(
                    "hills",
                    NoiseModuleDef::Generator {
                        source: GeneratorSource::Perlin,
                        octaves: 4,
                        frequency: 0.03,
                        vertical_frequency: 0.015,
                        lacunarity: 2.0,
                        persistence: 0.5,
                        amplitude: 12.0,
                        offset: 0.0,
                    },
                )
                .rule(place_rule(0, "height < 48 + hills", "stone"))
                .build()
                .unwrap()
        };

        let hash_of = |seed: u64| {
            let generator = generator(build(seed));
            let store = ChunkStore::new();
            let pos = ChunkPos::new(3, 1, -2);
            generator.generate(&store, pos);
            let handle = store.get(pos).unwrap();
            let chunk = handle.lock().unwrap();
            hash_chunk(&chunk)
        };

        assert_eq!(hash_of(42), hash_of(42), "same seed must reproduce the chunk");
        assert_ne!(hash_of(42), hash_of(43), "different seeds must diverge");
    }

    #[test]
    fn test_regenerate_is_a_noop() {
        let bundle = BundleBuilder::new(7, registry())
            .rule(place_rule(0, "height < 64", "stone"))
            .build()
            .unwrap();
        let generator = generator(bundle);
        let store = ChunkStore::new();
        let pos = ChunkPos::new(0, 0, 0);

        generator.generate(&store, pos);
        let version = store.get(pos).unwrap().lock().unwrap().version();
        generator.generate(&store, pos);
        assert_eq!(store.get(pos).unwrap().lock().unwrap().version(), version);
    }

    #[test]
    fn test_object_spills_into_ungenerated_neighbor() {
        // Anchors at world y 63 (top layer of chunk (0,1,0)); the pillar's
        // upper cell lands at y 64, the bottom layer of chunk (0,2,0).
        // Vertical offsets are rotation-invariant, so every column gets one.
        let bundle = BundleBuilder::new(7, registry())
            .object(pillar())
            .rule(RuleDef {
                key: 0,
                condition: "height == 63".to_string(),
                action: RuleAction::PlaceObject {
                    object: "pillar".to_string(),
                },
            })
            .build()
            .unwrap();
        let wood = bundle.registry().lookup_by_name("wood").unwrap();
        let generator = generator(bundle);
        let store = ChunkStore::new();

        generator.generate(&store, ChunkPos::new(0, 1, 0));
        assert!(generator.overrides().pending_chunks() > 0, "spill must be deposited");

        generator.generate(&store, ChunkPos::new(0, 2, 0));
        assert_eq!(
            block_at(&store, ChunkPos::new(0, 2, 0), LocalPos::new(10, 0, 10)),
            wood,
            "override must be consumed by the neighbor's generation"
        );
        assert_eq!(generator.overrides().pending_chunks(), 0);
    }

    #[test]
    fn test_object_spills_into_generated_neighbor() {
        let bundle = BundleBuilder::new(7, registry())
            .object(pillar())
            .rule(RuleDef {
                key: 0,
                condition: "height == 63".to_string(),
                action: RuleAction::PlaceObject {
                    object: "pillar".to_string(),
                },
            })
            .build()
            .unwrap();
        let wood = bundle.registry().lookup_by_name("wood").unwrap();
        let generator = generator(bundle);
        let store = ChunkStore::new();

        // Neighbor first: the spill is patched in directly afterwards.
        generator.generate(&store, ChunkPos::new(0, 2, 0));
        generator.generate(&store, ChunkPos::new(0, 1, 0));

        assert_eq!(
            block_at(&store, ChunkPos::new(0, 2, 0), LocalPos::new(10, 0, 10)),
            wood
        );
        assert_eq!(generator.overrides().pending_chunks(), 0);
    }

    #[test]
    fn test_higher_priority_write_survives_later_rule() {
        // Root A (key 0) wraps a subrule with key 10, so its stone write
        // carries effective priority 0 + 10. Root B fires afterwards but only
        // holds preorder priority 2, so it must not clobber the stone.
        let bundle = BundleBuilder::new(7, registry())
            .rule(RuleDef {
                key: 0,
                condition: "true".to_string(),
                action: RuleAction::Subrules {
                    rules: vec![place_rule(10, "true", "stone")],
                },
            })
            .rule(place_rule(1, "true", "dirt"))
            .build()
            .unwrap();
        let stone = bundle.registry().lookup_by_name("stone").unwrap();
        let generator = generator(bundle);
        let store = ChunkStore::new();
        generator.generate(&store, ChunkPos::new(0, 0, 0));

        assert_eq!(
            block_at(&store, ChunkPos::new(0, 0, 0), LocalPos::new(3, 3, 3)),
            stone,
            "the priority-10 write must survive the later priority-2 one"
        );
    }

    #[test]
    fn test_deposited_override_outranks_lower_priority_rule() {
        // The pillar rule holds preorder priority 1, so its spilled cell
        // lands in the neighbor at priority 1; the neighbor's own stone fill
        // fires at priority 0 and must leave the wood in place.
        let bundle = BundleBuilder::new(7, registry())
            .object(pillar())
            .rule(place_rule(0, "height < 96", "stone"))
            .rule(RuleDef {
                key: 1,
                condition: "height == 63".to_string(),
                action: RuleAction::PlaceObject {
                    object: "pillar".to_string(),
                },
            })
            .build()
            .unwrap();
        let wood = bundle.registry().lookup_by_name("wood").unwrap();
        let generator = generator(bundle);
        let store = ChunkStore::new();

        generator.generate(&store, ChunkPos::new(0, 1, 0));
        generator.generate(&store, ChunkPos::new(0, 2, 0));

        assert_eq!(
            block_at(&store, ChunkPos::new(0, 2, 0), LocalPos::new(10, 0, 10)),
            wood,
            "the spilled cell carries priority 1 and must survive the fill"
        );
    }

    #[test]
    fn test_spawn_rule_records_once_per_chunk() {
        // The rule matches every voxel of the chunk, but the spawn table
        // must end up with a single wolf entry.
        let bundle = BundleBuilder::new(7, registry())
            .rule(RuleDef {
                key: 0,
                condition: "height < 64".to_string(),
                action: RuleAction::AddSpawnData {
                    character: "wolf".to_string(),
                    rate: 0.1,
                },
            })
            .build()
            .unwrap();
        let generator = generator(bundle);
        let store = ChunkStore::new();
        generator.generate(&store, ChunkPos::new(0, 0, 0));

        let handle = store.get(ChunkPos::new(0, 0, 0)).unwrap();
        let chunk = handle.lock().unwrap();
        assert_eq!(chunk.spawn_entries().len(), 1);
        assert_eq!(chunk.spawn_entries()[0].character, "wolf");
        assert_eq!(chunk.spawn_entries()[0].rate, 0.1);
        assert!(chunk.is_generated());
    }

    #[test]
    fn test_rotate_y_quarter_turns() {
        let v = IVec3::new(2, 5, 1);
        assert_eq!(rotate_y(v, 0), IVec3::new(2, 5, 1));
        assert_eq!(rotate_y(v, 1), IVec3::new(-1, 5, 2));
        assert_eq!(rotate_y(v, 2), IVec3::new(-2, 5, -1));
        assert_eq!(rotate_y(v, 3), IVec3::new(1, 5, -2));
        // Four turns is the identity.
        assert_eq!(rotate_y(rotate_y(rotate_y(rotate_y(v, 1), 1), 1), 1), v);
    }
}
