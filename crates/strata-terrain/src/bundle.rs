//! World definition bundles: block registry, noise module graph, rule
//! forest, and object templates, compiled as one unit against a world seed.
//!
//! The builder validates everything that can be checked statically (name
//! resolution, duplicate names, storage-module cycles) so generation itself
//! never has to fail. Runtime oddities that slip past validation degrade to
//! fail-safe defaults instead.

use std::fmt;

use glam::IVec3;
use hashbrown::{HashMap, HashSet};
use thiserror::Error;

use strata_voxel::{BlockId, BlockRegistry};

use crate::noise_module::{NoiseModuleDef, NoiseModuleSet};
use crate::rules::{RuleAction, RuleDef, RuleForest};

/// Identifier of a compiled object template.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectId(pub u32);

/// Authoring form of a multi-voxel object (a tree, a boulder, a ruin).
///
/// Cells are offsets from the anchor voxel the placing rule matched. At stamp
/// time the template is rotated around the vertical axis by a per-chunk
/// deterministic roll, so offsets are authored unrotated.
#[derive(Clone, Debug)]
pub struct ObjectTemplate {
    /// Unique template name, referenced by `PlaceObject` rules.
    pub name: String,
    /// `(offset, block name)` pairs.
    pub cells: Vec<(IVec3, String)>,
}

/// A compiled object: offsets with resolved block identifiers.
#[derive(Clone, Debug)]
pub(crate) struct CompiledObject {
    pub(crate) cells: Vec<(IVec3, BlockId)>,
}

/// Errors reported while building a bundle.
#[derive(Debug, Error, PartialEq)]
pub enum BundleError {
    /// A rule, template, or the default block names an unregistered block.
    #[error("unknown block name: {0}")]
    UnknownBlock(String),
    /// A rule names an object template that was never added.
    #[error("unknown object name: {0}")]
    UnknownObject(String),
    /// Two noise modules share a name.
    #[error("duplicate noise module name: {0}")]
    DuplicateModule(String),
    /// Two object templates share a name.
    #[error("duplicate object name: {0}")]
    DuplicateObject(String),
    /// Value-storage modules form a cycle of two or more nodes, which the
    /// field resolver's work queue could never finish.
    #[error("storage module cycle through: {0}")]
    StoredCycle(String),
}

/// Builder for a [`CompiledBundle`].
pub struct BundleBuilder {
    world_seed: u64,
    registry: BlockRegistry,
    modules: Vec<(String, NoiseModuleDef)>,
    default_block: Option<String>,
    rules: Vec<RuleDef>,
    objects: Vec<ObjectTemplate>,
}

impl BundleBuilder {
    /// Starts a bundle over an already-populated block registry.
    pub fn new(world_seed: u64, registry: BlockRegistry) -> Self {
        Self {
            world_seed,
            registry,
            modules: Vec::new(),
            default_block: None,
            rules: Vec::new(),
            objects: Vec::new(),
        }
    }

    /// Adds a named noise module.
    pub fn module(mut self, name: impl Into<String>, def: NoiseModuleDef) -> Self {
        self.modules.push((name.into(), def));
        self
    }

    /// Sets the block the default-fill pass places below the height surface.
    /// Unset means air (a rules-only world).
    pub fn default_block(mut self, name: impl Into<String>) -> Self {
        self.default_block = Some(name.into());
        self
    }

    /// Adds a root rule.
    pub fn rule(mut self, def: RuleDef) -> Self {
        self.rules.push(def);
        self
    }

    /// Adds an object template.
    pub fn object(mut self, template: ObjectTemplate) -> Self {
        self.objects.push(template);
        self
    }

    /// Validates and compiles the bundle.
    pub fn build(self) -> Result<CompiledBundle, BundleError> {
        let mut module_names = HashSet::new();
        for (name, _) in &self.modules {
            if !module_names.insert(name.as_str()) {
                return Err(BundleError::DuplicateModule(name.clone()));
            }
        }
        check_stored_cycles(&self.modules)?;

        let default_block = match &self.default_block {
            None => BlockId::AIR,
            Some(name) => self
                .registry
                .lookup_by_name(name)
                .ok_or_else(|| BundleError::UnknownBlock(name.clone()))?,
        };

        let mut object_ids: HashMap<String, ObjectId> = HashMap::new();
        let mut objects = Vec::with_capacity(self.objects.len());
        for template in &self.objects {
            if object_ids.contains_key(&template.name) {
                return Err(BundleError::DuplicateObject(template.name.clone()));
            }
            let mut cells = Vec::with_capacity(template.cells.len());
            for (offset, block_name) in &template.cells {
                let block = self
                    .registry
                    .lookup_by_name(block_name)
                    .ok_or_else(|| BundleError::UnknownBlock(block_name.clone()))?;
                cells.push((*offset, block));
            }
            object_ids.insert(template.name.clone(), ObjectId(objects.len() as u32));
            objects.push(CompiledObject { cells });
        }

        for rule in &self.rules {
            check_rule_names(rule, &self.registry, &object_ids)?;
        }

        let forest = RuleForest::compile(
            &self.rules,
            &|name| self.registry.lookup_by_name(name),
            &|name| object_ids.get(name).copied(),
        );

        let modules = NoiseModuleSet::compile(
            self.modules.iter().map(|(n, d)| (n.as_str(), d)),
            self.world_seed,
        );

        Ok(CompiledBundle {
            world_seed: self.world_seed,
            registry: self.registry,
            modules,
            default_block,
            forest,
            objects,
            object_ids,
        })
    }
}

fn check_rule_names(
    rule: &RuleDef,
    registry: &BlockRegistry,
    objects: &HashMap<String, ObjectId>,
) -> Result<(), BundleError> {
    match &rule.action {
        RuleAction::PlaceBlock { block } => {
            if registry.lookup_by_name(block).is_none() {
                return Err(BundleError::UnknownBlock(block.clone()));
            }
        }
        RuleAction::PlaceObject { object } => {
            if !objects.contains_key(object) {
                return Err(BundleError::UnknownObject(object.clone()));
            }
        }
        RuleAction::AddSpawnData { .. } => {}
        RuleAction::Subrules { rules } => {
            for child in rules {
                check_rule_names(child, registry, objects)?;
            }
        }
    }
    Ok(())
}

/// Rejects storage-module cycles of length two or more. A module listing
/// itself as an input is legal; the resolver reads it as a zero field.
fn check_stored_cycles(modules: &[(String, NoiseModuleDef)]) -> Result<(), BundleError> {
    let stored: HashMap<&str, &[String]> = modules
        .iter()
        .filter_map(|(name, def)| match def {
            NoiseModuleDef::Stored { inputs, .. } => Some((name.as_str(), inputs.as_slice())),
            _ => None,
        })
        .collect();

    // Iterative DFS with tricolor marking over the storage subgraph.
    let mut done: HashSet<&str> = HashSet::new();
    for &start in stored.keys() {
        if done.contains(start) {
            continue;
        }
        let mut on_path: HashSet<&str> = HashSet::new();
        let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
        on_path.insert(start);
        while let Some((name, next_input)) = stack.pop() {
            let inputs = stored[name];
            let mut advanced = false;
            for (i, input) in inputs.iter().enumerate().skip(next_input) {
                let input = input.as_str();
                if input == name || !stored.contains_key(input) || done.contains(input) {
                    continue;
                }
                if on_path.contains(input) {
                    return Err(BundleError::StoredCycle(input.to_string()));
                }
                stack.push((name, i + 1));
                stack.push((input, 0));
                on_path.insert(input);
                advanced = true;
                break;
            }
            if !advanced {
                on_path.remove(name);
                done.insert(name);
            }
        }
    }
    Ok(())
}

/// A validated, seeded world definition.
pub struct CompiledBundle {
    world_seed: u64,
    registry: BlockRegistry,
    modules: NoiseModuleSet,
    default_block: BlockId,
    forest: RuleForest,
    objects: Vec<CompiledObject>,
    object_ids: HashMap<String, ObjectId>,
}

impl CompiledBundle {
    /// The world seed everything in this bundle derives from.
    pub fn world_seed(&self) -> u64 {
        self.world_seed
    }

    /// The block registry.
    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    /// The compiled noise modules.
    pub fn modules(&self) -> &NoiseModuleSet {
        &self.modules
    }

    /// Block placed by the default-fill pass below the height surface.
    pub fn default_block(&self) -> BlockId {
        self.default_block
    }

    /// The compiled rule forest.
    pub fn rules(&self) -> &RuleForest {
        &self.forest
    }

    /// Looks up an object template by name.
    pub fn object_id(&self, name: &str) -> Option<ObjectId> {
        self.object_ids.get(name).copied()
    }

    pub(crate) fn object(&self, id: ObjectId) -> Option<&CompiledObject> {
        self.objects.get(id.0 as usize)
    }
}

impl fmt::Debug for CompiledBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledBundle")
            .field("world_seed", &self.world_seed)
            .field("default_block", &self.default_block)
            .field("rules", &self.forest.len())
            .field("objects", &self.objects.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
