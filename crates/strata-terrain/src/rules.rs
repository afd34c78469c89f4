//! The rule evaluation engine: a forest of condition/action rules applied to
//! every voxel of a chunk during the evaluation pass.
//!
//! Rules are authored as trees. Each rule carries a sort key, a condition
//! string, and an action: place a block, stamp an object template, or descend
//! into subrules. At compile time the forest is flattened into an arena in
//! preorder, siblings sorted by ascending key, and every node is assigned a
//! global priority equal to its preorder index.
//!
//! Two priorities coexist. Traversal order (and therefore last-writer-wins
//! for in-chunk block placement) follows the sort keys. The priority recorded
//! in the override table for an action under a subrule is the *parent's*
//! global priority plus the subrule's own key; a root action uses its own
//! global priority. Worlds have been authored against this scheme, so it is
//! load-bearing: see `test_subrule_priority_uses_additive_scheme`.

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use strata_voxel::BlockId;

use crate::bundle::ObjectId;
use crate::expr::{Condition, ParamSource};

/// Authoring form of a rule action.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum RuleAction {
    /// Set the voxel to the named block.
    PlaceBlock {
        /// Registered block name.
        block: String,
    },
    /// Stamp the named object template anchored at the voxel.
    PlaceObject {
        /// Object template name.
        object: String,
    },
    /// Attach an NPC spawn entry to the chunk. Recorded once per chunk per
    /// character even though the rule fires per voxel.
    AddSpawnData {
        /// Character name to spawn.
        character: String,
        /// Spawn rate (interpretation is up to the entity layer).
        rate: f32,
    },
    /// Evaluate child rules at the same voxel.
    Subrules {
        /// Child rules, evaluated in ascending key order.
        rules: Vec<RuleDef>,
    },
}

/// Authoring form of one rule.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuleDef {
    /// Sort key among siblings; also the additive term for subrule priority.
    pub key: i64,
    /// Condition source, e.g. `"height < 64 && caves > 0.3"`.
    pub condition: String,
    /// What to do when the condition holds.
    pub action: RuleAction,
}

/// Identifier of a compiled rule: its preorder index in the forest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RuleId(pub u32);

/// Action of a compiled rule node.
#[derive(Clone, Debug)]
pub(crate) enum NodeAction {
    PlaceBlock(BlockId),
    PlaceObject(ObjectId),
    AddSpawnData { character: String, rate: f32 },
    Subrules(Vec<usize>),
}

/// One compiled rule node.
#[derive(Clone, Debug)]
pub struct RuleNode {
    /// Preorder identifier.
    pub id: RuleId,
    /// Sibling sort key from the authoring definition.
    pub key: i64,
    /// Global priority (the preorder index).
    pub priority: i64,
    pub(crate) condition: Condition,
    pub(crate) action: NodeAction,
}

/// A compiled rule forest: an arena of nodes plus the root indices.
#[derive(Clone, Debug, Default)]
pub struct RuleForest {
    nodes: Vec<RuleNode>,
    roots: Vec<usize>,
}

impl RuleForest {
    /// Compiles rule definitions against block and object name lookups.
    ///
    /// A rule whose action names an unknown block or object is disarmed (its
    /// condition becomes never-true) rather than failing the whole forest;
    /// the bundle builder reports such names as errors before compiling.
    pub(crate) fn compile(
        defs: &[RuleDef],
        lookup_block: &impl Fn(&str) -> Option<BlockId>,
        lookup_object: &impl Fn(&str) -> Option<ObjectId>,
    ) -> RuleForest {
        let mut forest = RuleForest::default();
        let mut sorted: Vec<&RuleDef> = defs.iter().collect();
        sorted.sort_by_key(|d| d.key);
        for def in sorted {
            let idx = forest.compile_node(def, lookup_block, lookup_object);
            forest.roots.push(idx);
        }
        forest
    }

    fn compile_node(
        &mut self,
        def: &RuleDef,
        lookup_block: &impl Fn(&str) -> Option<BlockId>,
        lookup_object: &impl Fn(&str) -> Option<ObjectId>,
    ) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(RuleNode {
            id: RuleId(idx as u32),
            key: def.key,
            priority: idx as i64,
            condition: Condition::compile(&def.condition),
            action: NodeAction::Subrules(Vec::new()),
        });

        let action = match &def.action {
            RuleAction::PlaceBlock { block } => match lookup_block(block) {
                Some(id) => NodeAction::PlaceBlock(id),
                None => {
                    tracing::warn!(block = %block, "rule places unknown block; disarming rule");
                    self.nodes[idx].condition = Condition::never();
                    NodeAction::Subrules(Vec::new())
                }
            },
            RuleAction::PlaceObject { object } => match lookup_object(object) {
                Some(id) => NodeAction::PlaceObject(id),
                None => {
                    tracing::warn!(object = %object, "rule places unknown object; disarming rule");
                    self.nodes[idx].condition = Condition::never();
                    NodeAction::Subrules(Vec::new())
                }
            },
            RuleAction::AddSpawnData { character, rate } => NodeAction::AddSpawnData {
                character: character.clone(),
                rate: *rate,
            },
            RuleAction::Subrules { rules } => {
                let mut sorted: Vec<&RuleDef> = rules.iter().collect();
                sorted.sort_by_key(|d| d.key);
                let children = sorted
                    .into_iter()
                    .map(|child| self.compile_node(child, lookup_block, lookup_object))
                    .collect();
                NodeAction::Subrules(children)
            }
        };
        self.nodes[idx].action = action;
        idx
    }

    /// Number of compiled nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the forest has no rules.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns a compiled node by identifier.
    pub fn node(&self, id: RuleId) -> Option<&RuleNode> {
        self.nodes.get(id.0 as usize)
    }

    /// Adds every parameter referenced by any condition to `out`.
    pub fn collect_params(&self, out: &mut HashSet<String>) {
        for node in &self.nodes {
            node.condition.collect_params(out);
        }
    }

    /// Evaluates the forest at one voxel.
    ///
    /// Walks roots in key order; every matching rule fires, so a later match
    /// overwrites an earlier one when both place a block at the voxel. `sink`
    /// receives each fired leaf action together with its effective priority.
    pub(crate) fn apply(
        &self,
        params: &impl ParamSource,
        sink: &mut impl FnMut(i64, &NodeAction),
    ) {
        for &idx in &self.roots {
            let node = &self.nodes[idx];
            self.apply_node(node, node.priority, params, sink);
        }
    }

    fn apply_node(
        &self,
        node: &RuleNode,
        effective_priority: i64,
        params: &impl ParamSource,
        sink: &mut impl FnMut(i64, &NodeAction),
    ) {
        if !node.condition.is_true(params) {
            return;
        }
        match &node.action {
            NodeAction::Subrules(children) => {
                for &child_idx in children {
                    let child = &self.nodes[child_idx];
                    // A subrule's effective priority is its parent's global
                    // priority plus its own key, not its own preorder index.
                    self.apply_node(child, node.priority + child.key, params, sink);
                }
            }
            action => sink(effective_priority, action),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct Params(Vec<(&'static str, f64)>);

    impl ParamSource for Params {
        fn value(&self, name: &str) -> Option<f64> {
            self.0.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
        }
    }

    fn lookup_block(name: &str) -> Option<BlockId> {
        match name {
            "stone" => Some(BlockId(1)),
            "dirt" => Some(BlockId(2)),
            "grass" => Some(BlockId(3)),
            _ => None,
        }
    }

    fn lookup_object(name: &str) -> Option<ObjectId> {
        match name {
            "tree" => Some(ObjectId(0)),
            _ => None,
        }
    }

    fn place(key: i64, condition: &str, block: &str) -> RuleDef {
        RuleDef {
            key,
            condition: condition.to_string(),
            action: RuleAction::PlaceBlock {
                block: block.to_string(),
            },
        }
    }

    fn fired(forest: &RuleForest, params: &Params) -> Vec<(i64, BlockId)> {
        let mut out = Vec::new();
        forest.apply(params, &mut |priority, action| {
            if let NodeAction::PlaceBlock(id) = action {
                out.push((priority, *id));
            }
        });
        out
    }

    #[test]
    fn test_roots_fire_in_key_order() {
        // Authored out of order on purpose.
        let defs = vec![place(5, "true", "dirt"), place(1, "true", "stone")];
        let forest = RuleForest::compile(&defs, &lookup_block, &lookup_object);
        let fired = fired(&forest, &Params(Vec::new()));
        assert_eq!(
            fired,
            vec![(0, BlockId(1)), (1, BlockId(2))],
            "lower key fires first and takes the lower preorder priority"
        );
    }

    #[test]
    fn test_condition_gates_subtree() {
        let defs = vec![RuleDef {
            key: 0,
            condition: "height < 64".to_string(),
            action: RuleAction::Subrules {
                rules: vec![place(0, "true", "stone")],
            },
        }];
        let forest = RuleForest::compile(&defs, &lookup_block, &lookup_object);

        assert_eq!(fired(&forest, &Params(vec![("height", 10.0)])).len(), 1);
        assert!(fired(&forest, &Params(vec![("height", 100.0)])).is_empty());
    }

    #[test]
    fn test_subrule_priority_uses_additive_scheme() {
        // Root A (key 0) wraps a subrule with key 10; root B has key 1. The
        // subrule's effective priority is A.priority + 10 = 10, not its own
        // preorder index 1, so it outranks B (preorder priority 2).
        let defs = vec![
            RuleDef {
                key: 0,
                condition: "true".to_string(),
                action: RuleAction::Subrules {
                    rules: vec![place(10, "true", "stone")],
                },
            },
            place(1, "true", "dirt"),
        ];
        let forest = RuleForest::compile(&defs, &lookup_block, &lookup_object);
        let fired = fired(&forest, &Params(Vec::new()));
        assert_eq!(fired, vec![(10, BlockId(1)), (2, BlockId(2))]);
    }

    #[test]
    fn test_unknown_block_disarms_rule_only() {
        let defs = vec![place(0, "true", "bogus"), place(1, "true", "stone")];
        let forest = RuleForest::compile(&defs, &lookup_block, &lookup_object);
        let fired = fired(&forest, &Params(Vec::new()));
        assert_eq!(fired, vec![(1, BlockId(1))], "only the valid rule fires");
    }

    #[test]
    fn test_malformed_condition_disarms_rule_only() {
        let defs = vec![place(0, "height <<< 3", "dirt"), place(1, "true", "stone")];
        let forest = RuleForest::compile(&defs, &lookup_block, &lookup_object);
        let fired = fired(&forest, &Params(Vec::new()));
        assert_eq!(fired, vec![(1, BlockId(1))]);
    }

    #[test]
    fn test_collect_params_walks_whole_forest() {
        let defs = vec![RuleDef {
            key: 0,
            condition: "height < 64".to_string(),
            action: RuleAction::Subrules {
                rules: vec![place(0, "caves > 0.3", "stone")],
            },
        }];
        let forest = RuleForest::compile(&defs, &lookup_block, &lookup_object);
        let mut params = HashSet::new();
        forest.collect_params(&mut params);
        assert!(params.contains("height"));
        assert!(params.contains("caves"));
    }

    #[test]
    fn test_rule_defs_load_from_json() {
        let json = r#"{
            "key": 2,
            "condition": "height < 64",
            "action": { "Subrules": { "rules": [
                { "key": 0, "condition": "true",
                  "action": { "PlaceBlock": { "block": "stone" } } }
            ] } }
        }"#;
        let def: RuleDef = serde_json::from_str(json).unwrap();
        assert_eq!(def.key, 2);

        let forest = RuleForest::compile(
            std::slice::from_ref(&def),
            &lookup_block,
            &lookup_object,
        );
        let fired = fired(&forest, &Params(vec![("height", 10.0)]));
        // Effective priority: parent preorder 0 plus subrule key 0.
        assert_eq!(fired, vec![(0, BlockId(1))]);
    }

    #[test]
    fn test_object_action_fires() {
        let defs = vec![RuleDef {
            key: 0,
            condition: "true".to_string(),
            action: RuleAction::PlaceObject {
                object: "tree".to_string(),
            },
        }];
        let forest = RuleForest::compile(&defs, &lookup_block, &lookup_object);
        let mut objects = Vec::new();
        forest.apply(&Params(Vec::new()), &mut |priority, action| {
            if let NodeAction::PlaceObject(id) = action {
                objects.push((priority, *id));
            }
        });
        assert_eq!(objects, vec![(0, ObjectId(0))]);
    }
}
