//! Procedural chunk generation: noise module graphs, per-chunk noise fields,
//! the rule evaluation engine, and the cross-chunk override table.

mod expr;
mod field;
mod generator;
mod noise_module;
mod overrides;
mod rules;
mod seed;

pub mod bundle;

pub use bundle::{BundleBuilder, BundleError, CompiledBundle, ObjectId, ObjectTemplate};
pub use expr::{Condition, EvalError, Expr, ParamSource, ParseError};
pub use field::{FIELD_DIM, FieldResolver, NoiseField, SAMPLE_STRIDE_H, SAMPLE_STRIDE_V};
pub use generator::ChunkGenerator;
pub use noise_module::{CombineOp, GeneratorSource, NoiseModuleDef, NoiseModuleSet};
pub use overrides::{OverrideEntry, OverrideTable};
pub use rules::{RuleAction, RuleDef, RuleForest, RuleId, RuleNode};
pub use seed::{chunk_rng, derive_chunk_seed, derive_module_seed, hash_chunk};
