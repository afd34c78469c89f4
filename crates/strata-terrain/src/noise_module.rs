//! Named noise modules: primitive fBm generators, pointwise combinators, and
//! value-storage nodes that alias already-computed fields.
//!
//! Generators composite multiple octaves of coherent noise, each octave
//! doubling in frequency and halving in amplitude by default. Combinators
//! evaluate their named inputs recursively at sample time. Value-storage
//! modules are never sampled directly; the field resolver computes them from
//! their inputs' finished fields.

use hashbrown::HashMap;
use noise::{NoiseFn, Perlin, RidgedMulti, Simplex};
use serde::{Deserialize, Serialize};

use crate::seed::derive_module_seed;

/// Primitive coherent-noise source for a generator module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeneratorSource {
    /// Classic Perlin gradient noise.
    Perlin,
    /// Simplex noise (fewer directional artifacts).
    Simplex,
    /// Ridged multifractal, useful for mountain crests.
    Ridged,
}

/// Pointwise combination operator for combinator and value-storage modules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombineOp {
    /// Sum of all inputs.
    Add,
    /// First input minus the remaining inputs.
    Sub,
    /// Product of all inputs.
    Mul,
    /// Minimum of all inputs.
    Min,
    /// Maximum of all inputs.
    Max,
    /// Arithmetic mean of all inputs.
    Avg,
}

impl CombineOp {
    /// Folds a sequence of input values into one.
    ///
    /// An empty sequence folds to 0 for every operator.
    pub fn fold(self, mut values: impl Iterator<Item = f64>) -> f64 {
        let Some(first) = values.next() else {
            return 0.0;
        };
        match self {
            CombineOp::Add => first + values.sum::<f64>(),
            CombineOp::Sub => first - values.sum::<f64>(),
            CombineOp::Mul => values.fold(first, |acc, v| acc * v),
            CombineOp::Min => values.fold(first, f64::min),
            CombineOp::Max => values.fold(first, f64::max),
            CombineOp::Avg => {
                let mut sum = first;
                let mut count = 1usize;
                for v in values {
                    sum += v;
                    count += 1;
                }
                sum / count as f64
            }
        }
    }
}

/// Authoring definition of one named noise module.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum NoiseModuleDef {
    /// A primitive generator: a deterministic function of world coordinates
    /// and the per-module seed.
    Generator {
        /// Which noise primitive to sample.
        source: GeneratorSource,
        /// Number of fBm octaves.
        octaves: u32,
        /// Horizontal frequency of the first octave (cycles per voxel).
        frequency: f64,
        /// Vertical frequency of the first octave. Terrain is usually
        /// stretched vertically, so this is authored separately.
        vertical_frequency: f64,
        /// Frequency multiplier between octaves.
        lacunarity: f64,
        /// Amplitude multiplier between octaves.
        persistence: f64,
        /// Amplitude of the first octave.
        amplitude: f64,
        /// Constant added to the composited value.
        offset: f64,
    },
    /// A combinator: combines other named modules pointwise at sample time.
    Combine {
        /// Combination operator.
        op: CombineOp,
        /// Names of the input modules, evaluated in order.
        inputs: Vec<String>,
    },
    /// A value-storage node: aliases other modules' already-computed fields
    /// without resampling. Resolved by the field resolver's work queue.
    Stored {
        /// Combination operator applied cellwise to the input fields.
        op: CombineOp,
        /// Names of the input fields.
        inputs: Vec<String>,
    },
}

/// A seeded primitive noise function.
enum SourceFn {
    Perlin(Perlin),
    Simplex(Simplex),
    Ridged(RidgedMulti<Perlin>),
}

impl SourceFn {
    fn new(source: GeneratorSource, seed: u32) -> Self {
        match source {
            GeneratorSource::Perlin => SourceFn::Perlin(Perlin::new(seed)),
            GeneratorSource::Simplex => SourceFn::Simplex(Simplex::new(seed)),
            GeneratorSource::Ridged => SourceFn::Ridged(RidgedMulti::new(seed)),
        }
    }

    fn get(&self, point: [f64; 3]) -> f64 {
        match self {
            SourceFn::Perlin(n) => n.get(point),
            SourceFn::Simplex(n) => n.get(point),
            SourceFn::Ridged(n) => n.get(point),
        }
    }
}

/// One compiled module.
pub(crate) enum CompiledModule {
    Generator {
        noise: SourceFn,
        octaves: u32,
        frequency: f64,
        vertical_frequency: f64,
        lacunarity: f64,
        persistence: f64,
        amplitude: f64,
        offset: f64,
    },
    Combine {
        op: CombineOp,
        inputs: Vec<String>,
    },
    Stored {
        op: CombineOp,
        inputs: Vec<String>,
    },
}

/// All compiled noise modules of a bundle, keyed by name.
///
/// Generators are seeded once, at compile time, from the world seed and the
/// module name.
pub struct NoiseModuleSet {
    modules: HashMap<String, CompiledModule>,
}

impl NoiseModuleSet {
    /// Compiles the given definitions against a world seed.
    pub fn compile<'a>(
        defs: impl IntoIterator<Item = (&'a str, &'a NoiseModuleDef)>,
        world_seed: u64,
    ) -> Self {
        let mut modules = HashMap::new();
        for (name, def) in defs {
            let compiled = match def {
                NoiseModuleDef::Generator {
                    source,
                    octaves,
                    frequency,
                    vertical_frequency,
                    lacunarity,
                    persistence,
                    amplitude,
                    offset,
                } => CompiledModule::Generator {
                    noise: SourceFn::new(*source, derive_module_seed(world_seed, name)),
                    octaves: *octaves,
                    frequency: *frequency,
                    vertical_frequency: *vertical_frequency,
                    lacunarity: *lacunarity,
                    persistence: *persistence,
                    amplitude: *amplitude,
                    offset: *offset,
                },
                NoiseModuleDef::Combine { op, inputs } => CompiledModule::Combine {
                    op: *op,
                    inputs: inputs.clone(),
                },
                NoiseModuleDef::Stored { op, inputs } => CompiledModule::Stored {
                    op: *op,
                    inputs: inputs.clone(),
                },
            };
            modules.insert(name.to_string(), compiled);
        }
        Self { modules }
    }

    /// Returns `true` if `name` is a module in this set.
    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Returns the operator and input names of a value-storage module, or
    /// `None` if `name` is unknown or not of storage kind.
    pub fn stored_inputs(&self, name: &str) -> Option<(CombineOp, &[String])> {
        match self.modules.get(name) {
            Some(CompiledModule::Stored { op, inputs }) => Some((*op, inputs)),
            _ => None,
        }
    }

    /// Evaluates a module at a world coordinate.
    ///
    /// Unknown names and value-storage modules evaluate to 0 (storage modules
    /// are only meaningful as resolved fields).
    pub fn sample(&self, name: &str, x: f64, y: f64, z: f64) -> f64 {
        match self.modules.get(name) {
            None => 0.0,
            Some(CompiledModule::Stored { .. }) => 0.0,
            Some(CompiledModule::Combine { op, inputs }) => {
                op.fold(inputs.iter().map(|input| self.sample(input, x, y, z)))
            }
            Some(CompiledModule::Generator {
                noise,
                octaves,
                frequency,
                vertical_frequency,
                lacunarity,
                persistence,
                amplitude,
                offset,
            }) => {
                let mut total = *offset;
                let mut freq = *frequency;
                let mut vfreq = *vertical_frequency;
                let mut amp = *amplitude;
                for _ in 0..*octaves {
                    total += noise.get([x * freq, y * vfreq, z * freq]) * amp;
                    freq *= lacunarity;
                    vfreq *= lacunarity;
                    amp *= persistence;
                }
                total
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn generator_def(amplitude: f64, offset: f64) -> NoiseModuleDef {
        NoiseModuleDef::Generator {
            source: GeneratorSource::Simplex,
            octaves: 3,
            frequency: 0.05,
            vertical_frequency: 0.02,
            lacunarity: 2.0,
            persistence: 0.5,
            amplitude,
            offset,
        }
    }

    fn compile(defs: &[(&str, NoiseModuleDef)], seed: u64) -> NoiseModuleSet {
        NoiseModuleSet::compile(defs.iter().map(|(n, d)| (*n, d)), seed)
    }

    #[test]
    fn test_generator_deterministic_per_seed() {
        let defs = [("base", generator_def(10.0, 0.0))];
        let a = compile(&defs, 42);
        let b = compile(&defs, 42);
        let c = compile(&defs, 43);

        let va = a.sample("base", 12.0, 34.0, 56.0);
        assert_eq!(va, b.sample("base", 12.0, 34.0, 56.0));
        assert_ne!(va, c.sample("base", 12.0, 34.0, 56.0));
    }

    #[test]
    fn test_same_params_different_names_differ() {
        let defs = [
            ("hills", generator_def(10.0, 0.0)),
            ("caves", generator_def(10.0, 0.0)),
        ];
        let set = compile(&defs, 7);
        // Identical parameters but independent per-name seeding.
        assert_ne!(
            set.sample("hills", 5.0, 5.0, 5.0),
            set.sample("caves", 5.0, 5.0, 5.0)
        );
    }

    #[test]
    fn test_zero_amplitude_yields_offset() {
        let defs = [("flat", generator_def(0.0, 3.5))];
        let set = compile(&defs, 1);
        assert_eq!(set.sample("flat", 100.0, 0.0, -20.0), 3.5);
    }

    #[test]
    fn test_combine_adds_inputs_pointwise() {
        let defs = [
            ("a", generator_def(0.0, 2.0)),
            ("b", generator_def(0.0, 5.0)),
            (
                "sum",
                NoiseModuleDef::Combine {
                    op: CombineOp::Add,
                    inputs: vec!["a".to_string(), "b".to_string()],
                },
            ),
        ];
        let set = compile(&defs, 1);
        assert_eq!(set.sample("sum", 0.0, 0.0, 0.0), 7.0);
    }

    #[test]
    fn test_unknown_and_stored_sample_to_zero() {
        let defs = [(
            "store",
            NoiseModuleDef::Stored {
                op: CombineOp::Avg,
                inputs: vec!["missing".to_string()],
            },
        )];
        let set = compile(&defs, 1);
        assert_eq!(set.sample("missing", 1.0, 2.0, 3.0), 0.0);
        assert_eq!(set.sample("store", 1.0, 2.0, 3.0), 0.0);
    }

    #[test]
    fn test_combine_op_folds() {
        let vals = |v: &[f64]| v.to_vec().into_iter();
        assert_eq!(CombineOp::Add.fold(vals(&[1.0, 2.0, 3.0])), 6.0);
        assert_eq!(CombineOp::Sub.fold(vals(&[10.0, 2.0, 3.0])), 5.0);
        assert_eq!(CombineOp::Mul.fold(vals(&[2.0, 3.0, 4.0])), 24.0);
        assert_eq!(CombineOp::Min.fold(vals(&[5.0, -1.0, 3.0])), -1.0);
        assert_eq!(CombineOp::Max.fold(vals(&[5.0, -1.0, 3.0])), 5.0);
        assert_eq!(CombineOp::Avg.fold(vals(&[2.0, 4.0])), 3.0);
        assert_eq!(CombineOp::Add.fold(vals(&[])), 0.0);
    }
}
