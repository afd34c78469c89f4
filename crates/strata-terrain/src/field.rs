//! Per-chunk sampled noise fields and the lazy dependency resolver.
//!
//! A [`NoiseField`] covers one chunk's volume plus a one-voxel border on
//! every axis. Generator and combinator modules are evaluated at a coarse
//! stride and filled in by trilinear interpolation; stride-aligned voxels
//! keep the raw sampled value exactly. Value-storage modules are resolved by
//! an iterative work queue that defers entries until their inputs' fields are
//! finished, falling back to an all-zero field for unknown names and
//! self-references.
//!
//! Fields are cached for one generation pass only and discarded afterwards.

use std::collections::VecDeque;

use hashbrown::{HashMap, HashSet};
use strata_voxel::{CHUNK_SIZE, ChunkPos};

use crate::noise_module::NoiseModuleSet;

/// Samples per field axis: the chunk size plus one border voxel.
pub const FIELD_DIM: usize = CHUNK_SIZE + 1;

/// Horizontal (x, z) coarse sampling stride. Divides `CHUNK_SIZE`.
pub const SAMPLE_STRIDE_H: usize = 4;

/// Vertical (y) coarse sampling stride. Divides `CHUNK_SIZE`.
pub const SAMPLE_STRIDE_V: usize = 4;

/// A dense `FIELD_DIM`³ grid of scalar noise values for one chunk.
#[derive(Clone, Debug)]
pub struct NoiseField {
    values: Vec<f64>,
}

impl NoiseField {
    /// Creates an all-zero field.
    pub fn zero() -> Self {
        Self {
            values: vec![0.0; FIELD_DIM * FIELD_DIM * FIELD_DIM],
        }
    }

    /// Returns the value at `(x, y, z)`. Each coordinate must be in `0..FIELD_DIM`.
    pub fn get(&self, x: usize, y: usize, z: usize) -> f64 {
        self.values[Self::index(x, y, z)]
    }

    /// Sets the value at `(x, y, z)`.
    pub fn set(&mut self, x: usize, y: usize, z: usize, value: f64) {
        self.values[Self::index(x, y, z)] = value;
    }

    fn index(x: usize, y: usize, z: usize) -> usize {
        debug_assert!(x < FIELD_DIM && y < FIELD_DIM && z < FIELD_DIM);
        x + y * FIELD_DIM + z * FIELD_DIM * FIELD_DIM
    }
}

/// Splits a field coordinate into its coarse cell for one axis.
///
/// Returns `(lo, hi, t)` where `lo`/`hi` are the surrounding lattice points
/// and `t` is the fractional offset. Aligned coordinates return `t = 0` with
/// `hi == lo`, so interpolation reproduces the raw sample with zero error.
fn axis_cell(v: usize, stride: usize) -> (usize, usize, f64) {
    let r = v % stride;
    if r == 0 {
        (v, v, 0.0)
    } else {
        let lo = v - r;
        (lo, lo + stride, r as f64 / stride as f64)
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Resolves the noise fields one chunk generation pass needs.
pub struct FieldResolver<'a> {
    modules: &'a NoiseModuleSet,
}

impl<'a> FieldResolver<'a> {
    /// Creates a resolver over the bundle's module set.
    pub fn new(modules: &'a NoiseModuleSet) -> Self {
        Self { modules }
    }

    /// Produces one field per requested module name for the given chunk.
    ///
    /// The requested set must not include the built-in `height` parameter,
    /// which is bound per voxel by the rule engine instead.
    ///
    /// Resolution is an iterative work queue, not a topological sort: storage
    /// modules whose inputs are not yet computed are re-enqueued until every
    /// input has resolved to either a finished field or the zero default.
    /// Unknown names and self-references yield all-zero fields and never fail.
    pub fn resolve_for_chunk(
        &self,
        chunk: ChunkPos,
        requested: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> HashMap<String, NoiseField> {
        let mut computed: HashMap<String, NoiseField> = HashMap::new();
        let mut registered: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();

        for name in requested {
            let name = name.as_ref();
            if registered.insert(name.to_string()) {
                queue.push_back(name.to_string());
            }
        }

        // Each discovered name is registered exactly once, so the queue
        // settles; the cap only guards against a corrupt bundle with a
        // storage-module cycle the builder failed to reject.
        let mut remaining = 64 * (registered.len() + 16) * (registered.len() + 16);

        while let Some(name) = queue.pop_front() {
            if computed.contains_key(&name) {
                continue;
            }
            if remaining == 0 {
                tracing::error!(module = %name, "noise resolution did not settle; zero-filling");
                computed.insert(name, NoiseField::zero());
                continue;
            }
            remaining -= 1;

            if !self.modules.contains(&name) {
                computed.insert(name, NoiseField::zero());
                continue;
            }

            if let Some((op, inputs)) = self.modules.stored_inputs(&name) {
                // Unknown or self-referential input: the whole field defaults
                // to zero.
                if inputs
                    .iter()
                    .any(|input| input == &name || !self.modules.contains(input))
                {
                    computed.insert(name, NoiseField::zero());
                    continue;
                }

                // Newly discovered inputs are registered and the current name
                // deferred behind them.
                let mut deferred = false;
                for input in inputs {
                    if registered.insert(input.clone()) {
                        queue.push_back(input.clone());
                        deferred = true;
                    }
                }
                if deferred {
                    queue.push_back(name);
                    continue;
                }

                // Registered but still pending inputs: retry later.
                if inputs.iter().any(|input| !computed.contains_key(input)) {
                    queue.push_back(name);
                    continue;
                }

                let mut field = NoiseField::zero();
                for y in 0..FIELD_DIM {
                    for z in 0..FIELD_DIM {
                        for x in 0..FIELD_DIM {
                            let value =
                                op.fold(inputs.iter().map(|input| computed[input].get(x, y, z)));
                            field.set(x, y, z, value);
                        }
                    }
                }
                computed.insert(name, field);
                continue;
            }

            let field = self.sample_field(&name, chunk);
            computed.insert(name, field);
        }

        computed
    }

    /// Samples a generator or combinator module over one chunk volume plus
    /// border, at coarse stride, then interpolates the rest trilinearly.
    fn sample_field(&self, name: &str, chunk: ChunkPos) -> NoiseField {
        let origin = chunk.origin();
        let mut field = NoiseField::zero();

        for y in (0..FIELD_DIM).step_by(SAMPLE_STRIDE_V) {
            for z in (0..FIELD_DIM).step_by(SAMPLE_STRIDE_H) {
                for x in (0..FIELD_DIM).step_by(SAMPLE_STRIDE_H) {
                    let value = self.modules.sample(
                        name,
                        (origin.x + x as i64) as f64,
                        (origin.y + y as i64) as f64,
                        (origin.z + z as i64) as f64,
                    );
                    field.set(x, y, z, value);
                }
            }
        }

        for y in 0..FIELD_DIM {
            let (y0, y1, ty) = axis_cell(y, SAMPLE_STRIDE_V);
            for z in 0..FIELD_DIM {
                let (z0, z1, tz) = axis_cell(z, SAMPLE_STRIDE_H);
                for x in 0..FIELD_DIM {
                    let (x0, x1, tx) = axis_cell(x, SAMPLE_STRIDE_H);
                    if tx == 0.0 && ty == 0.0 && tz == 0.0 {
                        continue;
                    }
                    let c00 = lerp(field.get(x0, y0, z0), field.get(x1, y0, z0), tx);
                    let c10 = lerp(field.get(x0, y1, z0), field.get(x1, y1, z0), tx);
                    let c01 = lerp(field.get(x0, y0, z1), field.get(x1, y0, z1), tx);
                    let c11 = lerp(field.get(x0, y1, z1), field.get(x1, y1, z1), tx);
                    let c0 = lerp(c00, c10, ty);
                    let c1 = lerp(c01, c11, ty);
                    field.set(x, y, z, lerp(c0, c1, tz));
                }
            }
        }

        field
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
