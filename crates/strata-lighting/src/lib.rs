//! Voxel light propagation: colored block light and a sunlight channel,
//! spread by budgeted breadth-first flood fill across chunk borders.

mod engine;
mod queue;

pub use engine::{DEFAULT_STEP_BUDGET, LightEngine};
pub use queue::LightNode;
