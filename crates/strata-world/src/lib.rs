//! The assembled world: chunk store, terrain generation, and lighting behind
//! one facade.

mod world;

pub use strata_lighting::DEFAULT_STEP_BUDGET;
pub use world::World;
