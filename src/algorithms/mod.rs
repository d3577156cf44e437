pub mod pattern;
pub mod plan;


// Re-export the pattern and plan types used by the orchestrator
pub use pattern::{PassPattern, PatternGenerator};
pub use plan::{Extent, PlannedStep, WipePlan, WipeStep};
