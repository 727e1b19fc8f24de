//! Size sampling module
//!
//! Provides the fixed-name sampler (one statistics command per name) and the
//! two-phase row-count sampler (batched planner estimates, exact counts for
//! small tables), plus the per-engine statements both rely on.

mod queries;
mod row_count;
mod sample;
mod size;


pub use queries::*;
pub use row_count::*;
pub use sample::*;
pub use size::*;
