//! Analysis and comparison engines.
//!
//! Both engines share an [`EngineCore`] holding the model selector and the
//! report store.

mod analysis;
mod comparison;
mod core;

pub use analysis::{analysis_schema, AnalysisEngine};
pub use comparison::{
    ComparisonEngine, ComparisonResult, ComparisonSummary, Direction, DirectionCounts, TrendDelta,
    NARRATIVE_UNAVAILABLE,
};
pub use core::EngineCore;
