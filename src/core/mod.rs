//! Core GQA processing modules

pub mod correlation;
pub mod pipeline;
pub mod reference;
pub mod report;
pub mod statistics;

// Re-export main types
pub use correlation::{BandSource, CorrelationPlan, CorrelationRunner, GranuleInputs};
pub use pipeline::{GqaPipeline, GranuleOutcome};
pub use reference::{build_vrt, most_common, nearest_in_time, ReferenceResolver};
pub use report::{assemble_report, write_report, Analysis};
pub use statistics::{calculate_gqa, GqaStatistics};
