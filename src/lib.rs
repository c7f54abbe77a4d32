//! gqa: Geometric Quality Assessment for satellite image granules
//!
//! Measures how well a granule is geolocated against reference imagery. For
//! each granule the crate resolves the best reference image per intersecting
//! path/row, mosaics them, drives the external correlation tool in grid or
//! fixed-location mode, and reduces the tie-point residuals to robust
//! statistics written as a YAML report.

pub mod config;
pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use config::GqaConfig;
pub use crate::core::{GqaPipeline, GranuleInputs, GranuleOutcome};
pub use types::{
    CorrelationMode, Footprint, GqaError, GqaReport, GqaResult, PathRow, Residual, RunRecord,
    SpatialReferenceKey,
};
