use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

/// Geographic coordinate as (longitude, latitude) in degrees
pub type LonLat = (f64, f64);

/// Scene footprint built from the four corner coordinates of a granule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    pub upper_left: LonLat,
    pub upper_right: LonLat,
    pub lower_right: LonLat,
    pub lower_left: LonLat,
}

impl Footprint {
    pub fn new(upper_left: LonLat, upper_right: LonLat, lower_right: LonLat, lower_left: LonLat) -> Self {
        Self {
            upper_left,
            upper_right,
            lower_right,
            lower_left,
        }
    }

    /// Corners in ring order (UL, UR, LR, LL)
    pub fn ring(&self) -> [LonLat; 4] {
        [self.upper_left, self.upper_right, self.lower_right, self.lower_left]
    }

    /// Closed WKT polygon, suitable for OGR spatial filters
    pub fn to_wkt(&self) -> String {
        let ring = self.ring();
        let coords: Vec<String> = ring
            .iter()
            .chain(std::iter::once(&ring[0]))
            .map(|(lon, lat)| format!("{} {}", lon, lat))
            .collect();
        format!("POLYGON (({}))", coords.join(", "))
    }
}

/// Landsat WRS-2 path/row identifying a scene-index tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathRow {
    pub path: u32,
    pub row: u32,
}

impl PathRow {
    pub fn new(path: u32, row: u32) -> Self {
        Self { path, row }
    }

    /// Zero-padded (path, row) directory components, e.g. ("090", "081")
    pub fn components(&self) -> (String, String) {
        (format!("{:03}", self.path), format!("{:03}", self.row))
    }

    /// Relative directory `PPP/RRR` used by reference and fixed-location repositories
    pub fn relative_dir(&self) -> PathBuf {
        let (path, row) = self.components();
        PathBuf::from(path).join(row)
    }
}

impl fmt::Display for PathRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}/{:03}", self.path, self.row)
    }
}

/// Coordinate system and pixel resolution of a reference image.
///
/// Two images with the same CRS and resolution share a key regardless of
/// their filenames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpatialReferenceKey {
    pub crs: String,
    /// Pixel size (x, y) as reported by the geotransform; y is usually negative
    pub resolution: (f64, f64),
}

impl SpatialReferenceKey {
    pub fn new(crs: impl Into<String>, resolution: (f64, f64)) -> Self {
        Self {
            crs: crs.into(),
            resolution,
        }
    }

    /// Unsigned pixel size (x, y)
    pub fn abs_resolution(&self) -> (f64, f64) {
        (self.resolution.0.abs(), self.resolution.1.abs())
    }
}

impl PartialEq for SpatialReferenceKey {
    fn eq(&self, other: &Self) -> bool {
        self.crs == other.crs
            && self.resolution.0.to_bits() == other.resolution.0.to_bits()
            && self.resolution.1.to_bits() == other.resolution.1.to_bits()
    }
}

impl Eq for SpatialReferenceKey {}

impl Hash for SpatialReferenceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.crs.hash(state);
        self.resolution.0.to_bits().hash(state);
        self.resolution.1.to_bits().hash(state);
    }
}

impl fmt::Display for SpatialReferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ ({}, {})", self.crs, self.resolution.0, self.resolution.1)
    }
}

/// A resolved reference image file
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceImage {
    pub path: PathBuf,
    /// Repository root the image was found under
    pub repository: PathBuf,
    pub key: SpatialReferenceKey,
}

/// Provenance of the reference imagery used for a correlation run
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceProvenance {
    pub source_path: PathBuf,
    pub repository: PathBuf,
    pub date: Option<DateTime<Utc>>,
    /// Unsigned (x, y) pixel size of the majority coordinate system
    pub resolution: (f64, f64),
}

/// One candidate ground control point reported by the correlation tool
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationPoint {
    pub point_id: i64,
    pub chip: i64,
    pub line: f64,
    pub sample: f64,
    pub map_x: f64,
    pub map_y: f64,
    pub correlation: f64,
    pub y_residual: f64,
    pub x_residual: f64,
    pub outlier: i32,
}

/// Label → value rows of the absolute residual section
pub type AbsoluteResidualSummary = Vec<(String, f64)>;

/// Colour → residual rows of the colour residual section
pub type ColorResidualSummary = Vec<(String, f64)>;

/// Decoded contents of a correlation result file
#[derive(Debug, Clone, PartialEq)]
pub struct GverifyResults {
    pub colors: ColorResidualSummary,
    pub absolute: AbsoluteResidualSummary,
    pub points: Vec<CorrelationPoint>,
}

/// Strategy used by the correlation tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationMode {
    /// Dense regular grid of candidate points (land tiles)
    Grid,
    /// Known control point locations (ocean tiles)
    FixedLocation,
}

impl fmt::Display for CorrelationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrelationMode::Grid => write!(f, "grid"),
            CorrelationMode::FixedLocation => write!(f, "fixed_location"),
        }
    }
}

/// Runtime record of a correlation attempt; written whether or not the tool ran
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub executable: String,
    /// Unsigned (x, y) reference pixel size; empty when resolution failed
    pub ref_resolution: Vec<f64>,
    /// ISO-8601 reference acquisition date, empty when unknown
    pub ref_date: String,
    pub ref_source_path: String,
    #[serde(default)]
    pub ref_source: String,
    pub granule: String,
    #[serde(default)]
    pub correlation_mode: Option<CorrelationMode>,
    /// Empty on success
    pub error_msg: String,
}

impl RunRecord {
    /// Blank record for a granule; provenance is filled in as the run progresses
    pub fn new(executable: impl Into<String>, granule: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            ref_resolution: Vec::new(),
            ref_date: String::new(),
            ref_source_path: String::new(),
            ref_source: String::new(),
            granule: granule.into(),
            correlation_mode: None,
            error_msg: String::new(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error_msg.is_empty()
    }
}

/// (x, y, xy) triple, xy being the Euclidean composite
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct XyStat {
    pub x: f64,
    pub y: f64,
    pub xy: f64,
}

impl XyStat {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            xy: (x * x + y * y).sqrt(),
        }
    }

    pub fn nan() -> Self {
        Self {
            x: f64::NAN,
            y: f64::NAN,
            xy: f64::NAN,
        }
    }

    pub fn rounded(&self, places: u32) -> Self {
        Self {
            x: round_to(self.x, places),
            y: round_to(self.y, places),
            xy: round_to(self.xy, places),
        }
    }

    pub fn is_nan(&self) -> bool {
        self.x.is_nan() && self.y.is_nan() && self.xy.is_nan()
    }
}

/// Round to a fixed number of decimal places; NaN passes through
pub fn round_to(value: f64, places: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let scale = 10f64.powi(places as i32);
    (value * scale).round() / scale
}

/// Normalise a label from the correlation tool for use as a report key
/// (`" Absolute_Residual_X "` → `"absolute_residual_x"`)
pub fn clean_name(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

/// Residual block of a GQA report
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Residual {
    pub mean: XyStat,
    pub stddev: XyStat,
    pub iterative_mean: XyStat,
    pub iterative_stddev: XyStat,
    pub abs_iterative_mean: XyStat,
    pub abs: XyStat,
    pub cep90: f64,
}

impl Residual {
    /// Residual block with every field set to NaN
    pub fn nan() -> Self {
        Self {
            mean: XyStat::nan(),
            stddev: XyStat::nan(),
            iterative_mean: XyStat::nan(),
            iterative_stddev: XyStat::nan(),
            abs_iterative_mean: XyStat::nan(),
            abs: XyStat::nan(),
            cep90: f64::NAN,
        }
    }

    pub fn is_nan(&self) -> bool {
        self.mean.is_nan()
            && self.stddev.is_nan()
            && self.iterative_mean.is_nan()
            && self.iterative_stddev.is_nan()
            && self.abs_iterative_mean.is_nan()
            && self.abs.is_nan()
            && self.cep90.is_nan()
    }
}

/// Software version entry in the report provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftwareVersion {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
}

/// Final per-granule GQA report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GqaReport {
    pub software_versions: BTreeMap<String, SoftwareVersion>,
    pub granule: String,
    pub ref_source_path: String,
    pub ref_source: String,
    pub ref_date: String,
    pub correlation_mode: Option<CorrelationMode>,
    pub final_gcp_count: usize,
    pub error_message: String,
    pub residual: Residual,
    pub colors: BTreeMap<String, f64>,
}

/// Error types for GQA processing
#[derive(Debug, thiserror::Error)]
pub enum GqaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Reference resolution failed: {0}")]
    Resolution(String),

    #[error("Correlation tool failed: {0}")]
    ExternalTool(String),

    #[error("Invalid result file: {0}")]
    Parse(String),

    #[error("no ground control points found in {0}")]
    NoGcps(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

impl GqaError {
    /// Failures that are captured into a run record or NaN report instead of
    /// aborting the granule
    pub fn is_recoverable(&self) -> bool {
        match self {
            GqaError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            GqaError::Resolution(_)
            | GqaError::ExternalTool(_)
            | GqaError::Parse(_)
            | GqaError::NoGcps(_)
            | GqaError::InvalidInput(_) => true,
            #[cfg(feature = "gdal")]
            GqaError::Gdal(_) => true,
            GqaError::Config(_) | GqaError::Yaml(_) => false,
        }
    }
}

/// Result type for GQA operations
pub type GqaResult<T> = Result<T, GqaError>;
