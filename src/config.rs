//! # Configuration
//!
//! A single [`GqaConfig`] value carries every tunable used by the pipeline. It
//! is built once (usually from YAML) and passed into each stage; nothing reads
//! configuration from global state.
//!
//! ```yaml
//! gverify:
//!   executable: /opt/gverify/bin/image-gverify_v0.25c
//!   ld_library_path: /opt/gverify/lib
//!   gdal_data: /opt/gverify/share/gdal
//!   geotiff_csv: /opt/gverify/share/epsg_csv
//!   grid_size: 24
//!   timeout: 300
//!
//! reference:
//!   directories:
//!     - /g/data/reference/gls
//!     - /g/data/reference/gls_backup
//!   scenes_index: /g/data/reference/landsat_scenes.shp
//!   ocean_tile_list: /g/data/reference/ocean_tile_list.txt
//!   fixed_location_root: /g/data/reference/fix_qa_location
//!
//! statistics:
//!   correlation_coefficient: 0.75
//!   standard_deviations: 1.0
//!   iterations: 1
//!
//! output:
//!   workdir: /scratch/gqa
//!   output_dir: /scratch/gqa/reports
//! ```

use crate::types::{GqaError, GqaResult, PathRow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Resampling applied by the correlation tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resampling {
    Nearest,
    Bilinear,
    Cubic,
}

impl Resampling {
    /// Code expected by the `-r` flag
    pub fn code(&self) -> &'static str {
        match self {
            Resampling::Nearest => "NN",
            Resampling::Bilinear => "BI",
            Resampling::Cubic => "CI",
        }
    }
}

/// Correlation tool invocation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GverifyConfig {
    pub executable: PathBuf,
    pub ld_library_path: String,
    pub gdal_data: String,
    pub geotiff_csv: String,
    pub pyramid_levels: u32,
    pub thread_count: u32,
    pub null_value: f64,
    pub chip_size: u32,
    pub grid_size: u32,
    /// Minimum correlation coefficient passed to the tool (`-c`); must equal
    /// `statistics.correlation_coefficient`
    pub correlation_coefficient: f64,
    pub resampling: Resampling,
    /// Seconds before the tool is killed
    pub timeout: u64,
}

impl Default for GverifyConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("image-gverify"),
            ld_library_path: String::new(),
            gdal_data: String::new(),
            geotiff_csv: String::new(),
            pyramid_levels: 5,
            thread_count: 4,
            null_value: 0.0,
            chip_size: 33,
            grid_size: 24,
            correlation_coefficient: 0.75,
            resampling: Resampling::Bilinear,
            timeout: 300,
        }
    }
}

/// Inclusive path/row window that reference imagery is available for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathRowDomain {
    pub path_min: u32,
    pub path_max: u32,
    pub row_min: u32,
    pub row_max: u32,
}

impl Default for PathRowDomain {
    fn default() -> Self {
        // Australian continental WRS-2 coverage
        Self {
            path_min: 87,
            path_max: 116,
            row_min: 67,
            row_max: 91,
        }
    }
}

impl PathRowDomain {
    pub fn contains(&self, entry: &PathRow) -> bool {
        (self.path_min..=self.path_max).contains(&entry.path)
            && (self.row_min..=self.row_max).contains(&entry.row)
    }
}

/// Band name lookup tables used to gate reference filenames.
///
/// `primary` is keyed reference-satellite → target sensor → band id, and
/// `legacy` is keyed target sensor → band id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandMaps {
    pub primary: HashMap<String, HashMap<String, HashMap<String, String>>>,
    pub legacy: HashMap<String, HashMap<String, String>>,
}

impl Default for BandMaps {
    fn default() -> Self {
        // Target band id → equivalent TM band number (red, NIR, SWIR1)
        let sensors: [(&str, [(&str, u32); 3]); 5] = [
            ("LANDSAT_5", [("3", 3), ("4", 4), ("5", 5)]),
            ("LANDSAT_7", [("3", 3), ("4", 4), ("5", 5)]),
            ("LANDSAT_8", [("4", 3), ("5", 4), ("6", 5)]),
            ("SENTINEL_2A", [("4", 3), ("8", 4), ("11", 5)]),
            ("SENTINEL_2B", [("4", 3), ("8", 4), ("11", 5)]),
        ];

        let mut primary: HashMap<String, HashMap<String, HashMap<String, String>>> = HashMap::new();
        let mut legacy: HashMap<String, HashMap<String, String>> = HashMap::new();

        for (sensor, bands) in sensors.iter() {
            for (band_id, tm) in bands.iter() {
                // ETM+ references name bands "B30", OLI references shift by one ("B4")
                let names = [
                    ("LE7", format!("B{}0", tm)),
                    ("LC8", format!("B{}", tm + 1)),
                    ("LO8", format!("B{}", tm + 1)),
                ];
                for (reference_sat, name) in names {
                    primary
                        .entry(reference_sat.to_string())
                        .or_default()
                        .entry(sensor.to_string())
                        .or_default()
                        .insert(band_id.to_string(), name);
                }
                legacy
                    .entry(sensor.to_string())
                    .or_default()
                    .insert(band_id.to_string(), format!("{}0", tm));
            }
        }

        Self { primary, legacy }
    }
}

impl BandMaps {
    /// Expected band token in a primary-convention reference filename
    pub fn primary_band(&self, reference_sat: &str, sensor: &str, band_id: &str) -> Option<&str> {
        self.primary
            .get(reference_sat)?
            .get(sensor)?
            .get(band_id)
            .map(String::as_str)
    }

    /// Expected band token in a legacy-convention reference filename
    pub fn legacy_band(&self, sensor: &str, band_id: &str) -> Option<&str> {
        self.legacy.get(sensor)?.get(band_id).map(String::as_str)
    }
}

/// Reference imagery lookup settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    /// Repository roots in priority order
    pub directories: Vec<PathBuf>,
    /// Vector file of scene-index footprints with PATH/ROW attributes
    pub scenes_index: PathBuf,
    pub ocean_tile_list: PathBuf,
    /// Root of the per path/row `points.txt` files used for ocean tiles
    pub fixed_location_root: PathBuf,
    pub domain: PathRowDomain,
    pub band_maps: BandMaps,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            directories: Vec::new(),
            scenes_index: PathBuf::new(),
            ocean_tile_list: PathBuf::new(),
            fixed_location_root: PathBuf::new(),
            domain: PathRowDomain::default(),
            band_maps: BandMaps::default(),
        }
    }
}

/// Iterative refinement parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    pub correlation_coefficient: f64,
    /// Multiplier applied to the per-axis standard deviation
    pub standard_deviations: f64,
    pub iterations: usize,
    pub decimal_places: u32,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            correlation_coefficient: 0.75,
            standard_deviations: 1.0,
            iterations: 1,
            decimal_places: 2,
        }
    }
}

/// Output locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Scratch root; each granule gets its own subdirectory
    pub workdir: PathBuf,
    /// Directory the final reports are published to
    pub output_dir: PathBuf,
    /// Report filename; `{granule}` is substituted
    pub report_name: String,
    /// Remove the per-granule tool directory once the report is published
    pub cleanup: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from("gqa-work"),
            output_dir: PathBuf::from("gqa-output"),
            report_name: "{granule}.gqa.yaml".to_string(),
            cleanup: false,
        }
    }
}

impl OutputConfig {
    pub fn report_filename(&self, granule: &str) -> String {
        self.report_name.replace("{granule}", granule)
    }

    /// Per-granule work directory for the correlation tool
    pub fn gverify_dir(&self, granule: &str) -> PathBuf {
        self.workdir.join(granule).join("gverify")
    }
}

/// Complete GQA configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GqaConfig {
    pub gverify: GverifyConfig,
    pub reference: ReferenceConfig,
    pub statistics: StatisticsConfig,
    pub output: OutputConfig,
}

impl GqaConfig {
    /// Load and validate a YAML configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> GqaResult<Self> {
        log::info!("Loading GQA configuration from: {}", path.as_ref().display());
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(yaml: &str) -> GqaResult<Self> {
        let config: GqaConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> GqaResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> GqaResult<()> {
        if self.gverify.timeout == 0 {
            return Err(GqaError::Config("gverify.timeout must be positive".to_string()));
        }
        if self.gverify.grid_size == 0 {
            return Err(GqaError::Config("gverify.grid_size must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.statistics.correlation_coefficient) {
            return Err(GqaError::Config(format!(
                "statistics.correlation_coefficient must lie in [0, 1], got {}",
                self.statistics.correlation_coefficient
            )));
        }
        if self.gverify.correlation_coefficient != self.statistics.correlation_coefficient {
            return Err(GqaError::Config(format!(
                "gverify.correlation_coefficient ({}) and statistics.correlation_coefficient ({}) must match",
                self.gverify.correlation_coefficient, self.statistics.correlation_coefficient
            )));
        }
        if self.statistics.standard_deviations <= 0.0 {
            return Err(GqaError::Config(
                "statistics.standard_deviations must be positive".to_string(),
            ));
        }
        let domain = &self.reference.domain;
        if domain.path_min > domain.path_max || domain.row_min > domain.row_max {
            return Err(GqaError::Config(format!("empty path/row domain: {:?}", domain)));
        }
        if !self.output.report_name.contains("{granule}") {
            log::warn!(
                "Report name '{}' has no {{granule}} placeholder; reports will overwrite each other",
                self.output.report_name
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = GqaConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gverify.timeout, 300);
        assert_eq!(config.statistics.iterations, 1);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
gverify:
  grid_size: 48
  resampling: cubic
reference:
  directories: [/ref/primary, /ref/backup]
statistics:
  iterations: 3
"#;
        let config = GqaConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.gverify.grid_size, 48);
        assert_eq!(config.gverify.resampling.code(), "CI");
        assert_eq!(config.gverify.chip_size, 33);
        assert_eq!(config.reference.directories.len(), 2);
        assert_eq!(config.statistics.iterations, 3);
        assert_eq!(config.statistics.correlation_coefficient, 0.75);
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = GqaConfig::default();
        let yaml = config.to_yaml().unwrap();
        let parsed = GqaConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let yaml = "statistics:\n  correlation_coefficient: 1.5\n";
        assert!(matches!(
            GqaConfig::from_yaml_str(yaml),
            Err(GqaError::Config(_))
        ));
    }

    #[test]
    fn test_mismatched_correlation_thresholds_rejected() {
        let yaml = "gverify:\n  correlation_coefficient: 0.8\n";
        let err = GqaConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, GqaError::Config(_)));
        assert!(err.to_string().contains("must match"));

        let yaml = "gverify:\n  correlation_coefficient: 0.8\nstatistics:\n  correlation_coefficient: 0.8\n";
        let config = GqaConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.gverify.correlation_coefficient, 0.8);
    }

    #[test]
    fn test_domain_bounds_inclusive() {
        let domain = PathRowDomain::default();
        assert!(domain.contains(&PathRow::new(87, 67)));
        assert!(domain.contains(&PathRow::new(116, 91)));
        assert!(!domain.contains(&PathRow::new(86, 80)));
        assert!(!domain.contains(&PathRow::new(100, 92)));
    }

    #[test]
    fn test_band_maps() {
        let maps = BandMaps::default();
        assert_eq!(maps.primary_band("LC8", "SENTINEL_2A", "4"), Some("B4"));
        assert_eq!(maps.primary_band("LE7", "LANDSAT_8", "4"), Some("B30"));
        assert_eq!(maps.legacy_band("SENTINEL_2A", "4"), Some("30"));
        assert_eq!(maps.primary_band("LT5", "SENTINEL_2A", "4"), None);
    }

    #[test]
    fn test_report_filename() {
        let output = OutputConfig::default();
        assert_eq!(output.report_filename("G1"), "G1.gqa.yaml");
        assert_eq!(output.gverify_dir("G1"), PathBuf::from("gqa-work/G1/gverify"));
    }
}
