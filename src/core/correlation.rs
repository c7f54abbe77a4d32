//! Correlation tool preparation and invocation.
//!
//! The runner classifies a granule as land or ocean, prepares the source band,
//! reference mosaic and (for ocean tiles) the fixed control point list, runs
//! the external correlation tool under a timeout and writes a [`RunRecord`]
//! whatever the outcome.

use crate::config::{GqaConfig, GverifyConfig};
use crate::core::reference::{build_vrt, ReferenceResolver};
use crate::io::{collect_gcp, run_command, tile_id_from_granule, OceanTileList, RasterIo, SceneIndex};
use crate::types::{CorrelationMode, Footprint, GqaError, GqaResult, RunRecord};
use chrono::{DateTime, SecondsFormat, Utc};
use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

/// Runtime record written next to the tool outputs
pub const RUN_RECORD_FILE: &str = "gverify_run.yaml";

/// Result file produced by the correlation tool
pub const GVERIFY_RESULTS: &str = "image-gverify.res";

/// A band of the processed granule, addressed by GDAL dataset name
#[derive(Debug, Clone, PartialEq)]
pub struct BandSource {
    pub dataset: String,
    /// Sensor band id used to pick the matching reference band
    pub band_id: String,
}

/// Everything the pipeline needs to know about one granule
#[derive(Debug, Clone, PartialEq)]
pub struct GranuleInputs {
    pub granule: String,
    pub footprint: Footprint,
    pub acquisition_time: DateTime<Utc>,
    /// Satellite/sensor tag, e.g. `SENTINEL_2A`
    pub sensor: String,
    pub land_band: BandSource,
    pub ocean_band: BandSource,
}

/// Correlation strategy with its mode-specific argument
#[derive(Debug, Clone, PartialEq)]
pub enum CorrelationPlan {
    Grid { grid_size: u32 },
    FixedLocation { points_file: PathBuf },
}

impl CorrelationPlan {
    pub fn mode(&self) -> CorrelationMode {
        match self {
            CorrelationPlan::Grid { .. } => CorrelationMode::Grid,
            CorrelationPlan::FixedLocation { .. } => CorrelationMode::FixedLocation,
        }
    }

    fn args(&self) -> Vec<OsString> {
        match self {
            CorrelationPlan::Grid { grid_size } => vec!["-g".into(), grid_size.to_string().into()],
            CorrelationPlan::FixedLocation { points_file } => vec![
                "-t".into(),
                "FIXED_LOCATION".into(),
                "-t_file".into(),
                points_file.as_os_str().to_owned(),
            ],
        }
    }
}

/// Command line for the correlation tool
pub fn gverify_command(
    config: &GverifyConfig,
    reference: &Path,
    source: &Path,
    outdir: &Path,
    plan: &CorrelationPlan,
) -> Command {
    let mut command = Command::new(&config.executable);

    if !config.ld_library_path.is_empty() {
        let library_path = match std::env::var("LD_LIBRARY_PATH") {
            Ok(existing) if !existing.is_empty() => format!("{}:{}", config.ld_library_path, existing),
            _ => config.ld_library_path.clone(),
        };
        command.env("LD_LIBRARY_PATH", library_path);
    }
    if !config.gdal_data.is_empty() {
        command.env("GDAL_DATA", &config.gdal_data);
    }
    if !config.geotiff_csv.is_empty() {
        command.env("GEOTIFF_CSV", &config.geotiff_csv);
    }

    command
        .arg("-b")
        .arg(reference)
        .arg("-m")
        .arg(source)
        .arg("-w")
        .arg(outdir)
        .arg("-l")
        .arg(outdir)
        .arg("-o")
        .arg(outdir)
        .arg("-p")
        .arg(config.pyramid_levels.to_string())
        .arg("-n")
        .arg(config.thread_count.to_string())
        .arg("-nv")
        .arg(config.null_value.to_string())
        .arg("-c")
        .arg(config.correlation_coefficient.to_string())
        .arg("-r")
        .arg(config.resampling.code())
        .arg("-cs")
        .arg(config.chip_size.to_string())
        .args(plan.args());

    command
}

/// Write a run record as YAML
pub fn write_run_record(record: &RunRecord, path: &Path) -> GqaResult<()> {
    let file = File::create(path)?;
    serde_yaml::to_writer(file, record)?;
    Ok(())
}

/// Read a run record written by [`write_run_record`]
pub fn read_run_record(path: &Path) -> GqaResult<RunRecord> {
    let file = File::open(path)?;
    Ok(serde_yaml::from_reader(file)?)
}

fn remove_if_exists(path: &Path) -> GqaResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            log::debug!("Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(GqaError::Io(e)),
    }
}

/// Prepares inputs for and runs the correlation tool for single granules
pub struct CorrelationRunner {
    gverify: GverifyConfig,
    fixed_location_root: PathBuf,
    ocean_tiles: OceanTileList,
    resolver: ReferenceResolver,
}

impl CorrelationRunner {
    pub fn new(config: &GqaConfig, ocean_tiles: OceanTileList) -> GqaResult<Self> {
        Ok(Self {
            gverify: config.gverify.clone(),
            fixed_location_root: config.reference.fixed_location_root.clone(),
            ocean_tiles,
            resolver: ReferenceResolver::new(&config.reference)?,
        })
    }

    pub fn resolver(&self) -> &ReferenceResolver {
        &self.resolver
    }

    /// Whether the granule's tile is correlated on the dense grid
    pub fn is_land_tile(&self, granule: &str) -> GqaResult<bool> {
        let tile_id = tile_id_from_granule(granule)?;
        Ok(!self.ocean_tiles.contains(&tile_id))
    }

    /// Run correlation for a granule in `workdir`.
    ///
    /// The run record is written to `workdir/gverify_run.yaml` on every path.
    /// Expected failures (resolution, missing inputs, tool failure or timeout)
    /// are captured in `error_msg`; anything else is also returned as an error
    /// once the record is on disk.
    pub fn run(
        &self,
        inputs: &GranuleInputs,
        workdir: &Path,
        index: &dyn SceneIndex,
        raster: &dyn RasterIo,
    ) -> GqaResult<RunRecord> {
        std::fs::create_dir_all(workdir)?;
        // Tools run with the work directory as cwd, so every path handed to them is absolute
        let workdir = std::fs::canonicalize(workdir)?;
        let workdir = workdir.as_path();
        let results = workdir.join(GVERIFY_RESULTS);
        remove_if_exists(&results)?;

        let mut record = RunRecord::new(self.gverify.executable.display().to_string(), &inputs.granule);

        let outcome = self.attempt(inputs, workdir, index, raster, &mut record);

        let unexpected = match outcome {
            Ok(()) => {
                log::info!("gverify completed for {}", inputs.granule);
                None
            }
            Err(e) => {
                if e.is_recoverable() {
                    log::error!("gverify was not executed because:\n {}", e);
                } else {
                    log::error!("Unexpected failure preparing gverify for {}: {}", inputs.granule, e);
                }
                record.error_msg = e.to_string();
                remove_if_exists(&results)?;
                (!e.is_recoverable()).then_some(e)
            }
        };

        write_run_record(&record, &workdir.join(RUN_RECORD_FILE))?;

        match unexpected {
            Some(e) => Err(e),
            None => Ok(record),
        }
    }

    fn attempt(
        &self,
        inputs: &GranuleInputs,
        workdir: &Path,
        index: &dyn SceneIndex,
        raster: &dyn RasterIo,
        record: &mut RunRecord,
    ) -> GqaResult<()> {
        let scenes = self.resolver.candidate_scenes(index, &inputs.footprint)?;

        let (band, plan) = if self.is_land_tile(&inputs.granule)? {
            let plan = CorrelationPlan::Grid {
                grid_size: self.gverify.grid_size,
            };
            (&inputs.land_band, plan)
        } else {
            let points_file = collect_gcp(&self.fixed_location_root, &scenes, &workdir.join("points.txt"))?;
            (&inputs.ocean_band, CorrelationPlan::FixedLocation { points_file })
        };
        record.correlation_mode = Some(plan.mode());
        log::info!("{} correlated in {} mode", inputs.granule, plan.mode());

        let source = workdir.join("source.tif");
        raster.extract_band(&band.dataset, &source)?;

        let images = self.resolver.get_reference_imagery(
            &scenes,
            inputs.acquisition_time,
            &band.band_id,
            &inputs.sensor,
            raster,
        )?;
        let provenance = self.resolver.provenance(&images, &band.band_id, &inputs.sensor)?;

        record.ref_date = provenance
            .date
            .map(|d| d.to_rfc3339_opts(SecondsFormat::Secs, false))
            .unwrap_or_default();
        record.ref_source_path = provenance.source_path.display().to_string();
        record.ref_source = provenance.repository.display().to_string();
        record.ref_resolution = vec![provenance.resolution.0, provenance.resolution.1];

        let mosaic = build_vrt(&images, &workdir.join("reference.vrt"), workdir, raster)?;

        self.run_gverify(&mosaic, &source, workdir, &plan)
    }

    fn run_gverify(&self, reference: &Path, source: &Path, outdir: &Path, plan: &CorrelationPlan) -> GqaResult<()> {
        let command = gverify_command(&self.gverify, reference, source, outdir, plan);
        log::debug!("calling gverify {:?}", command);

        run_command(
            command,
            outdir,
            "gverify",
            Some(Duration::from_secs(self.gverify.timeout)),
        )?;
        Ok(())
    }
}
