//! Per-granule GQA pipeline and batch driver.
//!
//! A granule goes through reference resolution and correlation, parsing of the
//! tool output, residual statistics and report assembly. The report is written
//! for every granule that was attempted. Granules are independent and a batch
//! is spread across the rayon thread pool.

use crate::config::GqaConfig;
use crate::core::correlation::{
    read_run_record, CorrelationRunner, GranuleInputs, GVERIFY_RESULTS, RUN_RECORD_FILE,
};
use crate::core::report::{assemble_report, write_report, Analysis};
use crate::core::statistics::calculate_gqa;
use crate::io::{parse_gverify, OceanTileList, RasterIo, SceneIndex};
use crate::types::{GqaError, GqaReport, GqaResult, RunRecord};
use anyhow::Context;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Parse the correlation output in `workdir` and reduce it to statistics
pub fn analyse(record: &RunRecord, workdir: &Path, config: &GqaConfig) -> GqaResult<Analysis> {
    let resolution = match record.ref_resolution.as_slice() {
        [x, y] => (*x, *y),
        other => {
            return Err(GqaError::InvalidInput(format!(
                "run record for {} has reference resolution {:?}, expected two values",
                record.granule, other
            )))
        }
    };

    let results = parse_gverify(&workdir.join(GVERIFY_RESULTS))?;
    let statistics = calculate_gqa(&results.points, &results.absolute, resolution, &config.statistics)?;

    Ok(Analysis {
        statistics,
        colors: results.colors,
    })
}

/// Run record for a runner that returned an error. Provenance is kept from
/// the record on disk when it belongs to this granule, but the error always
/// replaces whatever outcome that record claims.
fn failed_run_record(workdir: &Path, executable: &str, granule: &str, error: &GqaError) -> RunRecord {
    let mut record = match read_run_record(&workdir.join(RUN_RECORD_FILE)) {
        Ok(record) if record.granule == granule => record,
        _ => RunRecord::new(executable, granule),
    };
    record.error_msg = error.to_string();
    record
}

/// Outcome of one granule in a batch
#[derive(Debug)]
pub struct GranuleOutcome {
    pub granule: String,
    pub report: anyhow::Result<GqaReport>,
}

/// Geometric quality assessment over one or more granules
pub struct GqaPipeline {
    config: GqaConfig,
    runner: CorrelationRunner,
    index: Box<dyn SceneIndex>,
    raster: Box<dyn RasterIo>,
}

impl GqaPipeline {
    pub fn new(
        config: GqaConfig,
        ocean_tiles: OceanTileList,
        index: Box<dyn SceneIndex>,
        raster: Box<dyn RasterIo>,
    ) -> GqaResult<Self> {
        config.validate()?;
        let runner = CorrelationRunner::new(&config, ocean_tiles)?;
        Ok(Self {
            config,
            runner,
            index,
            raster,
        })
    }

    /// Pipeline backed by the configured OGR scene index, ocean tile list and
    /// GDAL tools
    #[cfg(feature = "gdal")]
    pub fn from_config(config: GqaConfig) -> GqaResult<Self> {
        use crate::io::{GdalRaster, OgrSceneIndex};

        let ocean_tiles = OceanTileList::from_file(&config.reference.ocean_tile_list)?;
        let index = OgrSceneIndex::new(&config.reference.scenes_index)?;
        Self::new(config, ocean_tiles, Box::new(index), Box::new(GdalRaster::new()))
    }

    pub fn config(&self) -> &GqaConfig {
        &self.config
    }

    pub fn report_path(&self, granule: &str) -> PathBuf {
        self.config
            .output
            .output_dir
            .join(self.config.output.report_filename(granule))
    }

    /// Assess a single granule and write its report.
    ///
    /// Expected failures end up in the report's `error_message` with NaN
    /// statistics. Unexpected failures are returned after the NaN report has
    /// been written.
    pub fn process_granule(&self, inputs: &GranuleInputs) -> GqaResult<GqaReport> {
        let workdir = self.config.output.gverify_dir(&inputs.granule);
        log::info!("Processing GQA for {}", inputs.granule);

        let (record, mut unexpected) =
            match self.runner.run(inputs, &workdir, self.index.as_ref(), self.raster.as_ref()) {
                Ok(record) => (record, None),
                Err(e) => {
                    let executable = self.config.gverify.executable.display().to_string();
                    let record = failed_run_record(&workdir, &executable, &inputs.granule, &e);
                    (record, Some(e))
                }
            };

        let analysis = if record.succeeded() {
            match analyse(&record, &workdir, &self.config) {
                Ok(analysis) => Ok(analysis),
                Err(e) => {
                    log::error!("GQA statistics unavailable for {}: {}", inputs.granule, e);
                    let message = e.to_string();
                    if !e.is_recoverable() {
                        unexpected = Some(e);
                    }
                    Err(message)
                }
            }
        } else {
            Err(record.error_msg.clone())
        };

        let report = assemble_report(&record, analysis, self.config.statistics.decimal_places);
        write_report(&report, &self.report_path(&inputs.granule))?;

        if self.config.output.cleanup {
            match std::fs::remove_dir_all(&workdir) {
                Ok(()) => log::debug!("Removed {}", workdir.display()),
                Err(e) => log::warn!("Could not remove {}: {}", workdir.display(), e),
            }
        }

        match unexpected {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Assess a batch of granules in parallel
    pub fn process_granules(&self, granules: &[GranuleInputs]) -> Vec<GranuleOutcome> {
        log::info!("Processing {} granules", granules.len());

        let outcomes: Vec<GranuleOutcome> = granules
            .par_iter()
            .map(|inputs| GranuleOutcome {
                granule: inputs.granule.clone(),
                report: self
                    .process_granule(inputs)
                    .with_context(|| format!("GQA failed for granule {}", inputs.granule)),
            })
            .collect();

        let failed = outcomes.iter().filter(|o| o.report.is_err()).count();
        if failed > 0 {
            log::warn!("{} of {} granules failed", failed, outcomes.len());
        }
        outcomes
    }
}
