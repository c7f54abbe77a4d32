//! GQA report assembly.
//!
//! Every attempted granule gets exactly one report. A successful analysis
//! fills in the statistics and colour residuals; any captured failure yields
//! the NaN report, which has the same keys.

use crate::core::statistics::GqaStatistics;
use crate::types::{
    clean_name, round_to, ColorResidualSummary, GqaError, GqaReport, GqaResult, Residual,
    RunRecord, SoftwareVersion,
};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Error message recorded when statistics were computed
pub const NO_ERRORS: &str = "no errors";

/// Parsed and reduced correlation output for one granule
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub statistics: GqaStatistics,
    pub colors: ColorResidualSummary,
}

/// Version string of the correlation tool, taken from its filename
/// (`image-gverify_v0.25c` → `v0.25c`)
pub fn gverify_version(executable: &str) -> String {
    let name = Path::new(executable)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| executable.to_string());

    match name.rsplit_once('_') {
        Some((_, version)) if version.starts_with('v') => version.to_string(),
        _ => name,
    }
}

fn software_versions(executable: &str) -> BTreeMap<String, SoftwareVersion> {
    let mut versions = BTreeMap::new();
    versions.insert(
        env!("CARGO_PKG_NAME").to_string(),
        SoftwareVersion {
            version: env!("CARGO_PKG_VERSION").to_string(),
            repo_url: Some(env!("CARGO_PKG_REPOSITORY").to_string()),
        },
    );
    versions.insert(
        "gverify".to_string(),
        SoftwareVersion {
            version: gverify_version(executable),
            repo_url: None,
        },
    );
    versions
}

/// Build the report for a granule from its run record and analysis outcome.
///
/// `analysis` carries either the statistics or the failure message to record.
pub fn assemble_report(record: &RunRecord, analysis: Result<Analysis, String>, decimal_places: u32) -> GqaReport {
    let (final_gcp_count, residual, colors, error_message) = match analysis {
        Ok(analysis) => {
            let colors = analysis
                .colors
                .iter()
                .map(|(color, value)| (clean_name(color), round_to(*value, decimal_places)))
                .collect();
            (
                analysis.statistics.final_gcp_count,
                analysis.statistics.residual,
                colors,
                NO_ERRORS.to_string(),
            )
        }
        Err(message) => {
            log::debug!("Writing NaNs for residuals of {}: {}", record.granule, message);
            (0, Residual::nan(), BTreeMap::new(), message)
        }
    };

    GqaReport {
        software_versions: software_versions(&record.executable),
        granule: record.granule.clone(),
        ref_source_path: record.ref_source_path.clone(),
        ref_source: record.ref_source.clone(),
        ref_date: record.ref_date.clone(),
        correlation_mode: record.correlation_mode,
        final_gcp_count,
        error_message,
        residual,
        colors,
    }
}

/// Write `report` to `path` via a temporary file in the same directory so
/// readers never see a partial document
pub fn write_report(report: &GqaReport, path: &Path) -> GqaResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    serde_yaml::to_writer(&mut temp, report)?;
    temp.flush()?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| GqaError::Io(e.error))?;

    log::info!("Wrote GQA report {}", path.display());
    Ok(())
}

/// Read a report written by [`write_report`]
pub fn read_report(path: &Path) -> GqaResult<GqaReport> {
    let file = std::fs::File::open(path)?;
    Ok(serde_yaml::from_reader(file)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CorrelationMode, XyStat};
    use tempfile::TempDir;

    fn record(error: &str) -> RunRecord {
        RunRecord {
            executable: "/opt/gverify/bin/image-gverify_v0.25c".to_string(),
            ref_resolution: vec![25.0, 25.0],
            ref_date: "2014-05-03T00:00:00+00:00".to_string(),
            ref_source_path: "/ref/090/081/LC80900812014123LGN00_B4.TIF".to_string(),
            ref_source: "/ref".to_string(),
            granule: "G1".to_string(),
            correlation_mode: Some(CorrelationMode::Grid),
            error_msg: error.to_string(),
        }
    }

    fn analysis() -> Analysis {
        let stat = XyStat::new(0.3, 0.4);
        Analysis {
            statistics: GqaStatistics {
                final_gcp_count: 42,
                residual: Residual {
                    mean: stat,
                    stddev: stat,
                    iterative_mean: stat,
                    iterative_stddev: stat,
                    abs_iterative_mean: stat,
                    abs: stat,
                    cep90: 0.9,
                },
                inlier_counts: vec![50, 42],
            },
            colors: vec![("Blue".to_string(), 0.123), ("Light Green".to_string(), 1.0)],
        }
    }

    #[test]
    fn test_success_report() {
        let report = assemble_report(&record(""), Ok(analysis()), 2);

        assert_eq!(report.final_gcp_count, 42);
        assert_eq!(report.error_message, NO_ERRORS);
        assert_eq!(report.colors.get("blue"), Some(&0.12));
        assert_eq!(report.colors.get("light_green"), Some(&1.0));
        assert_eq!(report.ref_source, "/ref");
        assert_eq!(report.software_versions["gverify"].version, "v0.25c");
        assert!(report.software_versions.contains_key("gqa"));
    }

    #[test]
    fn test_nan_report() {
        let report = assemble_report(&record("no reference found"), Err("no reference found".to_string()), 2);

        assert_eq!(report.final_gcp_count, 0);
        assert!(report.residual.is_nan());
        assert_eq!(report.error_message, "no reference found");
        assert!(report.colors.is_empty());
    }

    #[test]
    fn test_reports_share_schema() {
        let full = assemble_report(&record(""), Ok(analysis()), 2);
        let nan = assemble_report(&record("x"), Err("x".to_string()), 2);

        let keys = |report: &GqaReport| -> Vec<String> {
            match serde_yaml::to_value(report).unwrap() {
                serde_yaml::Value::Mapping(map) => map
                    .keys()
                    .map(|k| k.as_str().unwrap_or_default().to_string())
                    .collect(),
                other => panic!("unexpected report shape {:?}", other),
            }
        };
        assert_eq!(keys(&full), keys(&nan));
    }

    #[test]
    fn test_write_report_atomically() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reports").join("G1.gqa.yaml");
        let report = assemble_report(&record("failed"), Err("failed".to_string()), 2);

        write_report(&report, &path).unwrap();

        let entries: Vec<_> = std::fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(entries.len(), 1, "temporary file left behind");

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains(".nan"));

        let parsed = read_report(&path).unwrap();
        assert_eq!(parsed.final_gcp_count, 0);
        assert!(parsed.residual.is_nan());
        assert_eq!(parsed.error_message, "failed");
    }

    #[test]
    fn test_gverify_version() {
        assert_eq!(gverify_version("/opt/bin/image-gverify_v0.25c"), "v0.25c");
        assert_eq!(gverify_version("image-gverify"), "image-gverify");
    }
}
