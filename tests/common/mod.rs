#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use gqa::config::GqaConfig;
use gqa::core::{BandSource, GranuleInputs};
use gqa::io::{RasterIo, SceneIndex};
use gqa::types::{Footprint, GqaResult, PathRow, SpatialReferenceKey};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

pub const LAND_GRANULE: &str = "S2A_OPER_MSI_L1C_TL_SGS__20160522T014532_A004620_T55HBU_N02.02";
pub const OCEAN_GRANULE: &str = "S2A_OPER_MSI_L1C_TL_SGS__20160522T014532_A004620_T52KGA_N02.01";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Raster operations that only touch files: the CRS zone is read from a
/// `_z<NN>_` or `zone<NN>` token in the filename
#[derive(Default)]
pub struct FakeRaster {
    pub reprojected: Mutex<Vec<PathBuf>>,
    pub mosaics: Mutex<Vec<Vec<PathBuf>>>,
}

impl RasterIo for FakeRaster {
    fn spatial_reference(&self, path: &Path) -> GqaResult<SpatialReferenceKey> {
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        let zone = if name.contains("zone56") { 56 } else { 55 };
        Ok(SpatialReferenceKey::new(format!("EPSG:327{}", zone), (25.0, -25.0)))
    }

    fn extract_band(&self, source: &str, destination: &Path) -> GqaResult<()> {
        fs::write(destination, source)?;
        Ok(())
    }

    fn reproject(&self, source: &Path, _like: &Path, destination: &Path) -> GqaResult<()> {
        fs::copy(source, destination)?;
        self.reprojected.lock().unwrap().push(source.to_path_buf());
        Ok(())
    }

    fn build_mosaic(&self, images: &[PathBuf], destination: &Path) -> GqaResult<()> {
        let listing: Vec<String> = images.iter().map(|p| p.display().to_string()).collect();
        fs::write(destination, listing.join("\n"))?;
        self.mosaics.lock().unwrap().push(images.to_vec());
        Ok(())
    }
}

/// Temporary layout with reference repositories, a fixed-location root and
/// output directories
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Create `<repo>/<PPP>/<RRR>/<name>` and return its path
    pub fn add_reference(&self, repo: &str, entry: PathRow, name: &str) -> PathBuf {
        let folder = self.path(repo).join(entry.relative_dir());
        fs::create_dir_all(&folder).expect("Failed to create reference dir");
        let path = folder.join(name);
        fs::write(&path, b"reference").expect("Failed to write reference");
        path
    }

    pub fn add_fixed_points(&self, entry: PathRow, contents: &str) {
        let folder = self.path("fixed").join(entry.relative_dir());
        fs::create_dir_all(&folder).expect("Failed to create fixed location dir");
        fs::write(folder.join("points.txt"), contents).expect("Failed to write points");
    }

    /// Shell script standing in for the correlation tool
    #[cfg(unix)]
    pub fn fake_gverify(&self, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = self.path("bin/image-gverify_v0.25c");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    pub fn config(&self, repos: &[&str], executable: PathBuf) -> GqaConfig {
        let mut config = GqaConfig::default();
        config.reference.directories = repos.iter().map(|r| self.path(r)).collect();
        config.reference.fixed_location_root = self.path("fixed");
        config.output.workdir = self.path("work");
        config.output.output_dir = self.path("out");
        config.gverify.executable = executable;
        config.gverify.timeout = 10;
        config
    }
}

/// Footprint of a granule over WRS-2 path 90 row 81 (south-east Australia)
pub fn footprint() -> Footprint {
    Footprint::new((146.0, -35.0), (147.0, -35.0), (147.0, -36.0), (146.0, -36.0))
}

/// Scene index that reports the same path/rows for every footprint
pub struct FixedSceneIndex {
    pub scenes: Vec<PathRow>,
}

impl SceneIndex for FixedSceneIndex {
    fn intersecting(&self, _footprint: &Footprint) -> GqaResult<Vec<PathRow>> {
        Ok(self.scenes.clone())
    }
}

pub fn scene_index() -> FixedSceneIndex {
    FixedSceneIndex {
        scenes: vec![PathRow::new(90, 81)],
    }
}

pub fn granule(name: &str) -> GranuleInputs {
    GranuleInputs {
        granule: name.to_string(),
        footprint: footprint(),
        acquisition_time: Utc.with_ymd_and_hms(2016, 5, 22, 0, 45, 32).unwrap(),
        sensor: "SENTINEL_2A".to_string(),
        land_band: BandSource {
            dataset: "/data/B04.jp2".to_string(),
            band_id: "4".to_string(),
        },
        ocean_band: BandSource {
            dataset: "/data/B11.jp2".to_string(),
            band_id: "11".to_string(),
        },
    }
}

/// Correlation output with five accepted points (residuals in metres at
/// 25 m) and one rejected on correlation
pub fn results_fixture() -> String {
    let mut lines: Vec<String> = vec![
        "Image-gverify v0.25c".to_string(),
        String::new(),
        "Absolute residuals".to_string(),
        "Absolute_Residual_X = 0.3".to_string(),
        "Absolute_Residual_Y = 0.4".to_string(),
        "Colour residuals".to_string(),
        "Blue 0.123".to_string(),
        "Green 0.25".to_string(),
        "Red 0.5".to_string(),
        "Teal 1.0".to_string(),
        "Yellow 2.0".to_string(),
    ];
    while lines.len() < 22 {
        lines.push(String::new());
    }
    let points = [
        (0.9, 0.0, 0.0),
        (0.9, 25.0, -25.0),
        (0.9, -25.0, 25.0),
        (0.9, 5.0, 5.0),
        (0.9, -5.0, -5.0),
        (0.5, 50.0, 50.0),
    ];
    for (i, (corr, x, y)) in points.iter().enumerate() {
        lines.push(format!(
            "{} 1 {}.0 {}.0 500000.0 6100000.0 {} {} {} 1",
            i + 1,
            100 + i,
            200 + i,
            corr,
            y,
            x
        ));
    }
    lines.join("\n") + "\n"
}
