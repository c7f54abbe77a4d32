//! Reference imagery resolution.
//!
//! A granule's footprint is matched against the scene index, restricted to the
//! path/row domain reference imagery exists for, and each remaining path/row
//! is looked up across the repository chain. The reference closest in time is
//! taken from the first repository holding a directory for the path/row, and
//! all selected references are reconciled onto the majority coordinate system
//! in a single virtual mosaic.

use crate::config::{BandMaps, PathRowDomain, ReferenceConfig};
use crate::io::{RasterIo, SceneIndex};
use crate::types::{
    Footprint, GqaError, GqaResult, PathRow, ReferenceImage, ReferenceProvenance,
    SpatialReferenceKey,
};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use regex::Regex;
use std::path::{Path, PathBuf};

/// Reference filenames using satellite + path/row + year/day-of-year,
/// e.g. `LC80900812014123LGN00_B4.TIF`
const PRIMARY_PATTERN: &str =
    r"^(?P<sat>[A-Z0-9]{3})(?P<pathrow>[0-9]{6})(?P<year_doy>[0-9]{7})[^_]+_(?P<band>\w+)";

/// Legacy reference filenames using path/row + calendar date + UTM zone,
/// e.g. `p090r081_7dt20000801_z55_30.tif`
const LEGACY_PATTERN: &str =
    r"^p(?P<path>[0-9]{3})r(?P<row>[0-9]{3}).{4}(?P<yyyymmdd>[0-9]{8})_z(?P<zone>[0-9]{2})_(?P<band>[0-9]{2})";

const IMAGE_PATTERN: &str = r"(?i)^.*\.tiff?$";

/// Finds reference imagery for a granule across a repository fallback chain
#[derive(Debug, Clone)]
pub struct ReferenceResolver {
    directories: Vec<PathBuf>,
    domain: PathRowDomain,
    band_maps: BandMaps,
    primary: Regex,
    legacy: Regex,
    image: Regex,
}

fn compile(pattern: &str) -> GqaResult<Regex> {
    Regex::new(pattern).map_err(|e| GqaError::Config(format!("invalid pattern {}: {}", pattern, e)))
}

impl ReferenceResolver {
    pub fn new(config: &ReferenceConfig) -> GqaResult<Self> {
        if config.directories.is_empty() {
            return Err(GqaError::Config(
                "at least one reference directory is required".to_string(),
            ));
        }

        Ok(Self {
            directories: config.directories.clone(),
            domain: config.domain,
            band_maps: config.band_maps.clone(),
            primary: compile(PRIMARY_PATTERN)?,
            legacy: compile(LEGACY_PATTERN)?,
            image: compile(IMAGE_PATTERN)?,
        })
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    /// Scene-index entries intersecting the footprint
    pub fn candidate_scenes(&self, index: &dyn SceneIndex, footprint: &Footprint) -> GqaResult<Vec<PathRow>> {
        let scenes = index.intersecting(footprint)?;
        if scenes.is_empty() {
            return Err(GqaError::Resolution("no intersecting scenes".to_string()));
        }
        log::debug!(
            "Intersecting scenes: {}",
            scenes.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(", ")
        );
        Ok(scenes)
    }

    /// Entries inside the configured path/row domain
    pub fn restrict_to_domain(&self, scenes: &[PathRow]) -> GqaResult<Vec<PathRow>> {
        let inside: Vec<PathRow> = scenes.iter().copied().filter(|s| self.domain.contains(s)).collect();
        if inside.is_empty() {
            return Err(GqaError::Resolution(format!(
                "no path/row inside the reference domain (paths {}-{}, rows {}-{}) among {:?}",
                self.domain.path_min, self.domain.path_max, self.domain.row_min, self.domain.row_max, scenes
            )));
        }
        Ok(inside)
    }

    /// First repository holding a directory for `entry`, with that directory
    pub fn reference_directory(&self, entry: &PathRow) -> Option<(PathBuf, PathBuf)> {
        self.directories.iter().find_map(|root| {
            let folder = root.join(entry.relative_dir());
            if folder.is_dir() {
                Some((root.clone(), folder))
            } else {
                log::info!("No reference directory {}, trying next repository", folder.display());
                None
            }
        })
    }

    /// Whether a single path/row can be assessed; returns the repository root
    /// that would supply its reference imagery
    pub fn check_reference_availability(&self, entry: &PathRow) -> GqaResult<PathBuf> {
        if !self.domain.contains(entry) {
            return Err(GqaError::Resolution(format!(
                "path/row {} is outside the reference domain",
                entry
            )));
        }
        self.reference_directory(entry)
            .map(|(root, _)| root)
            .ok_or_else(|| {
                GqaError::Resolution(format!(
                    "no reference or backup reference imagery available for {}",
                    entry
                ))
            })
    }

    /// Acquisition date encoded in a reference filename, if the filename follows
    /// either naming convention and carries the band matching `band_id`
    pub fn reference_date(&self, filename: &str, band_id: &str, sensor: &str) -> Option<DateTime<Utc>> {
        if let Some(caps) = self.primary.captures(filename) {
            let expected = self.band_maps.primary_band(&caps["sat"], sensor, band_id);
            if expected == Some(&caps["band"]) {
                if let Ok(date) = NaiveDate::parse_from_str(&caps["year_doy"], "%Y%j") {
                    return Some(midnight_utc(date));
                }
            }
        }

        if let Some(caps) = self.legacy.captures(filename) {
            let expected = self.band_maps.legacy_band(sensor, band_id);
            if expected == Some(&caps["band"]) {
                if let Ok(date) = NaiveDate::parse_from_str(&caps["yyyymmdd"], "%Y%m%d") {
                    return Some(midnight_utc(date));
                }
            }
        }

        None
    }

    /// Reference image in `folder` closest in time to `timestamp`
    pub fn closest_match(
        &self,
        folder: &Path,
        timestamp: DateTime<Utc>,
        band_id: &str,
        sensor: &str,
    ) -> GqaResult<Option<PathBuf>> {
        // Directory listing order is kept so ties resolve to the first entry seen
        let mut dated = Vec::new();
        for entry in std::fs::read_dir(folder)? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if !self.image.is_match(&name) {
                continue;
            }
            match self.reference_date(&name, band_id, sensor) {
                Some(date) => dated.push((name, date)),
                None => log::debug!("Ignoring {}: no date for band {}", name, band_id),
            }
        }

        Ok(nearest_in_time(dated, timestamp).map(|name| folder.join(name)))
    }

    /// Closest reference image for every in-domain entry, walking the
    /// repository chain per entry
    pub fn get_reference_imagery(
        &self,
        scenes: &[PathRow],
        timestamp: DateTime<Utc>,
        band_id: &str,
        sensor: &str,
        raster: &dyn RasterIo,
    ) -> GqaResult<Vec<ReferenceImage>> {
        let in_domain = self.restrict_to_domain(scenes)?;

        let mut found = Vec::new();
        for entry in &in_domain {
            let Some((root, folder)) = self.reference_directory(entry) else {
                log::warn!("No repository holds a reference directory for {}", entry);
                continue;
            };
            if let Some(path) = self.closest_match(&folder, timestamp, band_id, sensor)? {
                log::debug!("Reference for {}: {}", entry, path.display());
                found.push((path, root));
            }
        }

        if found.is_empty() {
            return Err(GqaError::Resolution(format!(
                "no reference found for {:?}",
                scenes.iter().map(|s| s.to_string()).collect::<Vec<_>>()
            )));
        }

        found
            .into_iter()
            .map(|(path, repository)| {
                let key = raster.spatial_reference(&path)?;
                Ok(ReferenceImage {
                    path,
                    repository,
                    key,
                })
            })
            .collect()
    }

    /// Provenance of a resolved image set: the first image supplies the source
    /// path, repository and date; the majority key supplies the resolution
    pub fn provenance(&self, images: &[ReferenceImage], band_id: &str, sensor: &str) -> GqaResult<ReferenceProvenance> {
        let first = images
            .first()
            .ok_or_else(|| GqaError::Resolution("no reference images".to_string()))?;
        let common = most_common(images)
            .ok_or_else(|| GqaError::Resolution("no reference images".to_string()))?;

        let filename = first
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(ReferenceProvenance {
            source_path: first.path.clone(),
            repository: first.repository.clone(),
            date: self.reference_date(&filename, band_id, sensor),
            resolution: common.key.abs_resolution(),
        })
    }
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
}

/// Item whose timestamp is closest to `target`; the first one wins a tie
pub fn nearest_in_time<T>(
    candidates: impl IntoIterator<Item = (T, DateTime<Utc>)>,
    target: DateTime<Utc>,
) -> Option<T> {
    let mut best: Option<(T, i64)> = None;
    for (item, date) in candidates {
        let delta = (date - target).num_milliseconds().abs();
        match &best {
            Some((_, best_delta)) if *best_delta <= delta => {}
            _ => best = Some((item, delta)),
        }
    }
    best.map(|(item, _)| item)
}

/// Image carrying the most frequent spatial reference key. Ties go to the key
/// seen first, and the first image with the winning key is returned.
pub fn most_common(images: &[ReferenceImage]) -> Option<&ReferenceImage> {
    let mut counts: Vec<(&SpatialReferenceKey, usize, &ReferenceImage)> = Vec::new();
    for image in images {
        match counts.iter_mut().find(|(key, _, _)| **key == image.key) {
            Some((_, count, _)) => *count += 1,
            None => counts.push((&image.key, 1, image)),
        }
    }

    let mut best: Option<(usize, &ReferenceImage)> = None;
    for (_, count, first) in counts {
        if best.map_or(true, |(best_count, _)| count > best_count) {
            best = Some((count, first));
        }
    }
    best.map(|(_, image)| image)
}

/// Reproject images off the majority key into `<work_dir>/reprojected_references`
/// and combine everything into one virtual mosaic at `out_file`
pub fn build_vrt(
    images: &[ReferenceImage],
    out_file: &Path,
    work_dir: &Path,
    raster: &dyn RasterIo,
) -> GqaResult<PathBuf> {
    let common = most_common(images)
        .ok_or_else(|| GqaError::InvalidInput("no reference images to mosaic".to_string()))?;
    log::debug!("GQA: chosen CRS {}", common.key);

    let temp_directory = work_dir.join("reprojected_references");
    std::fs::create_dir_all(&temp_directory)?;

    let mut members = Vec::with_capacity(images.len());
    for image in images {
        if image.key == common.key {
            members.push(image.path.clone());
            continue;
        }

        let name = image.path.file_name().ok_or_else(|| {
            GqaError::InvalidInput(format!("reference has no filename: {}", image.path.display()))
        })?;
        let out = temp_directory.join(name);
        log::info!("Reprojecting {} from {} to {}", image.path.display(), image.key, common.key);
        raster.reproject(&image.path, &common.path, &out)?;
        members.push(out);
    }

    raster.build_mosaic(&members, out_file)?;
    Ok(out_file.to_path_buf())
}
