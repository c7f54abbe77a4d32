use crate::types::{Footprint, GqaResult, PathRow};

/// Lookup of scene-index tiles (WRS-2 path/rows) by footprint
pub trait SceneIndex: Send + Sync {
    /// Path/rows whose footprint intersects `footprint`, in index order
    fn intersecting(&self, footprint: &Footprint) -> GqaResult<Vec<PathRow>>;
}

#[cfg(feature = "gdal")]
pub use ogr::OgrSceneIndex;

#[cfg(feature = "gdal")]
mod ogr {
    use super::SceneIndex;
    use crate::types::{Footprint, GqaError, GqaResult, PathRow};
    use gdal::vector::{Geometry, LayerAccess};
    use gdal::Dataset;
    use std::path::{Path, PathBuf};

    /// Scene index read from a vector file (e.g. the Landsat WRS-2 shapefile)
    /// with integer `PATH` and `ROW` attributes
    #[derive(Debug, Clone)]
    pub struct OgrSceneIndex {
        path: PathBuf,
    }

    impl OgrSceneIndex {
        pub fn new<P: AsRef<Path>>(path: P) -> GqaResult<Self> {
            let path = path.as_ref().to_path_buf();
            if !path.exists() {
                return Err(GqaError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("Scene index not found: {}", path.display()),
                )));
            }
            Ok(Self { path })
        }
    }

    impl SceneIndex for OgrSceneIndex {
        fn intersecting(&self, footprint: &Footprint) -> GqaResult<Vec<PathRow>> {
            let wkt = footprint.to_wkt();
            log::debug!("Querying scene index {} for {}", self.path.display(), wkt);

            let dataset = Dataset::open(&self.path)?;
            let mut layer = dataset.layer(0)?;
            let polygon = Geometry::from_wkt(&wkt)?;
            // Bounding-box prefilter; the exact test follows per feature
            layer.set_spatial_filter(&polygon);

            let mut entries = Vec::new();
            for feature in layer.features() {
                let intersects = match feature.geometry() {
                    Some(geometry) => geometry.intersects(&polygon),
                    None => false,
                };
                if !intersects {
                    continue;
                }

                let path = feature.field_as_integer_by_name("PATH")?;
                let row = feature.field_as_integer_by_name("ROW")?;
                match (path, row) {
                    (Some(path), Some(row)) if path >= 0 && row >= 0 => {
                        entries.push(PathRow::new(path as u32, row as u32));
                    }
                    _ => log::warn!("Skipping scene index feature without PATH/ROW"),
                }
            }

            Ok(entries)
        }
    }

}
