use crate::io::command::run_command;
use crate::types::{GqaError, GqaResult, SpatialReferenceKey};
use ndarray::Array2;
use std::path::{Path, PathBuf};
use std::process::Command;

/// No-data value written by the upstream ARD pipeline
pub const UPSTREAM_NODATA: f32 = -999.0;

/// No-data value the correlation tool expects
pub const GVERIFY_NODATA: f32 = 0.0;

/// Raster operations needed to prepare correlation inputs
pub trait RasterIo: Send + Sync {
    /// Coordinate system and pixel size of an image
    fn spatial_reference(&self, path: &Path) -> GqaResult<SpatialReferenceKey>;

    /// Copy the first band of `source` (any GDAL dataset name) to a compressed
    /// GeoTIFF, remapping [`UPSTREAM_NODATA`] to [`GVERIFY_NODATA`]
    fn extract_band(&self, source: &str, destination: &Path) -> GqaResult<()>;

    /// Warp `source` onto the coordinate system and resolution of `like`
    fn reproject(&self, source: &Path, like: &Path, destination: &Path) -> GqaResult<()>;

    /// Combine images sharing one coordinate system into a virtual mosaic
    fn build_mosaic(&self, images: &[PathBuf], destination: &Path) -> GqaResult<()>;
}

/// Replace every `from` pixel with `to`, returning the number replaced
pub fn remap_nodata(data: &mut Array2<f32>, from: f32, to: f32) -> usize {
    let mut replaced = 0;
    data.mapv_inplace(|v| {
        if v == from {
            replaced += 1;
            to
        } else {
            v
        }
    });
    replaced
}

/// [`RasterIo`] backed by GDAL: the library for dataset access (requires the
/// `gdal` feature) and the `gdalwarp`/`gdalbuildvrt` utilities for warping
/// and mosaicking
#[derive(Debug, Clone)]
pub struct GdalRaster {
    gdalwarp: PathBuf,
    gdalbuildvrt: PathBuf,
}

impl Default for GdalRaster {
    fn default() -> Self {
        Self {
            gdalwarp: PathBuf::from("gdalwarp"),
            gdalbuildvrt: PathBuf::from("gdalbuildvrt"),
        }
    }
}

impl GdalRaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use utilities from a specific GDAL installation
    pub fn with_tool_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            gdalwarp: dir.as_ref().join("gdalwarp"),
            gdalbuildvrt: dir.as_ref().join("gdalbuildvrt"),
        }
    }
}

fn work_dir_of(path: &Path) -> GqaResult<PathBuf> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

impl RasterIo for GdalRaster {
    fn spatial_reference(&self, path: &Path) -> GqaResult<SpatialReferenceKey> {
        dataset::spatial_reference(path)
    }

    fn extract_band(&self, source: &str, destination: &Path) -> GqaResult<()> {
        dataset::extract_band(source, destination)
    }

    fn reproject(&self, source: &Path, like: &Path, destination: &Path) -> GqaResult<()> {
        let target = self.spatial_reference(like)?;
        let (xres, yres) = target.abs_resolution();
        log::info!("Reprojecting {} to {}", source.display(), target);

        let mut command = Command::new(&self.gdalwarp);
        command
            .args(["-overwrite", "-of", "GTiff", "-r", "bilinear"])
            .args(["-srcnodata", "0", "-dstnodata", "0"])
            .arg("-t_srs")
            .arg(&target.crs)
            .arg("-tr")
            .arg(xres.to_string())
            .arg(yres.to_string())
            .arg(absolute(source))
            .arg(destination);

        run_command(command, &work_dir_of(destination)?, "gdalwarp", None)?;
        Ok(())
    }

    fn build_mosaic(&self, images: &[PathBuf], destination: &Path) -> GqaResult<()> {
        if images.is_empty() {
            return Err(GqaError::InvalidInput("no images to mosaic".to_string()));
        }
        log::info!("Building mosaic {} from {} images", destination.display(), images.len());

        let mut command = Command::new(&self.gdalbuildvrt);
        command
            .args(["-srcnodata", "0", "-vrtnodata", "0"])
            .arg(destination)
            .args(images.iter().map(|p| absolute(p)));

        run_command(command, &work_dir_of(destination)?, "gdalbuildvrt", None)?;
        Ok(())
    }
}

#[cfg(feature = "gdal")]
mod dataset {
    use super::{remap_nodata, GVERIFY_NODATA, UPSTREAM_NODATA};
    use crate::types::{GqaResult, SpatialReferenceKey};
    use gdal::raster::{Buffer, RasterCreationOption};
    use gdal::{Dataset, DriverManager};
    use std::path::Path;

    pub fn spatial_reference(path: &Path) -> GqaResult<SpatialReferenceKey> {
        let dataset = Dataset::open(path)?;
        let geo_transform = dataset.geo_transform()?;

        // Prefer an authority code, fall back to the full WKT
        let crs = match dataset.spatial_ref() {
            Ok(srs) => match (srs.auth_name(), srs.auth_code()) {
                (Ok(name), Ok(code)) => format!("{}:{}", name, code),
                _ => dataset.projection(),
            },
            Err(_) => dataset.projection(),
        };

        Ok(SpatialReferenceKey::new(crs, (geo_transform[1], geo_transform[5])))
    }

    pub fn extract_band(source: &str, destination: &Path) -> GqaResult<()> {
        log::info!("Extracting {} to {}", source, destination.display());

        let dataset = Dataset::open(Path::new(source))?;
        let (width, height) = dataset.raster_size();
        let band = dataset.rasterband(1)?;
        let mut data = band.read_as_array::<f32>((0, 0), (width, height), (width, height), None)?;

        let replaced = remap_nodata(&mut data, UPSTREAM_NODATA, GVERIFY_NODATA);
        log::debug!("Remapped {} no-data pixels", replaced);

        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let options = [
            RasterCreationOption { key: "COMPRESS", value: "DEFLATE" },
            RasterCreationOption { key: "ZLEVEL", value: "1" },
        ];
        let mut output = driver.create_with_band_type_with_options::<f32, _>(
            destination,
            width as _,
            height as _,
            1,
            &options,
        )?;
        output.set_geo_transform(&dataset.geo_transform()?)?;
        output.set_projection(&dataset.projection())?;

        let mut out_band = output.rasterband(1)?;
        out_band.set_no_data_value(Some(GVERIFY_NODATA as f64))?;
        let values: Vec<f32> = data.iter().copied().collect();
        out_band.write((0, 0), (width, height), &Buffer::new((width, height), values))?;

        Ok(())
    }
}

#[cfg(not(feature = "gdal"))]
mod dataset {
    use crate::types::{GqaError, GqaResult, SpatialReferenceKey};
    use std::path::Path;

    fn unsupported(what: &str) -> GqaError {
        GqaError::InvalidInput(format!("{} requires the `gdal` feature", what))
    }

    pub fn spatial_reference(_path: &Path) -> GqaResult<SpatialReferenceKey> {
        Err(unsupported("reading spatial references"))
    }

    pub fn extract_band(_source: &str, _destination: &Path) -> GqaResult<()> {
        Err(unsupported("band extraction"))
    }
}
