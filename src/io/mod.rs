//! I/O modules for scene indices, raster preparation, external commands and
//! correlation results

pub mod command;
pub mod gverify_results;
pub mod raster;
pub mod scene_index;
pub mod tile_lists;

pub use command::{run_command, CommandOutput};
pub use gverify_results::parse_gverify;
pub use raster::{GdalRaster, RasterIo};
pub use scene_index::SceneIndex;
pub use tile_lists::{collect_gcp, tile_id_from_granule, OceanTileList};

#[cfg(feature = "gdal")]
pub use scene_index::OgrSceneIndex;
