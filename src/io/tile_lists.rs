use crate::types::{GqaError, GqaResult, PathRow};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Tiles that are correlated against fixed control point locations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OceanTileList {
    tiles: HashSet<String>,
}

impl OceanTileList {
    /// Read a list with one tile id per line
    pub fn from_file<P: AsRef<Path>>(path: P) -> GqaResult<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            GqaError::Io(std::io::Error::new(
                e.kind(),
                format!("ocean tile list {}: {}", path.as_ref().display(), e),
            ))
        })?;

        let mut tiles = HashSet::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            let tile = line.trim();
            if !tile.is_empty() {
                tiles.insert(tile.to_string());
            }
        }

        log::debug!("Loaded {} ocean tiles", tiles.len());
        Ok(Self { tiles })
    }

    pub fn contains(&self, tile_id: &str) -> bool {
        self.tiles.contains(tile_id)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for OceanTileList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            tiles: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Tile id embedded in a granule name: the second to last `_` token without
/// its leading character (`..._T52KGA_N02.01` → `52KGA`)
pub fn tile_id_from_granule(granule: &str) -> GqaResult<String> {
    let tokens: Vec<&str> = granule.split('_').collect();
    if tokens.len() < 2 {
        return Err(GqaError::InvalidInput(format!(
            "granule name has no tile token: {}",
            granule
        )));
    }

    let token = tokens[tokens.len() - 2];
    let mut chars = token.chars();
    match chars.next() {
        Some(_) if !chars.as_str().is_empty() => Ok(chars.as_str().to_string()),
        _ => Err(GqaError::InvalidInput(format!(
            "granule name has an empty tile token: {}",
            granule
        ))),
    }
}

/// Concatenate `<root>/<PPP>/<RRR>/points.txt` for every scene into `destination`
pub fn collect_gcp(root: &Path, scenes: &[PathRow], destination: &Path) -> GqaResult<PathBuf> {
    let mut dest = BufWriter::new(File::create(destination)?);

    for scene in scenes {
        let points = root.join(scene.relative_dir()).join("points.txt");
        log::debug!("Collecting GCPs from {}", points.display());

        let mut src = File::open(&points).map_err(|e| {
            GqaError::Io(std::io::Error::new(
                e.kind(),
                format!("fixed location points {}: {}", points.display(), e),
            ))
        })?;
        std::io::copy(&mut src, &mut dest)?;
    }

    dest.flush()?;
    Ok(destination.to_path_buf())
}
