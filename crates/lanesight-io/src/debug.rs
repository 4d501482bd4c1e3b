//! Debug raster dumps.
//!
//! Writes the intermediate rasters of a [`StagedFrame`] as PNGs so
//! threshold and region-of-interest tuning can be checked by eye:
//! `<dir>/<frame_id>_gray.png`, `_edges.png` and `_masked.png`.

use std::path::{Path, PathBuf};

use lanesight_pipeline::{GrayImage, StagedFrame};

use crate::IoError;

/// Which intermediate rasters exist, in write order.
pub const STAGES: [&str; 3] = ["gray", "edges", "masked"];

/// File path for one stage of one frame.
#[must_use]
pub fn stage_path(dir: &Path, frame_id: u64, stage: &str) -> PathBuf {
    dir.join(format!("{frame_id:06}_{stage}.png"))
}

/// Write the gray, edge and masked-edge rasters of `staged`.
///
/// Returns the written paths in [`STAGES`] order.
///
/// # Errors
///
/// [`IoError::Io`] if `dir` cannot be created, [`IoError::Image`] if a
/// PNG cannot be written.
pub fn write_stages(dir: &Path, staged: &StagedFrame) -> Result<Vec<PathBuf>, IoError> {
    std::fs::create_dir_all(dir).map_err(|e| IoError::io(dir, e))?;
    let frame_id = staged.diagnostics.frame_id;
    let rasters: [&GrayImage; 3] = [&staged.gray, &staged.edges, &staged.masked_edges];
    STAGES
        .iter()
        .zip(rasters)
        .map(|(stage, raster)| {
            let path = stage_path(dir, frame_id, stage);
            raster.save(&path).map_err(|source| IoError::Image {
                path: path.clone(),
                source,
            })?;
            Ok(path)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_paths_are_zero_padded() {
        let path = stage_path(Path::new("out"), 42, "edges");
        assert_eq!(path, Path::new("out").join("000042_edges.png"));
    }
}
