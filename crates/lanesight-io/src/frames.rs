//! A directory of still images played back as a camera stream.
//!
//! Files are ordered by name, so zero-padded sequences
//! (`frame_000001.png`, ...) replay in capture order. The n-th file gets
//! frame id `n` (from 0) and timestamp `n / fps`.

use std::path::{Path, PathBuf};

use lanesight_pipeline::Frame;

use crate::IoError;

/// Frame rate assumed when none is given, matching the simulator's
/// fixed 20 Hz step.
pub const DEFAULT_FPS: f64 = 20.0;

/// Extensions recognized as frames (case-insensitive).
const EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

/// Ordered image files replayed as frames.
#[derive(Debug, Clone)]
pub struct FrameDirectory {
    paths: Vec<PathBuf>,
    fps: f64,
}

impl FrameDirectory {
    /// List the supported images in `dir`.
    ///
    /// # Errors
    ///
    /// [`IoError::InvalidFrameRate`] unless `fps` is positive and finite,
    /// [`IoError::Io`] if the directory cannot be read,
    /// [`IoError::NoFrames`] if it holds no supported image.
    pub fn open(dir: &Path, fps: f64) -> Result<Self, IoError> {
        if !(fps.is_finite() && fps > 0.0) {
            return Err(IoError::InvalidFrameRate(fps));
        }
        let entries = std::fs::read_dir(dir).map_err(|e| IoError::io(dir, e))?;
        let mut paths = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| IoError::io(dir, e))?.path();
            if path.is_file() && is_supported(&path) {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            return Err(IoError::NoFrames(dir.to_path_buf()));
        }
        paths.sort();
        tracing::info!("{} frames in {} at {fps} fps", paths.len(), dir.display());
        Ok(Self { paths, fps })
    }

    /// Number of frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Always `false`; [`open`](Self::open) rejects empty directories.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Playback rate.
    #[must_use]
    pub const fn fps(&self) -> f64 {
        self.fps
    }

    /// Timestamp of frame `frame_id`, in seconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn timestamp(&self, frame_id: u64) -> f64 {
        frame_id as f64 / self.fps
    }

    /// Decode frame `index`, or `None` past the end.
    ///
    /// # Errors
    ///
    /// [`IoError::Image`] if the file cannot be decoded.
    pub fn load(&self, index: usize) -> Option<Result<Frame, IoError>> {
        let path = self.paths.get(index)?;
        let frame_id = u64::try_from(index).ok()?;
        Some(
            image::open(path)
                .map(|img| Frame::new(img.to_rgba8(), frame_id, self.timestamp(frame_id)))
                .map_err(|source| IoError::Image {
                    path: path.clone(),
                    source,
                }),
        )
    }

    /// Decode every frame lazily, in order.
    pub fn frames(&self) -> impl Iterator<Item = Result<Frame, IoError>> + '_ {
        (0..self.paths.len()).filter_map(|i| self.load(i))
    }
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}
