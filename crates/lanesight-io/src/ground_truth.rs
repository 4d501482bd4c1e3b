//! Ground truth stored as JSON.
//!
//! The file is an array of samples, one per annotated frame:
//!
//! ```json
//! [
//!   { "frame_id": 100,
//!     "left":  { "line": { "slope": -1.0, "intercept": 700.0 } },
//!     "right": { "polyline": [ { "x": 940.0, "y": 440.0 }, { "x": 1200.0, "y": 700.0 } ] } }
//! ]
//! ```
//!
//! Coordinates are in working-resolution pixels. Frames without an entry
//! have no ground truth, and validation ticks landing on them are skipped.

use std::collections::BTreeMap;
use std::path::Path;

use lanesight_pipeline::{GroundTruthSample, GroundTruthSource};

use crate::{IoError, json};

/// Ground truth samples indexed by frame id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroundTruthFile {
    samples: BTreeMap<u64, GroundTruthSample>,
}

impl GroundTruthFile {
    /// Parse a JSON array of samples. A later duplicate frame id replaces
    /// an earlier one.
    ///
    /// # Errors
    ///
    /// [`IoError::Json`] (reported against `<inline>`) if the document is
    /// malformed.
    pub fn from_json(document: &str) -> Result<Self, IoError> {
        let samples: Vec<GroundTruthSample> = json::parse(document, Path::new(json::INLINE))?;
        Ok(Self::from_samples(samples))
    }

    /// Read and parse a ground truth file.
    ///
    /// # Errors
    ///
    /// [`IoError::Io`] if the file cannot be read, [`IoError::Json`] if it
    /// is malformed.
    pub fn load(path: &Path) -> Result<Self, IoError> {
        let samples: Vec<GroundTruthSample> = json::read(path)?;
        let file = Self::from_samples(samples);
        tracing::info!(
            "loaded ground truth for {} frames from {}",
            file.len(),
            path.display()
        );
        Ok(file)
    }

    /// Index samples by frame id.
    #[must_use]
    pub fn from_samples(samples: impl IntoIterator<Item = GroundTruthSample>) -> Self {
        Self {
            samples: samples.into_iter().map(|s| (s.frame_id, s)).collect(),
        }
    }

    /// Number of annotated frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no frame is annotated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl GroundTruthSource for GroundTruthFile {
    fn sample(&self, frame_id: u64) -> Option<GroundTruthSample> {
        self.samples.get(&frame_id).cloned()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use lanesight_pipeline::ReferenceLine;

    use super::*;

    const DOC: &str = r#"[
        { "frame_id": 100,
          "left": { "line": { "slope": -1.0, "intercept": 700.0 } },
          "right": { "polyline": [ { "x": 940.0, "y": 440.0 }, { "x": 1200.0, "y": 700.0 } ] } },
        { "frame_id": 300, "right": { "line": { "slope": 1.0, "intercept": 500.0 } } }
    ]"#;

    #[test]
    fn parses_both_reference_forms() {
        let file = GroundTruthFile::from_json(DOC).unwrap();
        assert_eq!(file.len(), 2);
        let sample = file.sample(100).unwrap();
        assert!(matches!(sample.left, Some(ReferenceLine::Line { .. })));
        let right = sample.right.unwrap();
        assert!((right.x_at(570.0).unwrap() - 1070.0).abs() < 1e-9);
    }

    #[test]
    fn missing_side_defaults_to_none() {
        let file = GroundTruthFile::from_json(DOC).unwrap();
        let sample = file.sample(300).unwrap();
        assert!(sample.left.is_none());
        assert!(sample.right.is_some());
    }

    #[test]
    fn unknown_frame_has_no_sample() {
        let file = GroundTruthFile::from_json(DOC).unwrap();
        assert!(file.sample(101).is_none());
    }

    #[test]
    fn empty_array_is_empty() {
        assert!(GroundTruthFile::from_json("[]").unwrap().is_empty());
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(matches!(
            GroundTruthFile::from_json(r#"{"frame_id": 1}"#),
            Err(IoError::Json { .. })
        ));
    }
}
