//! lanesight-io: Filesystem collaborators for the lane pipeline.
//!
//! The pipeline crate is sans-IO; this crate supplies the pieces that
//! touch disk: frame directories standing in for a live camera, ground
//! truth files, JSON configuration, the validation log file, and debug
//! raster dumps.

pub mod config;
pub mod debug;
pub mod error;
pub mod frames;
pub mod ground_truth;
mod json;
pub mod sink;

pub use config::{load_config, parse_config};
pub use error::IoError;
pub use frames::FrameDirectory;
pub use ground_truth::GroundTruthFile;
pub use sink::CsvLogSink;
