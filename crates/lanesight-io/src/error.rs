//! Error type for filesystem collaborators.

use std::path::PathBuf;

use lanesight_pipeline::ConfigError;

/// Errors raised while reading inputs or writing outputs.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Reading or writing a file failed.
    #[error("{}: {source}", path.display())]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A JSON document failed to parse.
    #[error("{}: {source}", path.display())]
    Json {
        /// Offending file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// An image failed to decode or encode.
    #[error("{}: {source}", path.display())]
    Image {
        /// Offending file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: image::ImageError,
    },

    /// The configuration parsed but did not validate.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// A frame directory contains no supported images.
    #[error("no frames found in {}", .0.display())]
    NoFrames(PathBuf),

    /// Frame rate must be positive and finite.
    #[error("frame rate must be positive, got {0}")]
    InvalidFrameRate(f64),
}

impl IoError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
