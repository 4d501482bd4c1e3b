//! JSON configuration files.
//!
//! Missing sections and fields fall back to their defaults, so a file
//! only needs the values it changes:
//!
//! ```json
//! { "tracking": { "alpha": 0.6 }, "bev": { "enabled": true } }
//! ```

use std::path::Path;

use lanesight_pipeline::{LaneConfig, ValidatedConfig};

use crate::{IoError, json};

/// Parse and validate a configuration document.
///
/// # Errors
///
/// [`IoError::Json`] for malformed JSON (reported against `<inline>`),
/// [`IoError::Config`] if validation fails.
pub fn parse_config(document: &str) -> Result<ValidatedConfig, IoError> {
    let config: LaneConfig = json::parse(document, Path::new(json::INLINE))?;
    Ok(config.validate()?)
}

/// Read, parse and validate a configuration file.
///
/// # Errors
///
/// [`IoError::Io`] if the file cannot be read, [`IoError::Json`] if it is
/// malformed, [`IoError::Config`] if validation fails.
pub fn load_config(path: &Path) -> Result<ValidatedConfig, IoError> {
    let config: LaneConfig = json::read(path)?;
    let validated = config.validate()?;
    tracing::info!("loaded configuration from {}", path.display());
    Ok(validated)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn partial_document_keeps_defaults() {
        let config = parse_config(r#"{"tracking":{"alpha":0.6}}"#).unwrap();
        assert!((config.tracking.alpha - 0.6).abs() < f64::EPSILON);
        assert_eq!(config.image, LaneConfig::default().image);
    }

    #[test]
    fn empty_object_is_default() {
        assert_eq!(parse_config("{}").unwrap().into_inner(), LaneConfig::default());
    }

    #[test]
    fn malformed_json_is_reported() {
        assert!(matches!(parse_config("{"), Err(IoError::Json { .. })));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let result = parse_config(r#"{"edges":{"low_threshold":200,"high_threshold":100}}"#);
        assert!(matches!(result, Err(IoError::Config(_))));
    }

    #[test]
    fn malformed_file_names_the_file() {
        let path = std::env::temp_dir().join("lanesight-malformed-config.json");
        std::fs::write(&path, "{ \"tracking\": ").unwrap();
        let result = load_config(&path);
        assert!(matches!(result, Err(IoError::Json { path: ref p, .. }) if *p == path));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let result = load_config(Path::new("/nonexistent/lanesight.json"));
        assert!(matches!(result, Err(IoError::Io { .. })));
    }
}
