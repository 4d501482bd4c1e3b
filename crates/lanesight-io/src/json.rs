//! Shared JSON decoding with path-tagged errors.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::IoError;

/// Path reported for documents that did not come from a file.
pub(crate) const INLINE: &str = "<inline>";

/// Decode `text`, attributing parse errors to `path`.
pub(crate) fn parse<T: DeserializeOwned>(text: &str, path: &Path) -> Result<T, IoError> {
    serde_json::from_str(text).map_err(|source| IoError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Read `path` and decode it.
pub(crate) fn read<T: DeserializeOwned>(path: &Path) -> Result<T, IoError> {
    let text = std::fs::read_to_string(path).map_err(|e| IoError::io(path, e))?;
    parse(&text, path)
}
