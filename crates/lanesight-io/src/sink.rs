//! Validation log file.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use lanesight_pipeline::{ValidationRecord, ValidationSink, ValidationSummary};

use crate::IoError;

/// File name of the log inside the validation output directory.
pub const LOG_FILE_NAME: &str = "validation_log.csv";

/// Append-only CSV [`ValidationSink`].
///
/// The header is written when the file is created, so even a run with
/// no records leaves a well-formed log. Rows are buffered and flushed by
/// [`finalize`](ValidationSink::finalize).
#[derive(Debug)]
pub struct CsvLogSink {
    writer: BufWriter<File>,
    path: PathBuf,
    rows: usize,
}

impl CsvLogSink {
    /// Create `dir` if needed and start a fresh log in it, replacing any
    /// previous one.
    ///
    /// # Errors
    ///
    /// [`IoError::Io`] if the directory or file cannot be created.
    pub fn create(dir: &Path) -> Result<Self, IoError> {
        std::fs::create_dir_all(dir).map_err(|e| IoError::io(dir, e))?;
        let path = dir.join(LOG_FILE_NAME);
        let file = File::create(&path).map_err(|e| IoError::io(&path, e))?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", lanesight_export::header()).map_err(|e| IoError::io(&path, e))?;
        tracing::info!("writing validation log to {}", path.display());
        Ok(Self {
            writer,
            path,
            rows: 0,
        })
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows appended so far.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Append a trailing `#` comment with the run totals and flush.
    ///
    /// # Errors
    ///
    /// [`IoError::Io`] if the write or flush fails.
    pub fn write_summary(&mut self, summary: &ValidationSummary) -> Result<(), IoError> {
        writeln!(self.writer, "{}", lanesight_export::summary_line(summary))
            .and_then(|()| self.writer.flush())
            .map_err(|e| IoError::io(&self.path, e))
    }
}

impl ValidationSink for CsvLogSink {
    type Error = std::io::Error;

    fn append(&mut self, record: &ValidationRecord) -> Result<(), Self::Error> {
        writeln!(self.writer, "{}", lanesight_export::to_row(record))?;
        self.rows += 1;
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), Self::Error> {
        self.writer.flush()?;
        tracing::debug!("flushed {} validation rows to {}", self.rows, self.path.display());
        Ok(())
    }
}
