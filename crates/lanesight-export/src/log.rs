//! Validation log rows.
//!
//! One comma-separated line per [`ValidationRecord`]:
//!
//! ```text
//! frame_id,timestamp,pixel_error,threshold,passed
//! 100,5.000,3.250,30.000,true
//! ```
//!
//! Floats are written with three decimals. [`parse_row`] reads a row
//! back, which the file sink's tests and offline analysis rely on.

use lanesight_pipeline::{ValidationRecord, ValidationSummary};

/// Column names, in row order.
pub const COLUMNS: [&str; 5] = ["frame_id", "timestamp", "pixel_error", "threshold", "passed"];

/// Errors from [`parse_row`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogError {
    /// Wrong number of comma-separated fields.
    #[error("expected {expected} fields, found {found}")]
    FieldCount {
        /// Always [`COLUMNS`]`.len()`.
        expected: usize,
        /// Fields present in the row.
        found: usize,
    },

    /// A field did not parse.
    #[error("invalid {column}: {value:?}")]
    InvalidField {
        /// Column name.
        column: &'static str,
        /// Offending text.
        value: String,
    },
}

/// The header line, without a trailing newline.
#[must_use]
pub fn header() -> String {
    COLUMNS.join(",")
}

/// One record as a row, without a trailing newline.
#[must_use]
pub fn to_row(record: &ValidationRecord) -> String {
    format!(
        "{},{:.3},{:.3},{:.3},{}",
        record.frame_id, record.timestamp, record.pixel_error, record.threshold, record.passed
    )
}

/// Header plus one row per record, newline-terminated.
#[must_use]
pub fn to_log(records: &[ValidationRecord]) -> String {
    let mut out = header();
    out.push('\n');
    for record in records {
        out.push_str(&to_row(record));
        out.push('\n');
    }
    out
}

/// Comment line summarizing a finished run.
#[must_use]
pub fn summary_line(summary: &ValidationSummary) -> String {
    let mean = summary
        .mean_error
        .map_or_else(|| "n/a".to_string(), |e| format!("{e:.3}"));
    format!(
        "# captures={} passed={} failed={} skipped={} mean_error={mean}",
        summary.captures, summary.passed, summary.failed, summary.skipped
    )
}

/// Parse a row written by [`to_row`].
///
/// # Errors
///
/// [`LogError`] if the field count is wrong or any field fails to parse.
pub fn parse_row(line: &str) -> Result<ValidationRecord, LogError> {
    let fields: Vec<&str> = line.trim().split(',').collect();
    let [frame_id, timestamp, pixel_error, threshold, passed] = fields[..] else {
        return Err(LogError::FieldCount {
            expected: COLUMNS.len(),
            found: fields.len(),
        });
    };
    Ok(ValidationRecord {
        frame_id: parse_field(COLUMNS[0], frame_id)?,
        timestamp: parse_field(COLUMNS[1], timestamp)?,
        pixel_error: parse_field(COLUMNS[2], pixel_error)?,
        threshold: parse_field(COLUMNS[3], threshold)?,
        passed: parse_field(COLUMNS[4], passed)?,
    })
}

fn parse_field<T: std::str::FromStr>(column: &'static str, value: &str) -> Result<T, LogError> {
    value.trim().parse().map_err(|_| LogError::InvalidField {
        column,
        value: value.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn record() -> ValidationRecord {
        ValidationRecord {
            frame_id: 100,
            timestamp: 5.0,
            pixel_error: 3.25,
            threshold: 30.0,
            passed: true,
        }
    }

    #[test]
    fn header_lists_columns_in_order() {
        assert_eq!(header(), "frame_id,timestamp,pixel_error,threshold,passed");
    }

    #[test]
    fn row_format() {
        assert_eq!(to_row(&record()), "100,5.000,3.250,30.000,true");
    }

    #[test]
    fn failed_record_row() {
        let r = ValidationRecord {
            pixel_error: 41.5,
            passed: false,
            ..record()
        };
        assert!(to_row(&r).ends_with("41.500,30.000,false"));
    }

    #[test]
    fn log_has_header_and_one_line_per_record() {
        let log = to_log(&[record(), record()]);
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], header());
        assert!(log.ends_with('\n'));
    }

    #[test]
    fn empty_log_is_just_the_header() {
        assert_eq!(to_log(&[]), format!("{}\n", header()));
    }

    #[test]
    fn parse_reads_back_a_row() {
        let parsed = parse_row(&to_row(&record())).unwrap();
        assert_eq!(parsed, record());
    }

    #[test]
    fn parse_rejects_short_rows() {
        assert_eq!(
            parse_row("1,2,3"),
            Err(LogError::FieldCount {
                expected: 5,
                found: 3
            })
        );
    }

    #[test]
    fn parse_rejects_bad_fields() {
        let err = parse_row("1,0.0,abc,30.0,true").unwrap_err();
        assert_eq!(
            err,
            LogError::InvalidField {
                column: "pixel_error",
                value: "abc".to_string()
            }
        );
    }

    #[test]
    fn summary_line_formats_mean() {
        let summary = ValidationSummary {
            captures: 20,
            skipped: 1,
            passed: 18,
            failed: 1,
            mean_error: Some(4.5),
        };
        assert_eq!(
            summary_line(&summary),
            "# captures=20 passed=18 failed=1 skipped=1 mean_error=4.500"
        );
        let empty = ValidationSummary::default();
        assert!(summary_line(&empty).ends_with("mean_error=n/a"));
    }
}
