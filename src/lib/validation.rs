//! Input validation utilities
//!
//! Validation functions for data source parameters and input files with consistent error
//! messages. All of them report failures as [`DataSourceError`] values.

use std::collections::HashSet;
use std::fmt::Display;
use std::path::Path;

use crate::errors::{DataSourceError, Result};
use crate::source::SourceFileId;

/// Validate that a file exists
///
/// # Arguments
/// * `path` - Path to validate
/// * `description` - Human-readable description of the file (e.g., "Input BAM")
///
/// # Errors
/// Returns [`DataSourceError::MissingFile`] if the file does not exist
///
/// # Example
/// ```
/// use bamshard::validation::validate_file_exists;
///
/// let result = validate_file_exists("/nonexistent/file.bam", "Input BAM");
/// assert!(result.is_err());
/// ```
pub fn validate_file_exists<P: AsRef<Path>>(path: P, description: &str) -> Result<()> {
    let path_ref = path.as_ref();
    if !path_ref.exists() {
        return Err(DataSourceError::MissingFile {
            path: path_ref.display().to_string(),
            description: description.to_string(),
        });
    }
    Ok(())
}

/// Validate that a probability lies in `[0, 1]`
///
/// # Errors
/// Returns an error if `value` is outside `[0, 1]` or NaN
pub fn validate_fraction(value: f64, name: &str) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(DataSourceError::InvalidParameter {
            parameter: name.to_string(),
            reason: format!("Must be between 0 and 1, got: {value}"),
        });
    }
    Ok(())
}

/// Validate that a value is positive
///
/// # Errors
/// Returns an error if `value <= 0`
#[allow(clippy::needless_pass_by_value)]
pub fn validate_positive<T: Ord + Display + Default>(value: T, name: &str) -> Result<()> {
    if value <= T::default() {
        return Err(DataSourceError::InvalidParameter {
            parameter: name.to_string(),
            reason: format!("Must be positive (> 0), got: {value}"),
        });
    }
    Ok(())
}

/// Validate that a list of source files is non-empty and free of duplicates
///
/// # Errors
/// Returns an error naming the first duplicated file, or if `files` is empty
pub fn validate_source_files(files: &[SourceFileId], name: &str) -> Result<()> {
    if files.is_empty() {
        return Err(DataSourceError::InvalidParameter {
            parameter: name.to_string(),
            reason: "At least one file is required".to_string(),
        });
    }

    let mut seen = HashSet::with_capacity(files.len());
    for file in files {
        if !seen.insert(file) {
            return Err(DataSourceError::InvalidParameter {
                parameter: name.to_string(),
                reason: format!("File '{file}' is listed more than once"),
            });
        }
    }
    Ok(())
}
