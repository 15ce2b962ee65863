//! Logging utilities for formatted output.
//!
//! Consistent count, percentage, and duration formatting plus the summary lines emitted
//! when a data source is opened and when a traversal is closed.

use std::time::Duration;

use crate::header_merger::MergedHeader;
use crate::traversal::TraversalStats;

/// Formats a count with thousands separators.
///
/// # Examples
///
/// ```
/// use bamshard::logging::format_count;
///
/// assert_eq!(format_count(0), "0");
/// assert_eq!(format_count(1_234_567), "1,234,567");
/// ```
#[must_use]
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Formats a fraction (0.0-1.0) as a percentage with `decimals` decimal places.
///
/// # Examples
///
/// ```
/// use bamshard::logging::format_percent;
///
/// assert_eq!(format_percent(0.9543, 2), "95.43%");
/// assert_eq!(format_percent(1.0, 0), "100%");
/// ```
#[must_use]
pub fn format_percent(value: f64, decimals: usize) -> String {
    format!("{:.decimals$}%", value * 100.0, decimals = decimals)
}

/// Formats a duration in human-readable form (e.g. "45s", "2m 15s", "1h 30m").
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        let mins = secs / 60;
        let remaining_secs = secs % 60;
        if remaining_secs == 0 { format!("{mins}m") } else { format!("{mins}m {remaining_secs}s") }
    } else {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        if mins == 0 { format!("{hours}h") } else { format!("{hours}h {mins}m") }
    }
}

/// Logs the merged header once a data source is opened.
pub fn log_header_summary(merged: &MergedHeader) {
    let header = merged.header();
    log::info!(
        "Opened {} file(s): {} reference(s), {} read group(s), {} program(s)",
        merged.files().len(),
        header.reference_sequences().len(),
        header.read_groups().len(),
        header.programs().as_ref().len()
    );
    if merged.has_read_group_collisions() {
        log::warn!("Read group ids collide across files; colliding ids are remapped");
    }
}

/// Logs the record counts of a finished traversal.
#[allow(clippy::cast_precision_loss)]
pub fn log_traversal_summary(stats: &TraversalStats, elapsed: Duration) {
    log::debug!(
        "Traversal closed after {}: {} merged, {} emitted",
        format_duration(elapsed),
        format_count(stats.merged),
        format_count(stats.emitted)
    );
    if stats.downsampled > 0 {
        log::debug!(
            "  Downsampled away {} ({})",
            format_count(stats.downsampled),
            format_percent(stats.downsampled as f64 / stats.merged.max(1) as f64, 2)
        );
    }
    if stats.filtered > 0 {
        log::debug!("  Filtered out {}", format_count(stats.filtered));
    }
}
