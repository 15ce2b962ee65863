//! SAM header and record helpers.
//!
//! This module provides:
//! - Sort-order inspection of SAM headers ([`is_sorted`], [`check_coordinate_sorted`])
//! - Read group lookup on records ([`read_group_id`])
//! - Builders for test records, headers, and BAM fixtures ([`builder`])

pub mod builder;

pub use builder::{DEFAULT_REFERENCE_LENGTH, RecordBuilder, SamBuilder, reference_header};

use bstr::BString;
use log::{debug, warn};
use noodles::core::Position;
use noodles::sam::Header;
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record_buf::RecordBuf;
use noodles::sam::alignment::record_buf::data::field::Value as BufValue;
use noodles::sam::header::record::value::map::header::sort_order::COORDINATE;

use crate::codec::ValidationStringency;
use crate::errors::{DataSourceError, Result};
use crate::source::SourceFileId;

/// Returns the `SO` value of the header's `@HD` line, if any.
#[must_use]
pub fn sort_order(header: &Header) -> Option<&[u8]> {
    header
        .header()
        .and_then(|hd| hd.other_fields().get(b"SO"))
        .map(|so| <_ as AsRef<[u8]>>::as_ref(so))
}

/// Checks if a header declares the given sort order.
#[must_use]
pub fn is_sorted(header: &Header, order: &[u8]) -> bool {
    sort_order(header) == Some(order)
}

/// Checks that `file`'s header declares coordinate order.
///
/// Merging relies on every input being coordinate sorted. Under
/// [`ValidationStringency::Strict`] any other declared order (or none) is an error; under
/// [`ValidationStringency::Lenient`] it is a warning.
///
/// # Errors
///
/// Returns [`DataSourceError::UnsortedInput`] under strict validation when the file is not
/// declared coordinate sorted.
pub fn check_coordinate_sorted(
    header: &Header,
    file: &SourceFileId,
    stringency: ValidationStringency,
) -> Result<()> {
    let declared = sort_order(header).map_or_else(|| "unknown".to_string(), |so| {
        String::from_utf8_lossy(so).into_owned()
    });
    debug!("{file} has sort order {declared}");

    if is_sorted(header, COORDINATE) {
        return Ok(());
    }

    match stringency {
        ValidationStringency::Strict => {
            Err(DataSourceError::UnsortedInput { path: file.to_string(), sort_order: declared })
        }
        ValidationStringency::Lenient => {
            warn!("{file} does not appear to be coordinate sorted per the SAM header (SO:{declared}).");
            warn!("Continuing, but merged output may be out of order.");
            Ok(())
        }
        ValidationStringency::Silent => Ok(()),
    }
}

/// Returns the record's `RG` tag value, if it is a string.
#[must_use]
pub fn read_group_id(record: &RecordBuf) -> Option<&BString> {
    match record.data().get(&Tag::READ_GROUP) {
        Some(BufValue::String(id)) => Some(id),
        _ => None,
    }
}

/// The `(reference, start, end, is_mapped)` context a binning indexer records for `record`.
pub(crate) fn index_context(record: &RecordBuf) -> Option<(usize, Position, Position, bool)> {
    match (record.reference_sequence_id(), record.alignment_start()) {
        (Some(reference_sequence_id), Some(start)) if !record.flags().is_unmapped() => {
            let end = record.alignment_end().unwrap_or(start);
            Some((reference_sequence_id, start, end, true))
        }
        _ => None,
    }
}
