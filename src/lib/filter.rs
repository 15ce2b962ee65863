//! Record predicates applied during traversal.
//!
//! A filter answers "should this record be dropped?". Shards may carry one filter applied to
//! each file's records before merging; the data source configuration may add supplemental
//! filters applied last, after order verification and downsampling.

use std::fmt;

use noodles::sam::alignment::record_buf::RecordBuf;

/// A predicate that removes records from a traversal.
pub trait ReadFilter: Send + Sync {
    /// Returns `true` if `record` should be dropped.
    fn filter_out(&self, record: &RecordBuf) -> bool;
}

impl<F> ReadFilter for F
where
    F: Fn(&RecordBuf) -> bool + Send + Sync,
{
    fn filter_out(&self, record: &RecordBuf) -> bool {
        self(record)
    }
}

/// Drops unmapped records.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnmappedReadFilter;

impl ReadFilter for UnmappedReadFilter {
    fn filter_out(&self, record: &RecordBuf) -> bool {
        record.flags().is_unmapped()
    }
}

/// Drops records flagged as duplicates.
#[derive(Debug, Clone, Copy, Default)]
pub struct DuplicateReadFilter;

impl ReadFilter for DuplicateReadFilter {
    fn filter_out(&self, record: &RecordBuf) -> bool {
        record.flags().is_duplicate()
    }
}

/// Drops secondary alignments.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecondaryAlignmentFilter;

impl ReadFilter for SecondaryAlignmentFilter {
    fn filter_out(&self, record: &RecordBuf) -> bool {
        record.flags().is_secondary()
    }
}

/// Drops records failing vendor quality checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailsVendorQualityFilter;

impl ReadFilter for FailsVendorQualityFilter {
    fn filter_out(&self, record: &RecordBuf) -> bool {
        record.flags().is_qc_fail()
    }
}

/// Drops records whose mapping quality is below `min`, or missing (255).
#[derive(Debug, Clone, Copy)]
pub struct MappingQualityFilter {
    /// Lowest mapping quality kept.
    pub min: u8,
}

impl ReadFilter for MappingQualityFilter {
    fn filter_out(&self, record: &RecordBuf) -> bool {
        record.mapping_quality().is_none_or(|mapq| u8::from(mapq) < self.min)
    }
}

impl fmt::Display for MappingQualityFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MAPQ >= {}", self.min)
    }
}
