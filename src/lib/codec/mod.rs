//! Alignment codec seam.
//!
//! The data source never decodes bytes itself. It drives per-file [`ReaderHandle`]s produced
//! by an [`AlignmentCodec`]: each handle exposes its header, an optional block index, the
//! virtual position it is positioned at, and the ability to seek to a virtual position and
//! decode the record found there. Chunk-restricted and whole-file scans are built on those
//! primitives in [`crate::merge`].
//!
//! Two codecs ship with the crate:
//!
//! - [`bam::BamCodec`] reads BAM files (and sibling BAI indexes) with noodles
//! - [`memory::InMemoryCodec`] serves registered records at synthetic virtual positions

pub mod bam;
pub mod memory;

use std::fmt;
use std::io;

use noodles::bam::bai;
use noodles::bgzf::VirtualPosition;
use noodles::sam::Header;
use noodles::sam::alignment::record_buf::RecordBuf;

use crate::errors::Result;
use crate::source::SourceFileId;

/// How strictly input files are validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationStringency {
    /// Problems are errors.
    #[default]
    Strict,
    /// Problems are logged and worked around.
    Lenient,
    /// Problems are worked around without logging.
    Silent,
}

impl fmt::Display for ValidationStringency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Strict => "STRICT",
            Self::Lenient => "LENIENT",
            Self::Silent => "SILENT",
        };
        f.write_str(name)
    }
}

/// What a [`ReaderHandle`] found at its current position.
#[derive(Debug)]
pub enum ReadOutcome {
    /// A decoded record.
    Record(RecordBuf),
    /// A record was consumed but could not be decoded.
    Skipped,
    /// No records remain.
    EndOfStream,
}

impl ReadOutcome {
    /// The decoded record, if any.
    #[must_use]
    pub fn into_record(self) -> Option<RecordBuf> {
        match self {
            Self::Record(record) => Some(record),
            Self::Skipped | Self::EndOfStream => None,
        }
    }
}

/// Open per-file reader state.
pub trait ReaderHandle: Send {
    /// The file's header as stored on disk.
    fn header(&self) -> &Header;

    /// The file's block index, if one was found.
    fn index(&self) -> Option<&bai::Index>;

    /// Virtual position of the first record (immediately after the header).
    fn data_start(&self) -> VirtualPosition;

    /// Virtual position of the next record to be read.
    fn virtual_position(&self) -> VirtualPosition;

    /// Positions the handle so the next read starts at `position`.
    fn seek(&mut self, position: VirtualPosition) -> io::Result<()>;

    /// Decodes the record at the current position.
    ///
    /// Failures to read the underlying stream (I/O errors, corrupt blocks) are always
    /// returned as errors. Only a record that was read in full but cannot be decoded may be
    /// reported as [`ReadOutcome::Skipped`], and only under a non-strict stringency.
    fn read_record(&mut self) -> io::Result<ReadOutcome>;
}

/// Opens reader handles for source files.
pub trait AlignmentCodec: Send + Sync {
    /// Opens `file`, reading its header and locating its index.
    fn open(
        &self,
        file: &SourceFileId,
        stringency: ValidationStringency,
    ) -> Result<Box<dyn ReaderHandle>>;
}
