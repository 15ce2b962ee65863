//! BAM reader handles backed by noodles.
//!
//! Each handle owns a single-threaded BGZF reader so that seeking by virtual position is
//! exact: a multi-threaded reader decompresses ahead and cannot report the position of the
//! next record.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use noodles::bam;
use noodles::bam::bai;
use noodles::bgzf;
use noodles::bgzf::VirtualPosition;
use noodles::sam::Header;
use noodles::sam::alignment::record_buf::RecordBuf;

use crate::codec::{AlignmentCodec, ReadOutcome, ReaderHandle, ValidationStringency};
use crate::errors::{DataSourceError, Result};
use crate::source::SourceFileId;
use crate::validation::validate_file_exists;

/// Opens BAM files with their BAI indexes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BamCodec;

impl BamCodec {
    /// Creates a BAM codec.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl AlignmentCodec for BamCodec {
    fn open(
        &self,
        file: &SourceFileId,
        stringency: ValidationStringency,
    ) -> Result<Box<dyn ReaderHandle>> {
        Ok(Box::new(BamReaderHandle::open(file.path(), stringency)?))
    }
}

/// An open BAM file positioned somewhere in its record stream.
pub struct BamReaderHandle {
    path: PathBuf,
    reader: bam::io::Reader<bgzf::io::Reader<File>>,
    header: Header,
    index: Option<bai::Index>,
    data_start: VirtualPosition,
    stringency: ValidationStringency,
    raw: bam::Record,
}

impl BamReaderHandle {
    /// Opens the BAM at `path`, reads its header, and loads a sibling BAI if one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, cannot be opened, its header cannot be
    /// decoded, or an index file exists but cannot be read.
    pub fn open(path: &Path, stringency: ValidationStringency) -> Result<Self> {
        validate_file_exists(path, "Input BAM")?;

        let file = File::open(path).map_err(|e| DataSourceError::codec(path.display(), e))?;
        let mut reader = bam::io::Reader::new(file);
        let header = reader.read_header().map_err(|e| DataSourceError::codec(path.display(), e))?;
        let data_start = reader.get_ref().virtual_position();

        let index = match find_index(path) {
            Some(index_path) => {
                debug!("Loading index {} for {}", index_path.display(), path.display());
                let index = bai::fs::read(&index_path)
                    .map_err(|e| DataSourceError::codec(index_path.display(), e))?;
                Some(index)
            }
            None => None,
        };

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            header,
            index,
            data_start,
            stringency,
            raw: bam::Record::default(),
        })
    }

    /// Path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReaderHandle for BamReaderHandle {
    fn header(&self) -> &Header {
        &self.header
    }

    fn index(&self) -> Option<&bai::Index> {
        self.index.as_ref()
    }

    fn data_start(&self) -> VirtualPosition {
        self.data_start
    }

    fn virtual_position(&self) -> VirtualPosition {
        self.reader.get_ref().virtual_position()
    }

    fn seek(&mut self, position: VirtualPosition) -> io::Result<()> {
        self.reader.get_mut().seek(position)?;
        Ok(())
    }

    fn read_record(&mut self) -> io::Result<ReadOutcome> {
        // Block and framing errors surface here and are never skipped.
        if self.reader.read_record(&mut self.raw)? == 0 {
            return Ok(ReadOutcome::EndOfStream);
        }

        match RecordBuf::try_from_alignment_record(&self.header, &self.raw) {
            Ok(record) => Ok(ReadOutcome::Record(record)),
            Err(e) => match self.stringency {
                ValidationStringency::Strict => Err(e),
                ValidationStringency::Lenient => {
                    warn!("Skipping undecodable record in {}: {e}", self.path.display());
                    Ok(ReadOutcome::Skipped)
                }
                ValidationStringency::Silent => Ok(ReadOutcome::Skipped),
            },
        }
    }
}

/// Finds the BAI for `path`: `<path>.bai` first, then `<stem>.bai`.
fn find_index(path: &Path) -> Option<PathBuf> {
    let mut appended = path.as_os_str().to_owned();
    appended.push(".bai");
    let appended = PathBuf::from(appended);
    if appended.is_file() {
        return Some(appended);
    }

    let replaced = path.with_extension("bai");
    if replaced != path && replaced.is_file() {
        return Some(replaced);
    }

    None
}
