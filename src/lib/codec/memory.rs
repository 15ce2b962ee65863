//! In-memory corpora with synthetic virtual positions.
//!
//! Records registered with an [`InMemoryCodec`] are laid out as if they had been written to
//! a BGZF file with a fixed number of fixed-size records per block. Record `i` starts at
//! [`InMemoryCodec::virtual_position_of`]`(i)`, so chunk lists, seeks, and end-of-record
//! positions behave exactly as they do for a real file.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use noodles::bam::bai;
use noodles::bgzf::VirtualPosition;
use noodles::csi::binning_index::Indexer;
use noodles::csi::binning_index::index::reference_sequence::bin::Chunk as IndexChunk;
use noodles::sam::Header;
use noodles::sam::alignment::record_buf::RecordBuf;
use parking_lot::Mutex;

use crate::chunk::Chunk;
use crate::codec::{AlignmentCodec, ReadOutcome, ReaderHandle, ValidationStringency};
use crate::errors::{DataSourceError, Result};
use crate::source::SourceFileId;

/// Records stored in each synthetic block.
pub const RECORDS_PER_BLOCK: usize = 64;

/// Uncompressed bytes occupied by each synthetic record.
pub const RECORD_SIZE: usize = 512;

/// Compressed size of each synthetic block.
pub const BLOCK_SIZE: u64 = 16 * 1024;

/// Compressed offset of the first record block; the header occupies the blocks before it.
pub const HEADER_BLOCKS: u64 = 1;

/// A registered file: header, records, and optional index.
#[derive(Clone)]
struct InMemoryFile {
    header: Header,
    records: Arc<Vec<RecordBuf>>,
    index: Option<Arc<bai::Index>>,
}

/// A codec serving registered in-memory files.
#[derive(Default)]
pub struct InMemoryCodec {
    files: Mutex<HashMap<SourceFileId, InMemoryFile>>,
    opens: AtomicUsize,
}

impl InMemoryCodec {
    /// Creates an empty codec.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a file without an index. Records must already be coordinate sorted.
    pub fn insert(&self, id: impl Into<SourceFileId>, header: Header, records: Vec<RecordBuf>) {
        let file = InMemoryFile { header, records: Arc::new(records), index: None };
        self.files.lock().insert(id.into(), file);
    }

    /// Registers a file and builds a BAI-style index over its synthetic positions.
    ///
    /// # Errors
    ///
    /// Returns an error if the records cannot be indexed (e.g. they are not sorted).
    pub fn insert_indexed(
        &self,
        id: impl Into<SourceFileId>,
        header: Header,
        records: Vec<RecordBuf>,
    ) -> Result<()> {
        let id = id.into();
        let index = build_index(&id, &header, &records)?;
        let file = InMemoryFile { header, records: Arc::new(records), index: Some(Arc::new(index)) };
        self.files.lock().insert(id, file);
        Ok(())
    }

    /// Replaces the header served for `id` by handles opened from now on.
    ///
    /// # Errors
    ///
    /// Returns [`DataSourceError::UnknownFileId`] if `id` was never registered.
    pub fn replace_header(&self, id: &SourceFileId, header: Header) -> Result<()> {
        let mut files = self.files.lock();
        let file =
            files.get_mut(id).ok_or_else(|| DataSourceError::UnknownFileId { id: id.to_string() })?;
        file.header = header;
        Ok(())
    }

    /// Number of handles opened so far.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::Relaxed)
    }

    /// Virtual position at which record `i` of any registered file starts.
    #[must_use]
    pub fn virtual_position_of(i: usize) -> VirtualPosition {
        let block = HEADER_BLOCKS + (i / RECORDS_PER_BLOCK) as u64;
        let offset = u16::try_from((i % RECORDS_PER_BLOCK) * RECORD_SIZE).unwrap_or(u16::MAX);
        VirtualPosition::try_from((block * BLOCK_SIZE, offset)).unwrap_or(VirtualPosition::MAX)
    }

    /// The chunk selecting records `start..end` of any registered file.
    #[must_use]
    pub fn chunk_of(records: std::ops::Range<usize>) -> Chunk {
        Chunk::new(Self::virtual_position_of(records.start), Self::virtual_position_of(records.end))
    }
}

impl AlignmentCodec for InMemoryCodec {
    fn open(
        &self,
        file: &SourceFileId,
        _stringency: ValidationStringency,
    ) -> Result<Box<dyn ReaderHandle>> {
        let registered = self.files.lock().get(file).cloned().ok_or_else(|| {
            DataSourceError::codec(
                file,
                io::Error::new(io::ErrorKind::NotFound, "file is not registered"),
            )
        })?;
        self.opens.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(InMemoryHandle { file: registered, cursor: 0 }))
    }
}

/// Handle over one registered file.
struct InMemoryHandle {
    file: InMemoryFile,
    cursor: usize,
}

impl ReaderHandle for InMemoryHandle {
    fn header(&self) -> &Header {
        &self.file.header
    }

    fn index(&self) -> Option<&bai::Index> {
        self.file.index.as_deref()
    }

    fn data_start(&self) -> VirtualPosition {
        InMemoryCodec::virtual_position_of(0)
    }

    fn virtual_position(&self) -> VirtualPosition {
        InMemoryCodec::virtual_position_of(self.cursor)
    }

    fn seek(&mut self, position: VirtualPosition) -> io::Result<()> {
        // Positions grow with the record index, so binary search for the first record at or
        // after `position`.
        let (mut lo, mut hi) = (0, self.file.records.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if InMemoryCodec::virtual_position_of(mid) < position {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        self.cursor = lo;
        Ok(())
    }

    fn read_record(&mut self) -> io::Result<ReadOutcome> {
        match self.file.records.get(self.cursor) {
            Some(record) => {
                self.cursor += 1;
                Ok(ReadOutcome::Record(record.clone()))
            }
            None => Ok(ReadOutcome::EndOfStream),
        }
    }
}

/// Indexes records at their synthetic positions with the noodles binning indexer.
fn build_index(id: &SourceFileId, header: &Header, records: &[RecordBuf]) -> Result<bai::Index> {
    let mut indexer = Indexer::default();
    for (i, record) in records.iter().enumerate() {
        let chunk = IndexChunk::new(
            InMemoryCodec::virtual_position_of(i),
            InMemoryCodec::virtual_position_of(i + 1),
        );
        indexer
            .add_record(crate::sam::index_context(record), chunk)
            .map_err(|e| DataSourceError::codec(id, e))?;
    }
    Ok(indexer.build(header.reference_sequences().len()))
}
