//! Coordinate-ordered merging of per-file record sequences.
//!
//! Each file selected by a shard is read through a [`FileSequence`] restricted to that file's
//! chunks (or spanning the whole file). A [`MergingIterator`] keeps the head record of every
//! active sequence in a min-heap keyed by [`CoordinateKey`] and pops them in order, so the
//! merged stream is sorted by (reference, start) with ties broken by file registration order.
//!
//! Records are rewritten through the [`MergedHeader`] as they leave their file, so keys and
//! read group ids always refer to the merged header.
//!
//! Sequences do not own their reader handles: the handles belong to the leased
//! [`ReaderBundle`], which is passed to [`MergingIterator::next`] on every pull.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, VecDeque};
use std::fmt;
use std::sync::Arc;

use noodles::bgzf::VirtualPosition;
use noodles::sam::Header;
use noodles::sam::alignment::record_buf::RecordBuf;

use crate::bundle::{BundleMetadata, ReaderBundle};
use crate::chunk::{Chunk, normalize};
use crate::codec::{ReadOutcome, ReaderHandle};
use crate::errors::{DataSourceError, Result};
use crate::filter::ReadFilter;
use crate::header_merger::MergedHeader;
use crate::shard::{ChunkedShard, Shard, WholeFileShard};
use crate::source::SourceFileId;

/// A record drawn from one source file.
#[derive(Debug, Clone)]
pub struct SourcedRecord {
    /// The record, rewritten to refer to the merged header.
    pub record: RecordBuf,
    /// File the record was read from.
    pub source: SourceFileId,
    /// Registration index of `source`.
    pub file_index: usize,
    /// Virtual position just past the record in `source`.
    pub end_position: VirtualPosition,
}

impl SourcedRecord {
    /// Merge key of the record.
    #[must_use]
    pub fn key(&self) -> CoordinateKey {
        CoordinateKey::of(&self.record)
    }
}

/// Sort key for coordinate order.
///
/// Records without a reference sort after every placed record. Records with a reference but
/// no start sort first within that reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoordinateKey {
    /// Reference index, or `usize::MAX` when unplaced.
    pub reference: usize,
    /// 1-based alignment start, or 0 when absent.
    pub start: usize,
}

impl CoordinateKey {
    /// Key of `record`.
    #[must_use]
    pub fn of(record: &RecordBuf) -> Self {
        Self {
            reference: record.reference_sequence_id().unwrap_or(usize::MAX),
            start: record.alignment_start().map_or(0, usize::from),
        }
    }

    /// True if the key has no reference.
    #[must_use]
    pub fn is_unplaced(&self) -> bool {
        self.reference == usize::MAX
    }

    /// Human-readable `name:start` using the reference names of `header`.
    #[must_use]
    pub fn describe(&self, header: &Header) -> String {
        if self.is_unplaced() {
            return "*".to_string();
        }
        match header.reference_sequences().get_index(self.reference) {
            Some((name, _)) => format!("{name}:{}", self.start),
            None => format!("#{}:{}", self.reference, self.start),
        }
    }
}

impl fmt::Display for CoordinateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unplaced() { f.write_str("*") } else { write!(f, "{}:{}", self.reference, self.start) }
    }
}

/// Records of one file whose start positions lie within a set of chunks.
pub struct FileSequence {
    file_index: usize,
    source: SourceFileId,
    pending: VecDeque<Chunk>,
    current: Option<Chunk>,
    filter: Option<Arc<dyn ReadFilter>>,
}

impl FileSequence {
    /// A sequence over `chunks` of the file, after normalization.
    #[must_use]
    pub fn chunked(
        file_index: usize,
        source: SourceFileId,
        chunks: &[Chunk],
        filter: Option<Arc<dyn ReadFilter>>,
    ) -> Self {
        Self { file_index, source, pending: normalize(chunks).into(), current: None, filter }
    }

    /// A sequence over every record of the file, starting at `data_start`.
    #[must_use]
    pub fn whole_file(
        file_index: usize,
        source: SourceFileId,
        data_start: VirtualPosition,
        filter: Option<Arc<dyn ReadFilter>>,
    ) -> Self {
        Self::chunked(file_index, source, &[Chunk::open_ended(data_start)], filter)
    }

    /// Registration index of the file.
    #[must_use]
    pub fn file_index(&self) -> usize {
        self.file_index
    }

    /// True if no chunks remain to be scanned.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.current.is_none() && self.pending.is_empty()
    }

    /// Reads the next record that starts inside a remaining chunk and passes the filter.
    ///
    /// # Errors
    ///
    /// Returns [`DataSourceError::Codec`] if seeking or decoding fails.
    pub fn next(&mut self, handle: &mut dyn ReaderHandle) -> Result<Option<SourcedRecord>> {
        loop {
            let chunk = match self.current {
                Some(chunk) => chunk,
                None => {
                    let Some(chunk) = self.pending.pop_front() else {
                        return Ok(None);
                    };
                    handle.seek(chunk.start()).map_err(|e| DataSourceError::codec(&self.source, e))?;
                    self.current = Some(chunk);
                    chunk
                }
            };

            if handle.virtual_position() >= chunk.end() {
                self.current = None;
                continue;
            }

            let record =
                match handle.read_record().map_err(|e| DataSourceError::codec(&self.source, e))? {
                    ReadOutcome::Record(record) => record,
                    // The chunk end is rechecked before the next read.
                    ReadOutcome::Skipped => continue,
                    ReadOutcome::EndOfStream => {
                        // Later chunks start past it too.
                        self.current = None;
                        self.pending.clear();
                        return Ok(None);
                    }
                };

            if self.filter.as_ref().is_some_and(|f| f.filter_out(&record)) {
                continue;
            }

            return Ok(Some(SourcedRecord {
                record,
                source: self.source.clone(),
                file_index: self.file_index,
                end_position: handle.virtual_position(),
            }));
        }
    }
}

impl fmt::Debug for FileSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSequence")
            .field("source", &self.source)
            .field("current", &self.current)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

/// Entry in the merge heap.
struct HeapEntry {
    key: CoordinateKey,
    file_index: usize,
    sequence: usize,
    record: SourcedRecord,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key).then_with(|| self.file_index.cmp(&other.file_index))
    }
}

/// K-way merge of the per-file sequences selected by a shard.
pub struct MergingIterator {
    sequences: Vec<FileSequence>,
    heap: BinaryHeap<Reverse<HeapEntry>>,
    header: Arc<MergedHeader>,
    primed: bool,
}

impl MergingIterator {
    /// Builds the per-file sequences `shard` selects from the files of `metadata`.
    ///
    /// # Errors
    ///
    /// Returns [`DataSourceError::UnknownFileId`] if the shard names a file that is not part
    /// of the bundle.
    pub fn new(shard: &Shard, metadata: &BundleMetadata, header: Arc<MergedHeader>) -> Result<Self> {
        match shard {
            Shard::Chunked(chunked) => Self::over_chunks(chunked, metadata, header),
            Shard::WholeFile(whole) => Self::over_files(whole, metadata, header),
        }
    }

    /// Merges every file with a non-empty chunk list in `shard`; other files are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`DataSourceError::UnknownFileId`] if the shard names a file that is not part
    /// of the bundle.
    pub fn over_chunks(
        shard: &ChunkedShard,
        metadata: &BundleMetadata,
        header: Arc<MergedHeader>,
    ) -> Result<Self> {
        let mut sequences = Vec::with_capacity(shard.chunks().len());
        for (file, chunks) in shard.chunks() {
            let file_index = metadata.file_index(file)?;
            let sequence =
                FileSequence::chunked(file_index, file.clone(), chunks, shard.filter().cloned());
            if !sequence.is_exhausted() {
                sequences.push(sequence);
            }
        }
        Ok(Self::from_sequences(sequences, header))
    }

    /// Merges every record of every file.
    ///
    /// # Errors
    ///
    /// Returns [`DataSourceError::UnknownFileId`] if `metadata` lacks the data start of one
    /// of its files.
    pub fn over_files(
        shard: &WholeFileShard,
        metadata: &BundleMetadata,
        header: Arc<MergedHeader>,
    ) -> Result<Self> {
        let mut sequences = Vec::with_capacity(metadata.files().len());
        for (file_index, file) in metadata.files().iter().enumerate() {
            let data_start = metadata
                .data_start(file_index)
                .ok_or_else(|| DataSourceError::UnknownFileId { id: file.to_string() })?;
            sequences.push(FileSequence::whole_file(
                file_index,
                file.clone(),
                data_start,
                shard.filter().cloned(),
            ));
        }
        Ok(Self::from_sequences(sequences, header))
    }

    fn from_sequences(mut sequences: Vec<FileSequence>, header: Arc<MergedHeader>) -> Self {
        sequences.sort_by_key(FileSequence::file_index);
        let heap = BinaryHeap::with_capacity(sequences.len());
        Self { sequences, heap, header, primed: false }
    }

    /// Number of per-file sequences being merged.
    #[must_use]
    pub fn active_files(&self) -> usize {
        self.sequences.len()
    }

    /// Pops the next record in coordinate order, refilling from the file it came from.
    ///
    /// # Errors
    ///
    /// Returns [`DataSourceError::Codec`] if a file cannot be read, or
    /// [`DataSourceError::UnknownFileId`] if `bundle` lacks a file being merged.
    pub fn next(&mut self, bundle: &mut ReaderBundle) -> Result<Option<SourcedRecord>> {
        if !self.primed {
            self.primed = true;
            for sequence in 0..self.sequences.len() {
                self.advance(sequence, bundle)?;
            }
        }

        let Some(Reverse(entry)) = self.heap.pop() else {
            return Ok(None);
        };
        self.advance(entry.sequence, bundle)?;
        Ok(Some(entry.record))
    }

    /// Pulls the next record of `sequence` onto the heap.
    fn advance(&mut self, sequence: usize, bundle: &mut ReaderBundle) -> Result<()> {
        let file_sequence = &mut self.sequences[sequence];
        let file_index = file_sequence.file_index();
        let handle = bundle.handle_mut(file_index).ok_or_else(|| {
            DataSourceError::UnknownFileId { id: file_sequence.source.to_string() }
        })?;

        if let Some(mut record) = file_sequence.next(handle)? {
            self.header.rewrite(file_index, &mut record.record);
            let key = record.key();
            self.heap.push(Reverse(HeapEntry { key, file_index, sequence, record }));
        }
        Ok(())
    }
}

impl fmt::Debug for MergingIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergingIterator")
            .field("sequences", &self.sequences)
            .field("queued", &self.heap.len())
            .finish_non_exhaustive()
    }
}
