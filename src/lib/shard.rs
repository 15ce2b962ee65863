//! Shards: externally computed units of work over the source files.
//!
//! A shard says which parts of which files a traversal covers. The scheduler that builds
//! shards (typically from index queries against genomic intervals) owns them; the data source
//! only applies them.
//!
//! Shards are a tagged union so the merge engine dispatches on the variant instead of
//! inspecting concrete types:
//!
//! - [`Shard::Chunked`] selects, per file, a list of virtual-offset [`Chunk`]s. Files without
//!   an entry are excluded. A chunked shard either streams on demand (pull mode) or owns a
//!   bounded buffer the data source fills ahead of time (buffering mode).
//! - [`Shard::WholeFile`] scans every record of every file, for shard producers that cannot
//!   express their work as chunks.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use crate::chunk::Chunk;
use crate::filter::ReadFilter;
use crate::merge::SourcedRecord;
use crate::source::SourceFileId;

/// What a traversal over a shard feeds.
///
/// Read traversals need strictly coordinate-ordered input and are order-verified; locus
/// traversals are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalKind {
    /// Read-by-read traversal.
    #[default]
    Reads,
    /// Locus-by-locus traversal.
    Loci,
}

/// Records drawn ahead of time into a buffering shard.
#[derive(Debug, Clone)]
pub struct ReadBuffer {
    capacity: usize,
    records: VecDeque<SourcedRecord>,
}

impl ReadBuffer {
    fn new(capacity: usize) -> Self {
        Self { capacity, records: VecDeque::with_capacity(capacity.min(4096)) }
    }

    /// Maximum number of buffered records.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of buffered records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True if no more records fit.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    pub(crate) fn push(&mut self, record: SourcedRecord) {
        self.records.push_back(record);
    }
}

/// A shard selecting virtual-offset chunks per file.
#[derive(Clone)]
pub struct ChunkedShard {
    chunks: BTreeMap<SourceFileId, Vec<Chunk>>,
    filter: Option<Arc<dyn ReadFilter>>,
    traversal: TraversalKind,
    buffer: Option<ReadBuffer>,
}

impl ChunkedShard {
    /// Creates an empty pull-mode shard: records stream from the files on demand.
    #[must_use]
    pub fn pull() -> Self {
        Self { chunks: BTreeMap::new(), filter: None, traversal: TraversalKind::Reads, buffer: None }
    }

    /// Creates an empty buffering shard holding at most `capacity` records.
    #[must_use]
    pub fn buffering(capacity: usize) -> Self {
        Self { buffer: Some(ReadBuffer::new(capacity)), ..Self::pull() }
    }

    /// Adds `chunks` of `file` to the shard.
    #[must_use]
    pub fn with_chunks(mut self, file: impl Into<SourceFileId>, chunks: Vec<Chunk>) -> Self {
        self.chunks.entry(file.into()).or_default().extend(chunks);
        self
    }

    /// Drops records matching `filter` from each file before merging.
    #[must_use]
    pub fn with_filter(mut self, filter: impl ReadFilter + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Sets the traversal kind (default [`TraversalKind::Reads`]).
    #[must_use]
    pub fn with_traversal_kind(mut self, traversal: TraversalKind) -> Self {
        self.traversal = traversal;
        self
    }

    /// Chunks selected per file.
    #[must_use]
    pub fn chunks(&self) -> &BTreeMap<SourceFileId, Vec<Chunk>> {
        &self.chunks
    }

    /// The shard's record filter.
    #[must_use]
    pub fn filter(&self) -> Option<&Arc<dyn ReadFilter>> {
        self.filter.as_ref()
    }

    /// The traversal kind.
    #[must_use]
    pub fn traversal_kind(&self) -> TraversalKind {
        self.traversal
    }

    /// True if the shard buffers records.
    #[must_use]
    pub fn is_buffering(&self) -> bool {
        self.buffer.is_some()
    }

    /// True if the shard buffers records and its buffer is full.
    #[must_use]
    pub fn is_buffer_full(&self) -> bool {
        self.buffer.as_ref().is_some_and(ReadBuffer::is_full)
    }

    /// Number of buffered records (0 for pull shards).
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.as_ref().map_or(0, ReadBuffer::len)
    }

    /// Buffered records in merge order, left in place.
    pub fn buffered(&self) -> impl Iterator<Item = &SourcedRecord> {
        self.buffer.iter().flat_map(|b| b.records.iter())
    }

    /// Takes every buffered record, in merge order.
    pub fn drain_buffer(&mut self) -> Vec<SourcedRecord> {
        self.buffer.as_mut().map_or_else(Vec::new, |b| b.records.drain(..).collect())
    }

    pub(crate) fn buffer_mut(&mut self) -> Option<&mut ReadBuffer> {
        self.buffer.as_mut()
    }
}

impl fmt::Debug for ChunkedShard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkedShard")
            .field("chunks", &self.chunks)
            .field("has_filter", &self.filter.is_some())
            .field("traversal", &self.traversal)
            .field("buffering", &self.is_buffering())
            .finish()
    }
}

/// A shard covering every record of every file.
#[derive(Clone, Default)]
pub struct WholeFileShard {
    filter: Option<Arc<dyn ReadFilter>>,
    traversal: TraversalKind,
}

impl WholeFileShard {
    /// Creates a whole-file shard for read traversal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops records matching `filter` from each file before merging.
    #[must_use]
    pub fn with_filter(mut self, filter: impl ReadFilter + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Sets the traversal kind (default [`TraversalKind::Reads`]).
    #[must_use]
    pub fn with_traversal_kind(mut self, traversal: TraversalKind) -> Self {
        self.traversal = traversal;
        self
    }

    /// The shard's record filter.
    #[must_use]
    pub fn filter(&self) -> Option<&Arc<dyn ReadFilter>> {
        self.filter.as_ref()
    }
}

impl fmt::Debug for WholeFileShard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WholeFileShard")
            .field("has_filter", &self.filter.is_some())
            .field("traversal", &self.traversal)
            .finish()
    }
}

/// A unit of work handed to the data source.
#[derive(Debug, Clone)]
pub enum Shard {
    /// Chunk-restricted scan.
    Chunked(ChunkedShard),
    /// Scan of every record in every file.
    WholeFile(WholeFileShard),
}

impl Shard {
    /// Short description of the variant and mode, for messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Chunked(shard) if shard.is_buffering() => "buffering",
            Self::Chunked(_) => "pull",
            Self::WholeFile(_) => "whole-file",
        }
    }

    /// The traversal kind.
    #[must_use]
    pub fn traversal_kind(&self) -> TraversalKind {
        match self {
            Self::Chunked(shard) => shard.traversal,
            Self::WholeFile(shard) => shard.traversal,
        }
    }

    /// The shard's record filter.
    #[must_use]
    pub fn filter(&self) -> Option<&Arc<dyn ReadFilter>> {
        match self {
            Self::Chunked(shard) => shard.filter.as_ref(),
            Self::WholeFile(shard) => shard.filter.as_ref(),
        }
    }
}

impl From<ChunkedShard> for Shard {
    fn from(shard: ChunkedShard) -> Self {
        Self::Chunked(shard)
    }
}

impl From<WholeFileShard> for Shard {
    fn from(shard: WholeFileShard) -> Self {
        Self::WholeFile(shard)
    }
}
