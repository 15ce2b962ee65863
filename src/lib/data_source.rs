//! The merged, sharded view over a set of coordinate-sorted alignment files.
//!
//! An [`AlignmentDataSource`] owns a [`ReaderLeasePool`] over its files plus everything
//! derived once at construction: the merged header with its per-file id remappings, and the
//! per-file position table. Every traversal leases its own bundle, so independent traversals
//! may run concurrently on different threads up to the pool capacity.
//!
//! Shards are consumed in one of two ways:
//!
//! - [`AlignmentDataSource::seek`] returns a [`LeaseScopedSequence`] that streams merged
//!   records on demand (pull shards and whole-file shards)
//! - [`AlignmentDataSource::fill_shard`] draws records into a buffering shard until its buffer
//!   is full or the shard's chunks are exhausted, advancing the position table as it goes;
//!   seeking the filled shard then replays its buffer
//!
//! ```no_run
//! use bamshard::config::ReadsConfig;
//! use bamshard::data_source::AlignmentDataSource;
//! use bamshard::shard::{Shard, WholeFileShard};
//!
//! # fn main() -> bamshard::errors::Result<()> {
//! let config = ReadsConfig::new(vec!["a.bam".into(), "b.bam".into()]);
//! let source = AlignmentDataSource::open_bam(config)?;
//!
//! let mut sequence = source.seek(&Shard::from(WholeFileShard::new()))?;
//! while let Some(record) = sequence.next_record()? {
//!     println!("{}: {:?}", record.source, record.record.alignment_start());
//! }
//! sequence.close()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Instant;

use log::debug;
use noodles::bam::bai;
use noodles::sam::Header;

use crate::bundle::BundleMetadata;
use crate::chunk::Chunk;
use crate::codec::AlignmentCodec;
use crate::codec::bam::BamCodec;
use crate::config::ReadsConfig;
use crate::errors::{DataSourceError, Result};
use crate::header_merger::MergedHeader;
use crate::logging::{log_header_summary, log_traversal_summary};
use crate::merge::MergingIterator;
use crate::pool::ReaderLeasePool;
use crate::positions::{PositionMap, PositionTracker};
use crate::shard::Shard;
use crate::source::SourceFileId;
use crate::traversal::{LeaseScopedSequence, TraversalChain};

/// Merged access to a fixed set of alignment files.
#[derive(Debug)]
pub struct AlignmentDataSource {
    config: ReadsConfig,
    pool: ReaderLeasePool,
    metadata: Arc<BundleMetadata>,
    merged: Arc<MergedHeader>,
    positions: PositionTracker,
}

impl AlignmentDataSource {
    /// Opens the configured files with `codec` and merges their headers.
    ///
    /// One bundle is opened immediately; its headers and indexes are the reference every later
    /// bundle is checked against.
    ///
    /// # Errors
    ///
    /// Returns [`DataSourceError::InvalidParameter`] for an invalid configuration,
    /// [`DataSourceError::HeaderConflict`] if the headers cannot be merged, or any error
    /// raised while opening the files.
    pub fn new(config: ReadsConfig, codec: Arc<dyn AlignmentCodec>) -> Result<Self> {
        config.validate()?;

        let pool = ReaderLeasePool::new(
            config.files().to_vec(),
            config.pool_capacity(),
            codec,
            config.validation_stringency(),
        );
        let metadata = pool.peek()?;
        let merged = MergedHeader::merge(metadata.files(), metadata.headers())?;
        log_header_summary(&merged);

        let mut initial = PositionMap::new();
        for (i, file) in metadata.files().iter().enumerate() {
            if let Some(start) = metadata.data_start(i) {
                initial.insert(file.clone(), Chunk::open_ended(start));
            }
        }

        Ok(Self {
            config,
            pool,
            metadata,
            merged: Arc::new(merged),
            positions: PositionTracker::new(initial),
        })
    }

    /// Opens BAM files (with sibling BAI indexes where present).
    ///
    /// # Errors
    ///
    /// Same as [`Self::new`].
    pub fn open_bam(config: ReadsConfig) -> Result<Self> {
        Self::new(config, Arc::new(BamCodec::new()))
    }

    /// The configuration the data source was built from.
    #[must_use]
    pub fn config(&self) -> &ReadsConfig {
        &self.config
    }

    /// The bundle pool backing every traversal.
    #[must_use]
    pub fn pool(&self) -> &ReaderLeasePool {
        &self.pool
    }

    /// Files in registration order.
    #[must_use]
    pub fn file_ids(&self) -> &[SourceFileId] {
        self.metadata.files()
    }

    /// True iff every file has an index.
    #[must_use]
    pub fn has_index(&self) -> bool {
        self.metadata.has_index()
    }

    /// Index of `file`, if it has one.
    ///
    /// # Errors
    ///
    /// Returns [`DataSourceError::UnknownFileId`] if `file` is not part of the data source.
    pub fn index(&self, file: &SourceFileId) -> Result<Option<&bai::Index>> {
        let i = self.metadata.file_index(file)?;
        Ok(self.metadata.index(i).map(AsRef::as_ref))
    }

    /// The merged header.
    #[must_use]
    pub fn header(&self) -> &Header {
        self.merged.header()
    }

    /// The merged header together with its per-file remappings.
    #[must_use]
    pub fn merged_header(&self) -> &Arc<MergedHeader> {
        &self.merged
    }

    /// Header of `file`, including any synthesized read group.
    ///
    /// # Errors
    ///
    /// Returns [`DataSourceError::UnknownFileId`] if `file` is not part of the data source.
    pub fn file_header(&self, file: &SourceFileId) -> Result<&Header> {
        let i = self.metadata.file_index(file)?;
        self.metadata
            .header(i)
            .ok_or_else(|| DataSourceError::UnknownFileId { id: file.to_string() })
    }

    /// True if two files declare the same read group id.
    #[must_use]
    pub fn has_read_group_collisions(&self) -> bool {
        self.merged.has_read_group_collisions()
    }

    /// Merged id of read group `original` of `file`, or `None` if `file` never declared it.
    ///
    /// # Errors
    ///
    /// Returns [`DataSourceError::UnknownFileId`] if `file` is not part of the data source.
    pub fn merged_read_group_id(&self, file: &SourceFileId, original: &str) -> Result<Option<&str>> {
        let i = self.metadata.file_index(file)?;
        Ok(self.merged.merged_read_group_id(i, original))
    }

    /// Snapshot of the furthest position consumed from each file by buffering fills.
    #[must_use]
    pub fn current_positions(&self) -> PositionMap {
        self.positions.snapshot()
    }

    /// Draws records into a buffering shard until its buffer is full or its chunks run out.
    ///
    /// Each drawn record advances its file's position. Returns the number of records added.
    ///
    /// # Errors
    ///
    /// Returns [`DataSourceError::UnsupportedShardType`] unless `shard` is a buffering chunked
    /// shard, [`DataSourceError::PoolExhausted`] if no bundle is free, or any merge failure.
    /// The leased bundle is returned to the pool in every case.
    pub fn fill_shard(&self, shard: &mut Shard) -> Result<usize> {
        let kind = shard.kind_name();
        let traversal = shard.traversal_kind();
        let chunked = match shard {
            Shard::Chunked(chunked) if chunked.is_buffering() => chunked,
            _ => {
                return Err(DataSourceError::UnsupportedShardType {
                    shard: kind,
                    operation: "fill",
                    reason: "only buffering shards are filled; stream other shards with seek"
                        .to_string(),
                });
            }
        };

        let started = Instant::now();
        let mut lease = self.pool.lease()?;
        let merge = MergingIterator::over_chunks(chunked, lease.metadata(), self.merged.clone())?;
        let mut chain = TraversalChain::decorate(merge, traversal, self.merged.clone(), &self.config);

        let mut added = 0;
        while !chunked.is_buffer_full() {
            let Some(record) = chain.next(&mut lease)? else {
                break;
            };
            self.positions.advance(&record);
            if let Some(buffer) = chunked.buffer_mut() {
                buffer.push(record);
            }
            added += 1;
        }

        debug!("Filled {added} record(s) into a buffering shard");
        log_traversal_summary(chain.stats(), started.elapsed());
        lease.release()?;
        Ok(added)
    }

    /// Starts a traversal over `shard`.
    ///
    /// Pull and whole-file shards are merged from a leased bundle that the returned sequence
    /// holds until it is closed or dropped. A buffering shard is replayed from the records
    /// [`Self::fill_shard`] put into it, without leasing a bundle.
    ///
    /// # Errors
    ///
    /// Returns [`DataSourceError::PoolExhausted`] if no bundle is free, or
    /// [`DataSourceError::UnknownFileId`] if the shard names a file outside the data source.
    /// The bundle is returned to the pool if the traversal cannot be built.
    pub fn seek(&self, shard: &Shard) -> Result<LeaseScopedSequence> {
        if let Shard::Chunked(chunked) = shard {
            if chunked.is_buffering() {
                debug!("Replaying {} buffered record(s)", chunked.buffered_len());
                return Ok(LeaseScopedSequence::buffered(chunked.buffered().cloned().collect()));
            }
        }

        let lease = self.pool.lease()?;
        let chain = TraversalChain::build(shard, &lease, self.merged.clone(), &self.config)?;
        Ok(LeaseScopedSequence::new(lease, chain))
    }
}
