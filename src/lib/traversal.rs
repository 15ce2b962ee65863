//! Decorated traversals and the lease-scoped sequences that carry them.
//!
//! A traversal pulls merged records through a fixed chain of decorators:
//!
//! 1. [`OrderVerifier`] fails the traversal if coordinates go backwards (read traversals
//!    only, unless suppressed)
//! 2. [`Downsampler`] keeps each record with a configured probability
//! 3. supplemental [`ReadFilter`]s drop records last
//!
//! A [`LeaseScopedSequence`] owns the bundle lease its traversal reads from. Closing the
//! sequence, explicitly or by dropping it, returns the bundle to the pool.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use log::debug;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::bundle::ReaderBundle;
use crate::config::ReadsConfig;
use crate::errors::{DataSourceError, Result};
use crate::filter::ReadFilter;
use crate::header_merger::MergedHeader;
use crate::logging::log_traversal_summary;
use crate::merge::{CoordinateKey, MergingIterator, SourcedRecord};
use crate::pool::BundleLease;
use crate::shard::{Shard, TraversalKind};

/// Record counts of one traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraversalStats {
    /// Records produced by the merge.
    pub merged: u64,
    /// Records discarded by downsampling.
    pub downsampled: u64,
    /// Records discarded by supplemental filters.
    pub filtered: u64,
    /// Records handed to the consumer.
    pub emitted: u64,
}

/// Fails when a record sorts before the record preceding it.
#[derive(Debug)]
pub struct OrderVerifier {
    header: Arc<MergedHeader>,
    previous: Option<CoordinateKey>,
}

impl OrderVerifier {
    #[must_use]
    pub fn new(header: Arc<MergedHeader>) -> Self {
        Self { header, previous: None }
    }

    /// Checks `record` against the previously checked record.
    ///
    /// # Errors
    ///
    /// Returns [`DataSourceError::OrderViolation`] if `record` sorts before its predecessor.
    pub fn check(&mut self, record: &SourcedRecord) -> Result<()> {
        let current = record.key();
        if let Some(previous) = self.previous {
            if current < previous {
                let header = self.header.header();
                return Err(DataSourceError::OrderViolation {
                    read_name: record
                        .record
                        .name()
                        .map_or_else(|| "*".to_string(), |name| name.to_string()),
                    previous: previous.describe(header),
                    current: current.describe(header),
                });
            }
        }
        self.previous = Some(current);
        Ok(())
    }
}

/// Keeps each record independently with a fixed probability.
pub struct Downsampler {
    fraction: f64,
    rng: StdRng,
}

impl Downsampler {
    /// A downsampler keeping `fraction` of records, seeded from `seed` when given.
    #[must_use]
    pub fn new(fraction: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => rand::make_rng(),
        };
        Self { fraction, rng }
    }

    /// Decides whether the next record is kept.
    pub fn keep(&mut self) -> bool {
        if self.fraction >= 1.0 {
            true
        } else if self.fraction <= 0.0 {
            false
        } else {
            rand::RngExt::random::<f64>(&mut self.rng) < self.fraction
        }
    }
}

impl fmt::Debug for Downsampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Downsampler").field("fraction", &self.fraction).finish_non_exhaustive()
    }
}

/// The merge plus its decorators.
pub struct TraversalChain {
    merge: MergingIterator,
    verifier: Option<OrderVerifier>,
    downsampler: Option<Downsampler>,
    filters: Vec<Arc<dyn ReadFilter>>,
    stats: TraversalStats,
}

impl TraversalChain {
    /// Builds the chain for `shard` over the files of `bundle`.
    ///
    /// # Errors
    ///
    /// Returns [`DataSourceError::UnknownFileId`] if the shard names a file outside the
    /// bundle.
    pub fn build(
        shard: &Shard,
        bundle: &ReaderBundle,
        header: Arc<MergedHeader>,
        config: &ReadsConfig,
    ) -> Result<Self> {
        let merge = MergingIterator::new(shard, bundle.metadata(), header.clone())?;
        Ok(Self::decorate(merge, shard.traversal_kind(), header, config))
    }

    /// Wraps `merge` in the decorators `config` asks for.
    #[must_use]
    pub fn decorate(
        merge: MergingIterator,
        traversal: TraversalKind,
        header: Arc<MergedHeader>,
        config: &ReadsConfig,
    ) -> Self {
        let verify =
            traversal == TraversalKind::Reads && !config.is_read_order_verification_suppressed();
        let verifier = verify.then(|| OrderVerifier::new(header));
        let downsampler = config
            .downsampling_fraction()
            .filter(|&fraction| fraction < 1.0)
            .map(|fraction| Downsampler::new(fraction, config.random_seed()));

        Self {
            merge,
            verifier,
            downsampler,
            filters: config.supplemental_filters().to_vec(),
            stats: TraversalStats::default(),
        }
    }

    /// Pulls the next record that survives every decorator.
    ///
    /// # Errors
    ///
    /// Returns the first merge or order verification error.
    pub fn next(&mut self, bundle: &mut ReaderBundle) -> Result<Option<SourcedRecord>> {
        while let Some(record) = self.merge.next(bundle)? {
            self.stats.merged += 1;
            if let Some(verifier) = self.verifier.as_mut() {
                verifier.check(&record)?;
            }
            if let Some(downsampler) = self.downsampler.as_mut() {
                if !downsampler.keep() {
                    self.stats.downsampled += 1;
                    continue;
                }
            }
            if self.filters.iter().any(|f| f.filter_out(&record.record)) {
                self.stats.filtered += 1;
                continue;
            }
            self.stats.emitted += 1;
            return Ok(Some(record));
        }
        Ok(None)
    }

    /// Counts so far.
    #[must_use]
    pub fn stats(&self) -> &TraversalStats {
        &self.stats
    }
}

impl fmt::Debug for TraversalChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraversalChain")
            .field("merge", &self.merge)
            .field("verified", &self.verifier.is_some())
            .field("downsampler", &self.downsampler)
            .field("filters", &self.filters.len())
            .field("stats", &self.stats)
            .finish()
    }
}

/// A forward-only merged sequence holding the bundle it reads from.
///
/// The bundle returns to its pool when the sequence is closed or dropped, whether or not the
/// sequence was exhausted. After an error the sequence yields nothing further.
///
/// A sequence over a buffering shard replays the records already filled into the shard and
/// holds no bundle.
pub struct LeaseScopedSequence {
    lease: Option<BundleLease>,
    records: SequenceRecords,
    peeked: Option<SourcedRecord>,
    failed: bool,
    opened: Instant,
}

/// Where a sequence draws its records from.
enum SequenceRecords {
    Merged(TraversalChain),
    Buffered { records: std::vec::IntoIter<SourcedRecord>, stats: TraversalStats },
}

impl SequenceRecords {
    fn stats(&self) -> &TraversalStats {
        match self {
            Self::Merged(chain) => chain.stats(),
            Self::Buffered { stats, .. } => stats,
        }
    }
}

impl LeaseScopedSequence {
    pub(crate) fn new(lease: BundleLease, chain: TraversalChain) -> Self {
        Self {
            lease: Some(lease),
            records: SequenceRecords::Merged(chain),
            peeked: None,
            failed: false,
            opened: Instant::now(),
        }
    }

    pub(crate) fn buffered(records: Vec<SourcedRecord>) -> Self {
        Self {
            lease: None,
            records: SequenceRecords::Buffered {
                records: records.into_iter(),
                stats: TraversalStats::default(),
            },
            peeked: None,
            failed: false,
            opened: Instant::now(),
        }
    }

    /// True if another record is available.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the traversal, if looking ahead fails.
    pub fn has_next(&mut self) -> Result<bool> {
        if self.peeked.is_none() {
            self.peeked = self.pull()?;
        }
        Ok(self.peeked.is_some())
    }

    /// Returns the next record, or `None` when the traversal is exhausted.
    ///
    /// # Errors
    ///
    /// Returns merge, codec, or order verification failures. The sequence is finished
    /// afterwards.
    pub fn next_record(&mut self) -> Result<Option<SourcedRecord>> {
        match self.peeked.take() {
            Some(record) => Ok(Some(record)),
            None => self.pull(),
        }
    }

    /// Counts so far.
    #[must_use]
    pub fn stats(&self) -> &TraversalStats {
        self.records.stats()
    }

    /// True while the sequence holds a leased bundle.
    #[must_use]
    pub fn is_leased(&self) -> bool {
        self.lease.is_some()
    }

    /// Releases the bundle back to its pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool refuses the bundle.
    pub fn close(mut self) -> Result<()> {
        self.peeked = None;
        match self.lease.take() {
            Some(lease) => {
                log_traversal_summary(self.records.stats(), self.opened.elapsed());
                lease.release()
            }
            None => Ok(()),
        }
    }

    fn pull(&mut self) -> Result<Option<SourcedRecord>> {
        if self.failed {
            return Ok(None);
        }
        match &mut self.records {
            SequenceRecords::Merged(chain) => {
                let Some(lease) = self.lease.as_mut() else {
                    return Ok(None);
                };
                let result = chain.next(lease);
                if result.is_err() {
                    self.failed = true;
                }
                result
            }
            SequenceRecords::Buffered { records, stats } => {
                let record = records.next();
                if record.is_some() {
                    stats.merged += 1;
                    stats.emitted += 1;
                }
                Ok(record)
            }
        }
    }
}

impl Iterator for LeaseScopedSequence {
    type Item = Result<SourcedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

impl Drop for LeaseScopedSequence {
    fn drop(&mut self) {
        if let Some(lease) = self.lease.take() {
            debug!("Traversal dropped without close; returning its bundle");
            log_traversal_summary(self.records.stats(), self.opened.elapsed());
            drop(lease);
        }
    }
}

impl fmt::Debug for LeaseScopedSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaseScopedSequence")
            .field("leased", &self.lease.is_some())
            .field("stats", self.records.stats())
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}
