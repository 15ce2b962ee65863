//! Data source configuration.
//!
//! A [`ReadsConfig`] is assembled with chained setters and then handed to
//! [`crate::data_source::AlignmentDataSource::new`], which validates it. It is fixed for the
//! lifetime of the data source.
//!
//! ```
//! use bamshard::codec::ValidationStringency;
//! use bamshard::config::ReadsConfig;
//! use bamshard::filter::DuplicateReadFilter;
//!
//! let config = ReadsConfig::new(vec!["a.bam".into(), "b.bam".into()])
//!     .with_pool_capacity(8)
//!     .with_validation_stringency(ValidationStringency::Lenient)
//!     .with_downsampling_fraction(0.5)
//!     .with_random_seed(42)
//!     .add_supplemental_filter(DuplicateReadFilter);
//! assert!(config.validate().is_ok());
//! ```

use std::fmt;
use std::sync::Arc;

use crate::codec::ValidationStringency;
use crate::errors::Result;
use crate::filter::ReadFilter;
use crate::source::SourceFileId;
use crate::validation::{validate_fraction, validate_positive, validate_source_files};

/// Number of reader bundles a pool may hold unless configured otherwise.
pub const DEFAULT_POOL_CAPACITY: usize = 4;

/// Configuration of an [`crate::data_source::AlignmentDataSource`].
#[derive(Clone)]
pub struct ReadsConfig {
    files: Vec<SourceFileId>,
    pool_capacity: usize,
    stringency: ValidationStringency,
    downsampling_fraction: Option<f64>,
    random_seed: Option<u64>,
    suppress_order_verification: bool,
    supplemental_filters: Vec<Arc<dyn ReadFilter>>,
}

impl ReadsConfig {
    /// Configuration over `files` with default settings.
    #[must_use]
    pub fn new(files: Vec<SourceFileId>) -> Self {
        Self {
            files,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            stringency: ValidationStringency::default(),
            downsampling_fraction: None,
            random_seed: None,
            suppress_order_verification: false,
            supplemental_filters: Vec::new(),
        }
    }

    /// Maximum number of concurrently leased reader bundles.
    #[must_use]
    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }

    /// How strictly input files are validated.
    #[must_use]
    pub fn with_validation_stringency(mut self, stringency: ValidationStringency) -> Self {
        self.stringency = stringency;
        self
    }

    /// Keeps each record with probability `fraction`.
    #[must_use]
    pub fn with_downsampling_fraction(mut self, fraction: f64) -> Self {
        self.downsampling_fraction = Some(fraction);
        self
    }

    /// Seeds downsampling so every traversal of a shard keeps the same records.
    #[must_use]
    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    /// Disables coordinate-order verification of read traversals.
    #[must_use]
    pub fn with_read_order_verification_suppressed(mut self, suppress: bool) -> Self {
        self.suppress_order_verification = suppress;
        self
    }

    /// Appends a filter applied after verification and downsampling.
    #[must_use]
    pub fn add_supplemental_filter(mut self, filter: impl ReadFilter + 'static) -> Self {
        self.supplemental_filters.push(Arc::new(filter));
        self
    }

    /// Source files in registration order.
    #[must_use]
    pub fn files(&self) -> &[SourceFileId] {
        &self.files
    }

    /// Maximum number of concurrently leased reader bundles.
    #[must_use]
    pub fn pool_capacity(&self) -> usize {
        self.pool_capacity
    }

    /// How strictly input files are validated.
    #[must_use]
    pub fn validation_stringency(&self) -> ValidationStringency {
        self.stringency
    }

    /// Probability of keeping each record, if downsampling.
    #[must_use]
    pub fn downsampling_fraction(&self) -> Option<f64> {
        self.downsampling_fraction
    }

    /// Seed for downsampling, if fixed.
    #[must_use]
    pub fn random_seed(&self) -> Option<u64> {
        self.random_seed
    }

    /// True if read traversals skip coordinate-order verification.
    #[must_use]
    pub fn is_read_order_verification_suppressed(&self) -> bool {
        self.suppress_order_verification
    }

    /// Filters applied after verification and downsampling.
    #[must_use]
    pub fn supplemental_filters(&self) -> &[Arc<dyn ReadFilter>] {
        &self.supplemental_filters
    }

    /// Checks the configuration before a data source is built from it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::errors::DataSourceError::InvalidParameter`] if there are no files, a
    /// file is listed twice, the pool capacity is zero, or the downsampling fraction lies
    /// outside `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        validate_source_files(&self.files, "files")?;
        validate_positive(self.pool_capacity, "pool_capacity")?;
        if let Some(fraction) = self.downsampling_fraction {
            validate_fraction(fraction, "downsampling_fraction")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ReadsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadsConfig")
            .field("files", &self.files)
            .field("pool_capacity", &self.pool_capacity)
            .field("stringency", &self.stringency)
            .field("downsampling_fraction", &self.downsampling_fraction)
            .field("random_seed", &self.random_seed)
            .field("suppress_order_verification", &self.suppress_order_verification)
            .field("supplemental_filters", &self.supplemental_filters.len())
            .finish()
    }
}
