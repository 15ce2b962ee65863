//! Custom error types for data source operations.

use std::io;

use thiserror::Error;

/// Result type alias for data source operations
pub type Result<T> = std::result::Result<T, DataSourceError>;

/// Error type for data source operations
#[derive(Error, Debug)]
pub enum DataSourceError {
    /// Every bundle the pool may hold is currently leased
    #[error("Reader pool exhausted: all {capacity} reader bundle(s) are in use")]
    PoolExhausted {
        /// The configured maximum number of bundles
        capacity: usize,
    },

    /// A bundle was returned to a pool that did not create it
    #[error("Bundle from pool {bundle_pool} cannot be released into pool {pool}")]
    ForeignBundle {
        /// Identifier of the pool the bundle came from
        bundle_pool: u64,
        /// Identifier of the pool it was released into
        pool: u64,
    },

    /// A shard or lookup referenced a file that is not part of the data source
    #[error("No reader is associated with file '{id}'")]
    UnknownFileId {
        /// The unknown file id
        id: String,
    },

    /// A record arrived out of coordinate order during a verified traversal
    #[error("Read '{read_name}' at {current} is out of order: previous read was at {previous}")]
    OrderViolation {
        /// Name of the offending record
        read_name: String,
        /// Position of the previously emitted record
        previous: String,
        /// Position of the offending record
        current: String,
    },

    /// The shard cannot be used for the requested operation
    #[error("Cannot {operation} a {shard} shard: {reason}")]
    UnsupportedShardType {
        /// Description of the shard variant
        shard: &'static str,
        /// The operation that was attempted
        operation: &'static str,
        /// Why the combination is unsupported
        reason: String,
    },

    /// A freshly opened bundle does not agree with the bundle the merged header came from
    #[error("Header of '{path}' changed since the data source was opened: {reason}")]
    HeaderMismatch {
        /// Path of the diverging file
        path: String,
        /// What differs
        reason: String,
    },

    /// Per-file headers cannot be merged into one header
    #[error("Cannot merge headers: {reason}")]
    HeaderConflict {
        /// Explanation of the conflict
        reason: String,
    },

    /// Input is not coordinate sorted under strict validation
    #[error("Input '{path}' must be coordinate sorted, found sort order '{sort_order}'")]
    UnsortedInput {
        /// Path to the file
        path: String,
        /// The sort order declared in the header
        sort_order: String,
    },

    /// Invalid parameter value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// Required file does not exist
    #[error("{description} '{path}' does not exist")]
    MissingFile {
        /// Path to the file
        path: String,
        /// Human-readable description of the file
        description: String,
    },

    /// I/O or decoding failure reported by the alignment codec
    #[error("Failed to read '{path}': {source}")]
    Codec {
        /// Path to the file being read
        path: String,
        /// The underlying error
        #[source]
        source: io::Error,
    },
}

impl DataSourceError {
    /// Wraps an I/O error raised while reading `path`.
    pub fn codec(path: impl std::fmt::Display, source: io::Error) -> Self {
        Self::Codec { path: path.to_string(), source }
    }

    /// Whether the error reflects a standing condition of the data source rather than a
    /// failure confined to one traversal.
    ///
    /// Only pool exhaustion persists: it lasts until the caller closes outstanding
    /// sequences. Every other error aborts the traversal that raised it and leaves the data
    /// source usable.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::PoolExhausted { .. })
    }
}
