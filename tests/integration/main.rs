//! Integration tests for the bamshard library.
//!
//! These tests drive the data source end to end, over BAM files written to temporary
//! directories and over in-memory corpora.

mod helpers;
mod test_bam_chunks;
mod test_buffering;
mod test_concurrency;
mod test_merge_order;
mod test_pool_lease;
mod test_read_groups;
