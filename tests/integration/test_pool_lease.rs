//! Pool capacity and lease lifetimes seen through the data source.

use bamshard::DataSourceError;
use bamshard::codec::memory::InMemoryCodec;
use bamshard::sam::SamBuilder;
use bamshard::shard::{ChunkedShard, Shard, WholeFileShard};
use rstest::rstest;

use crate::helpers::{FileSpec, collect, memory_codec, memory_source};

fn specs() -> Vec<FileSpec<'static>> {
    vec![
        FileSpec::new("a.bam", &[(0, 10), (0, 20), (0, 30)]),
        FileSpec::new("b.bam", &[(0, 15), (0, 25)]),
    ]
}

#[test]
fn test_capacity_one_supports_sequential_traversals() {
    let source = memory_source(&specs(), |config| config.with_pool_capacity(1));
    for _ in 0..20 {
        let records = collect(source.seek(&Shard::from(WholeFileShard::new())).unwrap());
        assert_eq!(records.len(), 5);
    }
    assert_eq!(source.pool().created_count(), 1);
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(4)]
fn test_acquire_beyond_capacity_fails(#[case] capacity: usize) {
    let source = memory_source(&specs(), |config| config.with_pool_capacity(capacity));
    let shard = Shard::from(WholeFileShard::new());

    let open: Vec<_> = (0..capacity).map(|_| source.seek(&shard).unwrap()).collect();
    match source.seek(&shard) {
        Err(DataSourceError::PoolExhausted { capacity: reported }) => assert_eq!(reported, capacity),
        other => panic!("expected PoolExhausted, got {other:?}"),
    }
    assert_eq!(source.pool().leased_count(), capacity);

    drop(open);
    assert_eq!(source.pool().leased_count(), 0);
}

#[test]
fn test_early_close_returns_bundle_immediately() {
    let source = memory_source(&specs(), |config| config.with_pool_capacity(1));
    let shard = Shard::from(WholeFileShard::new());

    let mut sequence = source.seek(&shard).unwrap();
    assert!(sequence.next_record().unwrap().is_some());
    sequence.close().unwrap();

    let again = source.seek(&shard).unwrap();
    assert_eq!(collect(again).len(), 5);
}

#[test]
fn test_failed_traversal_does_not_leak_or_disable_the_source() {
    let source = memory_source(&specs(), |config| config.with_pool_capacity(1));

    let bad = Shard::from(
        ChunkedShard::pull().with_chunks("unknown.bam", vec![InMemoryCodec::chunk_of(0..1)]),
    );
    let err = source.seek(&bad).unwrap_err();
    assert!(matches!(err, DataSourceError::UnknownFileId { .. }));
    assert!(!err.is_persistent());

    let records = collect(source.seek(&Shard::from(WholeFileShard::new())).unwrap());
    assert_eq!(records.len(), 5);
}

#[test]
fn test_diverged_header_fails_new_bundle_and_frees_slot() {
    let specs = specs();
    let codec = memory_codec(&specs);
    let files = specs.iter().map(|s| s.name.into()).collect();
    let source = bamshard::AlignmentDataSource::new(
        bamshard::ReadsConfig::new(files).with_pool_capacity(2),
        codec.clone(),
    )
    .unwrap();
    let shard = Shard::from(WholeFileShard::new());

    // The first bundle already exists; hold it so the next seek must open another.
    let held = source.seek(&shard).unwrap();
    let changed = SamBuilder::new(&["chr1", "chr2"]).with_read_group("X", "other").header().clone();
    codec.replace_header(&"b.bam".into(), changed).unwrap();

    let err = source.seek(&shard).unwrap_err();
    assert!(matches!(err, DataSourceError::HeaderMismatch { ref path, .. } if path == "b.bam"));
    assert_eq!(source.pool().created_count(), 1);

    held.close().unwrap();
    assert_eq!(collect(source.seek(&shard).unwrap()).len(), 5);
}
