//! Concurrent traversals sharing one data source.

use std::sync::Barrier;
use std::thread;

use bamshard::shard::{Shard, WholeFileShard};
use tempfile::TempDir;

use crate::helpers::{FileSpec, bam_source, collect, memory_source, placements, write_bams};

const THREADS: usize = 4;

fn placements_of(count: usize, offset: usize) -> Vec<(usize, usize)> {
    let mut placements: Vec<_> = (0..count).map(|i| (i % 2, 1 + i * 7 + offset)).collect();
    placements.sort_unstable();
    placements
}

#[test]
fn test_traversals_up_to_capacity_run_concurrently() {
    let a = placements_of(200, 0);
    let b = placements_of(150, 3);
    let source = memory_source(
        &[FileSpec::new("a.bam", &a), FileSpec::new("b.bam", &b)],
        |config| config.with_pool_capacity(THREADS),
    );
    let expected =
        placements(&collect(source.seek(&Shard::from(WholeFileShard::new())).unwrap()));
    assert_eq!(expected.len(), 350);

    // Every thread holds its lease across the barrier, so all of them are live at once.
    let barrier = Barrier::new(THREADS);
    let results: Vec<Vec<(usize, usize)>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    let sequence = source.seek(&Shard::from(WholeFileShard::new())).unwrap();
                    barrier.wait();
                    placements(&collect(sequence))
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for result in results {
        assert_eq!(result, expected);
    }
    assert_eq!(source.pool().created_count(), THREADS);
    assert_eq!(source.pool().leased_count(), 0);
}

#[test]
fn test_concurrent_bam_traversals_yield_identical_streams() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let a = placements_of(500, 0);
    let b = placements_of(500, 1);
    let paths =
        write_bams(dir.path(), &[FileSpec::new("a.bam", &a), FileSpec::new("b.bam", &b)]);
    let source = bam_source(&paths, 2);

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                scope.spawn(|| {
                    placements(&collect(source.seek(&Shard::from(WholeFileShard::new())).unwrap()))
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results[0].len(), 1_000);
    assert_eq!(results[0], results[1]);
    Ok(())
}
