//! Merge ordering across files.

use bamshard::shard::{Shard, WholeFileShard};
use proptest::prelude::*;
use tempfile::TempDir;

use crate::helpers::{FileSpec, bam_source, collect, memory_source, names, placements, write_bams};

#[test]
fn test_two_bams_interleave_by_coordinate() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let paths = write_bams(
        dir.path(),
        &[
            FileSpec::new("a.bam", &[(0, 10), (0, 20), (0, 30)]),
            FileSpec::new("b.bam", &[(0, 15), (0, 25)]),
        ],
    );
    let source = bam_source(&paths, 1);

    let records = collect(source.seek(&Shard::from(WholeFileShard::new()))?);
    let starts: Vec<usize> = placements(&records).into_iter().map(|(_, start)| start).collect();
    assert_eq!(starts, vec![10, 15, 20, 25, 30]);
    assert_eq!(names(&records), vec!["a.bam:0", "b.bam:0", "a.bam:1", "b.bam:1", "a.bam:2"]);
    Ok(())
}

#[test]
fn test_merge_spans_references_and_keeps_every_record() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let paths = write_bams(
        dir.path(),
        &[
            FileSpec::new("a.bam", &[(0, 100), (0, 100), (1, 5), (1, 900)]),
            FileSpec::new("b.bam", &[(0, 50), (1, 1), (1, 900)]),
        ],
    );
    let source = bam_source(&paths, 2);

    let records = collect(source.seek(&Shard::from(WholeFileShard::new()))?);
    assert_eq!(records.len(), 7);
    let keys = placements(&records);
    assert!(keys.windows(2).all(|w| w[0] <= w[1]), "not sorted: {keys:?}");

    // Equal coordinates come out in registration order.
    let last_two: Vec<usize> = records[5..].iter().map(|r| r.file_index).collect();
    assert_eq!(last_two, vec![0, 1]);
    Ok(())
}

#[test]
fn test_files_with_different_dictionaries_merge_onto_the_union() {
    let source = memory_source(
        &[
            FileSpec::new("a.bam", &[(0, 10), (1, 10)]).references(&["chr1", "chr2"]),
            FileSpec::new("b.bam", &[(0, 20), (1, 5)]).references(&["chr2", "chr3"]),
        ],
        |config| config,
    );
    let names: Vec<String> =
        source.header().reference_sequences().keys().map(|name| name.to_string()).collect();
    assert_eq!(names, vec!["chr1", "chr2", "chr3"]);

    let records = collect(source.seek(&Shard::from(WholeFileShard::new())).unwrap());
    assert_eq!(placements(&records), vec![(0, 10), (1, 10), (1, 20), (2, 5)]);
}

fn sorted_placements() -> impl Strategy<Value = Vec<(usize, usize)>> {
    prop::collection::vec((0usize..2, 1usize..500), 0..40).prop_map(|mut v| {
        v.sort_unstable();
        v
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_merge_is_sorted_and_complete(
        a in sorted_placements(),
        b in sorted_placements(),
        c in sorted_placements(),
    ) {
        let source = memory_source(
            &[FileSpec::new("a.bam", &a), FileSpec::new("b.bam", &b), FileSpec::new("c.bam", &c)],
            |config| config,
        );
        let records = collect(source.seek(&Shard::from(WholeFileShard::new())).unwrap());
        let keys = placements(&records);

        let mut expected: Vec<_> = a.iter().chain(&b).chain(&c).copied().collect();
        expected.sort_unstable();
        prop_assert_eq!(keys, expected);
    }
}
