//! Read group synthesis and collision remapping.

use bamshard::SourceFileId;
use bamshard::sam::read_group_id;
use bamshard::shard::{Shard, WholeFileShard};
use noodles::sam::header::record::value::map::read_group::tag as rg_tag;
use tempfile::TempDir;

use crate::helpers::{FileSpec, bam_source, collect, memory_source, write_bams};

#[test]
fn test_file_without_read_groups_gets_one_named_after_it() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let paths = write_bams(dir.path(), &[FileSpec::new("sample7.bam", &[(0, 1)])]);
    let source = bam_source(&paths, 1);

    let header = source.file_header(&SourceFileId::from(paths[0].as_path()))?;
    assert_eq!(header.read_groups().len(), 1);
    let (id, read_group) = header.read_groups().first().unwrap();
    assert_eq!(id.to_string(), "sample7.bam");
    assert_eq!(read_group.other_fields().get(&rg_tag::LIBRARY).unwrap().to_string(), "sample7.bam");
    assert_eq!(read_group.other_fields().get(&rg_tag::SAMPLE).unwrap().to_string(), "sample7.bam");
    assert!(!source.has_read_group_collisions());
    Ok(())
}

#[test]
fn test_colliding_read_groups_are_remapped_on_records() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let paths = write_bams(
        dir.path(),
        &[
            FileSpec::new("a.bam", &[(0, 10), (0, 20), (0, 30)]).read_group("RG1"),
            FileSpec::new("b.bam", &[(0, 15), (0, 25)]).read_group("RG1"),
        ],
    );
    let source = bam_source(&paths, 1);
    let a = SourceFileId::from(paths[0].as_path());
    let b = SourceFileId::from(paths[1].as_path());

    assert!(source.has_read_group_collisions());
    let merged_a = source.merged_read_group_id(&a, "RG1")?.unwrap().to_string();
    let merged_b = source.merged_read_group_id(&b, "RG1")?.unwrap().to_string();
    assert_ne!(merged_a, merged_b);
    assert!(source.header().read_groups().contains_key(merged_a.as_bytes()));
    assert!(source.header().read_groups().contains_key(merged_b.as_bytes()));

    for record in collect(source.seek(&Shard::from(WholeFileShard::new()))?) {
        let expected = if record.source == a { &merged_a } else { &merged_b };
        assert_eq!(read_group_id(&record.record).unwrap().to_string(), *expected);
    }
    Ok(())
}

#[test]
fn test_distinct_read_groups_pass_through_unchanged() {
    let source = memory_source(
        &[
            FileSpec::new("a.bam", &[(0, 1)]).read_group("A"),
            FileSpec::new("b.bam", &[(0, 2)]).read_group("B"),
        ],
        |config| config,
    );
    assert!(!source.has_read_group_collisions());
    assert_eq!(source.merged_read_group_id(&"b.bam".into(), "B").unwrap(), Some("B"));

    let records = collect(source.seek(&Shard::from(WholeFileShard::new())).unwrap());
    let ids: Vec<String> =
        records.iter().map(|r| read_group_id(&r.record).unwrap().to_string()).collect();
    assert_eq!(ids, vec!["A", "B"]);
}

#[test]
fn test_remapping_is_identical_across_bundles() {
    let specs = [
        FileSpec::new("a.bam", &[(0, 1)]).read_group("RG1"),
        FileSpec::new("b.bam", &[(0, 2)]).read_group("RG1"),
    ];
    let source = memory_source(&specs, |config| config.with_pool_capacity(3));
    let shard = Shard::from(WholeFileShard::new());

    // Hold every bundle at once so each traversal reads through a different one.
    let sequences: Vec<_> = (0..3).map(|_| source.seek(&shard).unwrap()).collect();
    assert_eq!(source.pool().created_count(), 3);

    let mut streams = Vec::new();
    for sequence in sequences {
        let ids: Vec<String> = collect(sequence)
            .iter()
            .map(|r| read_group_id(&r.record).unwrap().to_string())
            .collect();
        streams.push(ids);
    }
    assert!(streams.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(streams[0], vec!["RG1", "RG1.1"]);
}
