//! Chunk-restricted scans over indexed BAM files.

use std::collections::HashSet;

use bamshard::chunk::Chunk;
use bamshard::filter::MappingQualityFilter;
use bamshard::sam::{RecordBuilder, SamBuilder};
use bamshard::shard::{ChunkedShard, Shard, TraversalKind, WholeFileShard};
use bamshard::{AlignmentDataSource, ReadsConfig, SourceFileId};
use noodles::core::Position;
use noodles::csi::BinningIndex;
use tempfile::TempDir;

use crate::helpers::{FileSpec, bam_source, collect, names, placements, write_bams};

/// Chunks of `file` overlapping `start..=end` on reference `tid`, from its BAI.
fn query(
    source: &AlignmentDataSource,
    file: &SourceFileId,
    tid: usize,
    start: usize,
    end: usize,
) -> anyhow::Result<Vec<Chunk>> {
    let index = source.index(file)?.expect("fixture is indexed");
    let interval = (Position::try_from(start)?..=Position::try_from(end)?).into();
    Ok(index.query(tid, interval)?.into_iter().map(Chunk::from).collect())
}

#[test]
fn test_index_chunks_select_records_on_one_reference() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let paths = write_bams(
        dir.path(),
        &[
            FileSpec::new("a.bam", &[(0, 10), (0, 20), (1, 30), (1, 40)]),
            FileSpec::new("b.bam", &[(0, 15), (1, 35)]),
        ],
    );
    let source = bam_source(&paths, 1);
    assert!(source.has_index());
    let a = SourceFileId::from(paths[0].as_path());
    let b = SourceFileId::from(paths[1].as_path());

    let shard = ChunkedShard::pull()
        .with_chunks(a.clone(), query(&source, &a, 1, 1, 1_000)?)
        .with_chunks(b.clone(), query(&source, &b, 1, 1, 1_000)?);
    let records = collect(source.seek(&Shard::from(shard))?);

    // Small fixtures fit in one bin, so the chunk may also cover neighbouring records; what
    // matters is that every chr2 record is present, in order, and nothing repeats.
    let chr2: Vec<_> = placements(&records).into_iter().filter(|&(tid, _)| tid == 1).collect();
    assert_eq!(chr2, vec![(1, 30), (1, 35), (1, 40)]);
    let unique: HashSet<String> = names(&records).into_iter().collect();
    assert_eq!(unique.len(), records.len());
    Ok(())
}

#[test]
fn test_file_missing_from_shard_is_skipped() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let paths = write_bams(
        dir.path(),
        &[FileSpec::new("a.bam", &[(0, 10)]), FileSpec::new("b.bam", &[(0, 15)])],
    );
    let source = bam_source(&paths, 1);
    let a = SourceFileId::from(paths[0].as_path());

    let start = source.current_positions()[&a];
    let records = collect(source.seek(&Shard::from(ChunkedShard::pull().with_chunks(a, vec![start])))?);
    assert_eq!(names(&records), vec!["a.bam:0"]);
    Ok(())
}

#[test]
fn test_chunk_end_is_exclusive() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let paths = write_bams(dir.path(), &[FileSpec::new("a.bam", &[(0, 1), (0, 2), (0, 3)])]);
    let source = bam_source(&paths, 1);
    let a = SourceFileId::from(paths[0].as_path());

    let data_start = source.current_positions()[&a].start();

    // Find where the second record starts by filling a single-record buffer.
    let mut probe = Shard::from(
        ChunkedShard::buffering(1).with_chunks(a.clone(), vec![Chunk::open_ended(data_start)]),
    );
    source.fill_shard(&mut probe)?;
    let Shard::Chunked(mut probe) = probe else { unreachable!() };
    let second_start = probe.drain_buffer()[0].end_position;

    let shard = ChunkedShard::pull().with_chunks(a, vec![Chunk::new(data_start, second_start)]);
    let records = collect(source.seek(&Shard::from(shard))?);
    assert_eq!(names(&records), vec!["a.bam:0"]);
    Ok(())
}

#[test]
fn test_whole_file_shard_ignores_chunking_and_applies_filters() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("mixed.bam");
    let mut builder = SamBuilder::new(&["chr1"]);
    builder
        .push(RecordBuilder::mapped(0, 5).name("keep1").mapping_quality(60).build())
        .push(RecordBuilder::mapped(0, 6).name("low").mapping_quality(3).build())
        .push(RecordBuilder::mapped(0, 7).name("keep2").mapping_quality(30).build());
    builder.write_indexed_bam(&path)?;
    let source = bam_source(&[path], 1);

    let everything = collect(source.seek(&Shard::from(WholeFileShard::new()))?);
    assert_eq!(everything.len(), 3);

    let filtered = WholeFileShard::new()
        .with_filter(MappingQualityFilter { min: 20 })
        .with_traversal_kind(TraversalKind::Loci);
    let records = collect(source.seek(&Shard::from(filtered))?);
    assert_eq!(names(&records), vec!["keep1", "keep2"]);
    Ok(())
}

#[test]
fn test_downsampling_zero_and_one() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let spec = [FileSpec::new("a.bam", &[(0, 1), (0, 2), (0, 3), (1, 4)])];
    let paths = write_bams(dir.path(), &spec);
    let files: Vec<SourceFileId> = paths.iter().map(|p| p.as_path().into()).collect();
    let shard = Shard::from(WholeFileShard::new());

    let none = AlignmentDataSource::open_bam(ReadsConfig::new(files.clone()).with_downsampling_fraction(0.0))?;
    assert!(collect(none.seek(&shard)?).is_empty());

    let all = AlignmentDataSource::open_bam(ReadsConfig::new(files.clone()).with_downsampling_fraction(1.0))?;
    let plain = AlignmentDataSource::open_bam(ReadsConfig::new(files))?;
    assert_eq!(placements(&collect(all.seek(&shard)?)), placements(&collect(plain.seek(&shard)?)));
    Ok(())
}

#[test]
fn test_missing_file_is_reported() {
    let result =
        AlignmentDataSource::open_bam(ReadsConfig::new(vec!["/nonexistent/input.bam".into()]));
    let err = result.unwrap_err();
    assert!(err.to_string().contains("/nonexistent/input.bam"), "{err}");
}
