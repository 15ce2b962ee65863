//! Buffering fills and position tracking over BAM files.

use bamshard::chunk::Chunk;
use bamshard::shard::{ChunkedShard, Shard};
use bamshard::SourceFileId;
use tempfile::TempDir;

use crate::helpers::{FileSpec, bam_source, collect, names, write_bams};

fn fill(source: &bamshard::AlignmentDataSource, shard: ChunkedShard) -> Vec<bamshard::SourcedRecord> {
    let mut shard = Shard::from(shard);
    source.fill_shard(&mut shard).unwrap();
    let Shard::Chunked(mut chunked) = shard else { unreachable!() };
    chunked.drain_buffer()
}

#[test]
fn test_fills_resume_from_tracked_positions() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let paths = write_bams(
        dir.path(),
        &[
            FileSpec::new("a.bam", &[(0, 10), (0, 20), (0, 30)]),
            FileSpec::new("b.bam", &[(0, 15), (0, 25)]),
        ],
    );
    let source = bam_source(&paths, 1);
    let a = SourceFileId::from(paths[0].as_path());
    let b = SourceFileId::from(paths[1].as_path());

    // Before any fill every file sits at its first record.
    let mut shard = ChunkedShard::buffering(2);
    for file in [&a, &b] {
        shard = shard.with_chunks(file.clone(), vec![source.current_positions()[file]]);
    }
    let first = fill(&source, shard);
    assert_eq!(names(&first), vec!["a.bam:0", "b.bam:0"]);

    let positions = source.current_positions();
    assert_eq!(positions[&a], Chunk::open_ended(first[0].end_position));
    assert_eq!(positions[&b], Chunk::open_ended(first[1].end_position));
    assert!(positions[&a].is_open_ended());

    // Resuming from the tracked positions continues where the first fill stopped.
    let mut shard = ChunkedShard::buffering(10);
    for file in [&a, &b] {
        shard = shard.with_chunks(file.clone(), vec![positions[file]]);
    }
    let rest = fill(&source, shard);
    assert_eq!(names(&rest), vec!["a.bam:1", "b.bam:1", "a.bam:2"]);
    assert_eq!(source.current_positions()[&a], Chunk::open_ended(rest[2].end_position));
    Ok(())
}

#[test]
fn test_fill_stops_at_source_exhaustion() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let paths = write_bams(dir.path(), &[FileSpec::new("a.bam", &[(0, 1), (1, 2)])]);
    let source = bam_source(&paths, 1);
    let a = SourceFileId::from(paths[0].as_path());

    let mut shard = Shard::from(
        ChunkedShard::buffering(100).with_chunks(a.clone(), vec![source.current_positions()[&a]]),
    );
    assert_eq!(source.fill_shard(&mut shard)?, 2);
    let Shard::Chunked(chunked) = &shard else { unreachable!() };
    assert!(!chunked.is_buffer_full());
    assert_eq!(chunked.buffered_len(), 2);
    assert_eq!(source.pool().leased_count(), 0);
    Ok(())
}

#[test]
fn test_files_outside_the_shard_keep_their_positions() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let paths = write_bams(
        dir.path(),
        &[FileSpec::new("a.bam", &[(0, 1), (0, 2)]), FileSpec::new("b.bam", &[(0, 3)])],
    );
    let source = bam_source(&paths, 1);
    let a = SourceFileId::from(paths[0].as_path());
    let b = SourceFileId::from(paths[1].as_path());
    let before = source.current_positions();

    let records =
        fill(&source, ChunkedShard::buffering(5).with_chunks(a.clone(), vec![before[&a]]));
    assert_eq!(records.len(), 2);

    let after = source.current_positions();
    assert_eq!(after[&b], before[&b]);
    assert_ne!(after[&a], before[&a]);
    Ok(())
}

#[test]
fn test_seek_replays_a_filled_buffering_shard() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let paths = write_bams(
        dir.path(),
        &[FileSpec::new("a.bam", &[(0, 1), (0, 4)]), FileSpec::new("b.bam", &[(0, 2)])],
    );
    let source = bam_source(&paths, 1);
    let mut shard = ChunkedShard::buffering(10);
    for file in source.file_ids() {
        shard = shard.with_chunks(file.clone(), vec![source.current_positions()[file]]);
    }
    let mut shard = Shard::from(shard);
    source.fill_shard(&mut shard)?;

    let replayed = collect(source.seek(&shard)?);
    assert_eq!(names(&replayed), vec!["a.bam:0", "b.bam:0", "a.bam:1"]);
    // Replaying leaves the buffer in place.
    assert_eq!(names(&collect(source.seek(&shard)?)), names(&replayed));
    assert_eq!(source.pool().leased_count(), 0);
    Ok(())
}
