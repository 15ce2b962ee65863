//! Fixture builders shared by the integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bamshard::codec::memory::InMemoryCodec;
use bamshard::sam::{RecordBuilder, SamBuilder};
use bamshard::{AlignmentDataSource, LeaseScopedSequence, ReadsConfig, SourcedRecord};

/// One input file: name, references, optional read group, and (reference, start) placements.
pub struct FileSpec<'a> {
    pub name: &'a str,
    pub references: &'a [&'a str],
    pub read_group: Option<&'a str>,
    pub placements: &'a [(usize, usize)],
}

impl<'a> FileSpec<'a> {
    pub fn new(name: &'a str, placements: &'a [(usize, usize)]) -> Self {
        Self { name, references: &["chr1", "chr2"], read_group: None, placements }
    }

    #[must_use]
    pub fn references(mut self, references: &'a [&'a str]) -> Self {
        self.references = references;
        self
    }

    #[must_use]
    pub fn read_group(mut self, id: &'a str) -> Self {
        self.read_group = Some(id);
        self
    }

    /// Header and records for this file; records are named `{name}:{i}`.
    pub fn build(&self) -> SamBuilder {
        let mut builder = SamBuilder::new(self.references);
        if let Some(id) = self.read_group {
            builder = builder.with_read_group(id, self.name);
        }
        for (i, &(tid, start)) in self.placements.iter().enumerate() {
            let mut record = RecordBuilder::mapped(tid, start).name(&format!("{}:{i}", self.name));
            if let Some(id) = self.read_group {
                record = record.read_group(id);
            }
            builder.push(record.build());
        }
        builder
    }
}

/// Writes each file as an indexed BAM under `dir` and returns the BAM paths.
pub fn write_bams(dir: &Path, specs: &[FileSpec<'_>]) -> Vec<PathBuf> {
    specs
        .iter()
        .map(|spec| {
            let path = dir.join(spec.name);
            spec.build().write_indexed_bam(&path).expect("failed to write fixture BAM");
            path
        })
        .collect()
}

/// A BAM-backed data source over `paths`.
pub fn bam_source(paths: &[PathBuf], capacity: usize) -> AlignmentDataSource {
    let files = paths.iter().map(|p| p.as_path().into()).collect();
    AlignmentDataSource::open_bam(ReadsConfig::new(files).with_pool_capacity(capacity))
        .expect("failed to open data source")
}

/// An in-memory codec holding every file of `specs`.
pub fn memory_codec(specs: &[FileSpec<'_>]) -> Arc<InMemoryCodec> {
    let codec = InMemoryCodec::new();
    for spec in specs {
        let (header, records) = spec.build().into_parts();
        codec.insert(spec.name, header, records);
    }
    Arc::new(codec)
}

/// A data source over in-memory `specs` configured by `configure`.
pub fn memory_source(
    specs: &[FileSpec<'_>],
    configure: impl FnOnce(ReadsConfig) -> ReadsConfig,
) -> AlignmentDataSource {
    let files = specs.iter().map(|s| s.name.into()).collect();
    AlignmentDataSource::new(configure(ReadsConfig::new(files)), memory_codec(specs))
        .expect("failed to open data source")
}

/// Drains and closes `sequence`.
pub fn collect(mut sequence: LeaseScopedSequence) -> Vec<SourcedRecord> {
    let mut records = Vec::new();
    while let Some(record) = sequence.next_record().expect("traversal failed") {
        records.push(record);
    }
    sequence.close().expect("failed to close traversal");
    records
}

/// `(reference, start)` of each record.
pub fn placements(records: &[SourcedRecord]) -> Vec<(usize, usize)> {
    records.iter().map(|r| (r.key().reference, r.key().start)).collect()
}

/// Names of each record.
pub fn names(records: &[SourcedRecord]) -> Vec<String> {
    records.iter().map(|r| r.record.name().map(|n| n.to_string()).unwrap_or_default()).collect()
}
