//! Builders for alignment records, headers, and BAM fixtures.
//!
//! # Examples
//!
//! ```rust
//! use bamshard::sam::{RecordBuilder, SamBuilder};
//!
//! let mut builder = SamBuilder::new(&["chr1", "chr2"]).with_read_group("RG1", "sample1");
//! builder.push(RecordBuilder::mapped(0, 100).name("r1").read_group("RG1").build());
//! builder.push(RecordBuilder::mapped(1, 50).name("r2").read_group("RG1").build());
//! assert_eq!(builder.records().len(), 2);
//! ```

use std::fs::File;
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use bstr::BString;
use noodles::bam;
use noodles::bam::bai;
use noodles::core::Position;
use noodles::csi::binning_index::Indexer;
use noodles::csi::binning_index::index::reference_sequence::bin::Chunk as IndexChunk;
use noodles::sam::Header;
use noodles::sam::alignment::io::Write as AlignmentWrite;
use noodles::sam::alignment::record::Flags;
use noodles::sam::alignment::record::MappingQuality;
use noodles::sam::alignment::record::cigar::Op;
use noodles::sam::alignment::record::cigar::op::Kind;
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record_buf::data::field::Value as BufValue;
use noodles::sam::alignment::record_buf::{QualityScores, RecordBuf, Sequence};
use noodles::sam::header::record::value::Map;
use noodles::sam::header::record::value::map::header::tag as header_tag;
use noodles::sam::header::record::value::map::program::tag as program_tag;
use noodles::sam::header::record::value::map::read_group::tag as rg_tag;
use noodles::sam::header::record::value::map::{Program, ReadGroup, ReferenceSequence};

/// Length given to every reference created by [`reference_header`].
pub const DEFAULT_REFERENCE_LENGTH: usize = 1_000_000;

const DEFAULT_BASES: &str = "ACGTACGTAC";
const DEFAULT_BASE_QUALITY: u8 = 30;

/// Builds a coordinate-sorted header declaring `names` as references.
#[must_use]
pub fn reference_header(names: &[&str]) -> Header {
    let mut hd = Map::<noodles::sam::header::record::value::map::Header>::default();
    hd.other_fields_mut().insert(header_tag::SORT_ORDER, BString::from("coordinate"));

    let length = NonZeroUsize::new(DEFAULT_REFERENCE_LENGTH).unwrap_or(NonZeroUsize::MIN);
    let mut builder = Header::builder().set_header(hd);
    for name in names {
        builder =
            builder.add_reference_sequence(BString::from(*name), Map::<ReferenceSequence>::new(length));
    }
    builder.build()
}

/// Builder for single alignment records.
///
/// Records built with a reference and start and without the unmapped flag get a full-length
/// match CIGAR, so they are valid BAM records.
#[derive(Debug, Default)]
pub struct RecordBuilder {
    name: Option<String>,
    flags: Flags,
    reference_sequence_id: Option<usize>,
    alignment_start: Option<usize>,
    mapping_quality: Option<u8>,
    sequence: Option<String>,
    tags: Vec<(Tag, BufValue)>,
    mate_reference_sequence_id: Option<usize>,
    mate_alignment_start: Option<usize>,
}

impl RecordBuilder {
    /// Creates a builder with no placement and no flags set.
    #[must_use]
    pub fn new() -> Self {
        Self { flags: Flags::empty(), mapping_quality: Some(60), ..Self::default() }
    }

    /// Creates a builder for a read mapped to `reference_sequence_id` at 1-based `start`.
    #[must_use]
    pub fn mapped(reference_sequence_id: usize, start: usize) -> Self {
        Self::new().reference_sequence_id(reference_sequence_id).alignment_start(start)
    }

    /// Creates a builder for an unplaced, unmapped read.
    #[must_use]
    pub fn unmapped_read() -> Self {
        Self::new().unmapped(true)
    }

    /// Sets the read name.
    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Sets the bases; qualities are uniform.
    #[must_use]
    pub fn sequence(mut self, bases: &str) -> Self {
        self.sequence = Some(bases.to_string());
        self
    }

    /// Sets all flags at once.
    #[must_use]
    pub fn flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the unmapped flag.
    #[must_use]
    pub fn unmapped(mut self, unmapped: bool) -> Self {
        self.flags.set(Flags::UNMAPPED, unmapped);
        self
    }

    /// Sets the duplicate flag.
    #[must_use]
    pub fn duplicate(mut self, duplicate: bool) -> Self {
        self.flags.set(Flags::DUPLICATE, duplicate);
        self
    }

    /// Sets the secondary alignment flag.
    #[must_use]
    pub fn secondary(mut self, secondary: bool) -> Self {
        self.flags.set(Flags::SECONDARY, secondary);
        self
    }

    /// Sets the QC-fail flag.
    #[must_use]
    pub fn qc_fail(mut self, qc_fail: bool) -> Self {
        self.flags.set(Flags::QC_FAIL, qc_fail);
        self
    }

    /// Sets the reference sequence id (0-based).
    #[must_use]
    pub fn reference_sequence_id(mut self, id: usize) -> Self {
        self.reference_sequence_id = Some(id);
        self
    }

    /// Sets the alignment start (1-based).
    #[must_use]
    pub fn alignment_start(mut self, start: usize) -> Self {
        self.alignment_start = Some(start);
        self
    }

    /// Sets the mapping quality.
    #[must_use]
    pub fn mapping_quality(mut self, mapq: u8) -> Self {
        self.mapping_quality = Some(mapq);
        self
    }

    /// Places the mate at `reference_sequence_id`:`start`.
    #[must_use]
    pub fn mate(mut self, reference_sequence_id: usize, start: usize) -> Self {
        self.mate_reference_sequence_id = Some(reference_sequence_id);
        self.mate_alignment_start = Some(start);
        self
    }

    /// Sets the `RG` tag.
    #[must_use]
    pub fn read_group(self, id: &str) -> Self {
        self.tag(Tag::READ_GROUP, id)
    }

    /// Sets the `PG` tag.
    #[must_use]
    pub fn program(self, id: &str) -> Self {
        self.tag(Tag::PROGRAM, id)
    }

    /// Adds an arbitrary tag.
    #[must_use]
    pub fn tag<V: Into<BufValue>>(mut self, tag: Tag, value: V) -> Self {
        self.tags.push((tag, value.into()));
        self
    }

    /// Builds the record.
    #[must_use]
    pub fn build(self) -> RecordBuf {
        let mut record = RecordBuf::default();
        let bases = self.sequence.unwrap_or_else(|| DEFAULT_BASES.to_string());

        *record.name_mut() = self.name.map(BString::from);
        *record.flags_mut() = self.flags;
        *record.reference_sequence_id_mut() = self.reference_sequence_id;
        *record.alignment_start_mut() = self.alignment_start.and_then(Position::new);
        *record.mapping_quality_mut() = self.mapping_quality.and_then(MappingQuality::new);
        *record.mate_reference_sequence_id_mut() = self.mate_reference_sequence_id;
        *record.mate_alignment_start_mut() = self.mate_alignment_start.and_then(Position::new);

        let placed = record.reference_sequence_id().is_some()
            && record.alignment_start().is_some()
            && !self.flags.is_unmapped();
        if placed && !bases.is_empty() {
            *record.cigar_mut() = [Op::new(Kind::Match, bases.len())].into_iter().collect();
        }
        *record.quality_scores_mut() = QualityScores::from(vec![DEFAULT_BASE_QUALITY; bases.len()]);
        *record.sequence_mut() = Sequence::from(bases.into_bytes());

        for (tag, value) in self.tags {
            record.data_mut().insert(tag, value);
        }
        record
    }
}

/// Accumulates a header and records and writes them as BAM fixtures.
#[derive(Debug, Clone)]
pub struct SamBuilder {
    header: Header,
    records: Vec<RecordBuf>,
}

impl SamBuilder {
    /// Creates a builder whose header declares `references` and coordinate order.
    #[must_use]
    pub fn new(references: &[&str]) -> Self {
        Self::from_header(reference_header(references))
    }

    /// Creates a builder with an explicit header.
    #[must_use]
    pub fn from_header(header: Header) -> Self {
        Self { header, records: Vec::new() }
    }

    /// Declares a read group with the given sample.
    #[must_use]
    pub fn with_read_group(mut self, id: &str, sample: &str) -> Self {
        let mut read_group = Map::<ReadGroup>::default();
        read_group.other_fields_mut().insert(rg_tag::SAMPLE, BString::from(sample));
        read_group.other_fields_mut().insert(rg_tag::LIBRARY, BString::from(format!("{sample}-lib")));
        self.header.read_groups_mut().insert(BString::from(id), read_group);
        self
    }

    /// Declares a program record.
    #[must_use]
    pub fn with_program(mut self, id: &str, name: &str) -> Self {
        let mut program = Map::<Program>::default();
        program.other_fields_mut().insert(program_tag::NAME, BString::from(name));
        self.header.programs_mut().as_mut().insert(BString::from(id), program);
        self
    }

    /// Adds a `@CO` line.
    #[must_use]
    pub fn with_comment(mut self, comment: &str) -> Self {
        self.header.comments_mut().push(BString::from(comment));
        self
    }

    /// Overrides the declared `@HD SO` value.
    #[must_use]
    pub fn with_sort_order(mut self, sort_order: &str) -> Self {
        let hd = self.header.header_mut().get_or_insert_with(Default::default);
        hd.other_fields_mut().insert(header_tag::SORT_ORDER, BString::from(sort_order));
        self
    }

    /// Appends a record. Callers append in coordinate order.
    pub fn push(&mut self, record: RecordBuf) -> &mut Self {
        self.records.push(record);
        self
    }

    /// The header.
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Records appended so far.
    #[must_use]
    pub fn records(&self) -> &[RecordBuf] {
        &self.records
    }

    /// Splits the builder into its header and records.
    #[must_use]
    pub fn into_parts(self) -> (Header, Vec<RecordBuf>) {
        (self.header, self.records)
    }

    /// Writes the header and records to a BAM file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn write_bam(&self, path: &Path) -> io::Result<()> {
        let mut writer = bam::io::Writer::new(File::create(path)?);
        writer.write_header(&self.header)?;
        for record in &self.records {
            writer.write_alignment_record(&self.header, record)?;
        }
        writer.into_inner().try_finish()
    }

    /// Writes a BAM file and a `<path>.bai` index next to it, returning the index path.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be written or the BAM cannot be indexed.
    pub fn write_indexed_bam(&self, path: &Path) -> io::Result<PathBuf> {
        self.write_bam(path)?;
        let index = index_bam(path)?;

        let mut index_path = path.as_os_str().to_owned();
        index_path.push(".bai");
        let index_path = PathBuf::from(index_path);
        let mut writer = bai::io::Writer::new(File::create(&index_path)?);
        writer.write_index(&index)?;
        Ok(index_path)
    }
}

/// Builds a BAI by scanning a BAM and recording each record's virtual position span.
fn index_bam(path: &Path) -> io::Result<bai::Index> {
    let mut reader = bam::io::Reader::new(File::open(path)?);
    let header = reader.read_header()?;

    let mut indexer = Indexer::default();
    let mut record = RecordBuf::default();
    let mut start = reader.get_ref().virtual_position();
    while reader.read_record_buf(&header, &mut record)? != 0 {
        let end = reader.get_ref().virtual_position();
        indexer.add_record(super::index_context(&record), IndexChunk::new(start, end))?;
        start = end;
    }

    Ok(indexer.build(header.reference_sequences().len()))
}
