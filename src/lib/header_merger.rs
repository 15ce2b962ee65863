//! Merging per-file headers into one header.
//!
//! The merged header is computed once, from the first bundle a data source opens, and shared
//! read-only by every traversal afterwards. Merging produces, per file:
//!
//! - a [`ReferenceRemap`] from the file's reference indexes to merged indexes
//! - an [`IdRemap`] for read group ids
//! - an [`IdRemap`] for program ids
//!
//! # Read group collisions
//!
//! Two files declaring the same read group id is a collision. The first file (in registration
//! order) keeps the id and every later file declaring it gets `"{id}.{n}"` with the smallest
//! `n >= 1` not used by any original or already assigned id. The assignment only depends on
//! the file registration order and the headers, so every bundle over the same files yields
//! the same remapping.

use std::collections::{HashMap, HashSet};

use bstr::{BString, ByteSlice};
use log::debug;
use noodles::sam::Header;
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record_buf::RecordBuf;
use noodles::sam::alignment::record_buf::data::field::Value as BufValue;
use noodles::sam::header::record::value::Map;
use noodles::sam::header::record::value::map::header::tag as header_tag;
use noodles::sam::header::record::value::map::program::tag as program_tag;
use noodles::sam::header::record::value::map::{Program, ReadGroup, ReferenceSequence};

use crate::errors::{DataSourceError, Result};
use crate::source::SourceFileId;

/// Mapping from a file's original ids to merged ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdRemap {
    ids: HashMap<BString, BString>,
    renamed: usize,
}

impl IdRemap {
    /// Merged id for `original`, if the file declared it.
    #[must_use]
    pub fn get(&self, original: &[u8]) -> Option<&BString> {
        self.ids.get(original)
    }

    /// True if every id maps to itself.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.renamed == 0
    }

    /// Number of ids declared by the file.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True if the file declared no ids.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn insert(&mut self, original: BString, merged: BString) {
        if original != merged {
            self.renamed += 1;
        }
        self.ids.insert(original, merged);
    }
}

/// Mapping from a file's reference indexes to merged reference indexes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceRemap {
    indexes: Vec<usize>,
    moved: usize,
}

impl ReferenceRemap {
    /// Merged index of the file's reference `local`.
    #[must_use]
    pub fn get(&self, local: usize) -> Option<usize> {
        self.indexes.get(local).copied()
    }

    /// True if every reference keeps its index.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.moved == 0
    }

    fn push(&mut self, merged: usize) {
        if merged != self.indexes.len() {
            self.moved += 1;
        }
        self.indexes.push(merged);
    }
}

/// The union of every file's header plus the per-file id remappings.
#[derive(Debug, Clone)]
pub struct MergedHeader {
    header: Header,
    files: Vec<SourceFileId>,
    references: Vec<ReferenceRemap>,
    read_groups: Vec<IdRemap>,
    programs: Vec<IdRemap>,
    has_collisions: bool,
}

impl MergedHeader {
    /// Merges `headers`, given in the registration order of `files`.
    ///
    /// # Errors
    ///
    /// Returns [`DataSourceError::HeaderConflict`] if a reference is declared with two
    /// different lengths, or if a file's references are ordered inconsistently with the
    /// files before it.
    pub fn merge(files: &[SourceFileId], headers: &[Header]) -> Result<Self> {
        if files.len() != headers.len() {
            return Err(DataSourceError::HeaderConflict {
                reason: format!("{} file(s) but {} header(s)", files.len(), headers.len()),
            });
        }

        let (reference_sequences, references) = merge_references(files, headers)?;
        let (read_groups, read_group_maps, has_collisions) = merge_read_groups(files, headers);
        let (programs, program_maps) = merge_programs(headers);

        let mut hd = headers
            .iter()
            .find_map(|h| h.header().cloned())
            .unwrap_or_else(Map::<noodles::sam::header::record::value::map::Header>::default);
        hd.other_fields_mut().insert(header_tag::SORT_ORDER, BString::from("coordinate"));

        let mut builder = Header::builder().set_header(hd);
        for (name, map) in reference_sequences {
            builder = builder.add_reference_sequence(name, map);
        }
        for (id, map) in read_groups {
            builder = builder.add_read_group(id, map);
        }
        for (id, map) in programs {
            builder = builder.add_program(id, map);
        }
        let mut seen_comments = HashSet::new();
        for comment in headers.iter().flat_map(Header::comments) {
            if seen_comments.insert(comment.clone()) {
                builder = builder.add_comment(comment.clone());
            }
        }

        Ok(Self {
            header: builder.build(),
            files: files.to_vec(),
            references,
            read_groups: read_group_maps,
            programs: program_maps,
            has_collisions,
        })
    }

    /// The merged header.
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Files in registration order.
    #[must_use]
    pub fn files(&self) -> &[SourceFileId] {
        &self.files
    }

    /// True if at least two files declare the same read group id.
    #[must_use]
    pub fn has_read_group_collisions(&self) -> bool {
        self.has_collisions
    }

    /// Read group remapping of the file at `file_index`.
    #[must_use]
    pub fn read_group_remap(&self, file_index: usize) -> Option<&IdRemap> {
        self.read_groups.get(file_index)
    }

    /// Program remapping of the file at `file_index`.
    #[must_use]
    pub fn program_remap(&self, file_index: usize) -> Option<&IdRemap> {
        self.programs.get(file_index)
    }

    /// Reference remapping of the file at `file_index`.
    #[must_use]
    pub fn reference_remap(&self, file_index: usize) -> Option<&ReferenceRemap> {
        self.references.get(file_index)
    }

    /// Merged id of read group `original` declared by the file at `file_index`.
    #[must_use]
    pub fn merged_read_group_id(&self, file_index: usize, original: &str) -> Option<&str> {
        self.read_group_remap(file_index)?.get(original.as_bytes())?.to_str().ok()
    }

    /// Rewrites a record drawn from the file at `file_index` so it refers to the merged
    /// header: reference and mate reference indexes, `PG`, and (when read group ids collide)
    /// `RG`.
    pub fn rewrite(&self, file_index: usize, record: &mut RecordBuf) {
        if let Some(remap) = self.references.get(file_index).filter(|r| !r.is_identity()) {
            if let Some(id) = record.reference_sequence_id() {
                *record.reference_sequence_id_mut() = remap.get(id).or(Some(id));
            }
            if let Some(id) = record.mate_reference_sequence_id() {
                *record.mate_reference_sequence_id_mut() = remap.get(id).or(Some(id));
            }
        }
        if self.has_collisions {
            if let Some(remap) = self.read_groups.get(file_index) {
                rewrite_tag(record, Tag::READ_GROUP, remap);
            }
        }
        if let Some(remap) = self.programs.get(file_index).filter(|r| !r.is_identity()) {
            rewrite_tag(record, Tag::PROGRAM, remap);
        }
    }
}

fn rewrite_tag(record: &mut RecordBuf, tag: Tag, remap: &IdRemap) {
    let merged = match record.data().get(&tag) {
        Some(BufValue::String(original)) => {
            remap.get(original).filter(|merged| *merged != original).cloned()
        }
        _ => None,
    };
    if let Some(merged) = merged {
        record.data_mut().insert(tag, BufValue::String(merged));
    }
}

type NamedReferences = Vec<(BString, Map<ReferenceSequence>)>;

fn merge_references(
    files: &[SourceFileId],
    headers: &[Header],
) -> Result<(NamedReferences, Vec<ReferenceRemap>)> {
    let mut merged: NamedReferences = Vec::new();
    let mut by_name: HashMap<BString, usize> = HashMap::new();
    let mut remaps = Vec::with_capacity(headers.len());

    for (file, header) in files.iter().zip(headers) {
        let mut remap = ReferenceRemap::default();
        let mut previous: Option<usize> = None;

        for (name, map) in header.reference_sequences() {
            let index = match by_name.get(name) {
                Some(&index) => {
                    let existing = merged[index].1.length();
                    if existing != map.length() {
                        return Err(DataSourceError::HeaderConflict {
                            reason: format!(
                                "reference '{name}' has length {} in '{file}' but {existing} in an earlier file",
                                map.length()
                            ),
                        });
                    }
                    index
                }
                None => {
                    by_name.insert(name.clone(), merged.len());
                    merged.push((name.clone(), map.clone()));
                    merged.len() - 1
                }
            };

            if previous.is_some_and(|p| index <= p) {
                return Err(DataSourceError::HeaderConflict {
                    reason: format!(
                        "references of '{file}' are ordered inconsistently with earlier files at '{name}'"
                    ),
                });
            }
            previous = Some(index);
            remap.push(index);
        }
        remaps.push(remap);
    }

    Ok((merged, remaps))
}

fn merge_read_groups(
    files: &[SourceFileId],
    headers: &[Header],
) -> (Vec<(BString, Map<ReadGroup>)>, Vec<IdRemap>, bool) {
    let mut taken: HashSet<BString> =
        headers.iter().flat_map(|h| h.read_groups().keys().cloned()).collect();
    let mut claimed: HashSet<BString> = HashSet::new();
    let mut merged = Vec::new();
    let mut remaps = Vec::with_capacity(headers.len());
    let mut has_collisions = false;

    for (file, header) in files.iter().zip(headers) {
        let mut remap = IdRemap::default();
        for (id, read_group) in header.read_groups() {
            let merged_id = if claimed.insert(id.clone()) {
                id.clone()
            } else {
                has_collisions = true;
                let fresh = unique_id(id, &mut taken);
                debug!("Read group '{id}' of {file} collides with an earlier file; using '{fresh}'");
                fresh
            };
            merged.push((merged_id.clone(), read_group.clone()));
            remap.insert(id.clone(), merged_id);
        }
        remaps.push(remap);
    }

    (merged, remaps, has_collisions)
}

fn merge_programs(headers: &[Header]) -> (Vec<(BString, Map<Program>)>, Vec<IdRemap>) {
    let mut taken: HashSet<BString> =
        headers.iter().flat_map(|h| h.programs().as_ref().keys().cloned()).collect();
    let mut merged: Vec<(BString, Map<Program>)> = Vec::new();
    // Programs as declared, before previous-program links were rewritten.
    let mut declared: Vec<Map<Program>> = Vec::new();
    let mut by_id: HashMap<BString, usize> = HashMap::new();
    let mut remaps = Vec::with_capacity(headers.len());

    for header in headers {
        let programs = header.programs();
        let mut remap = IdRemap::default();
        let mut added = Vec::new();

        for (id, program) in programs.as_ref() {
            let merged_id = match by_id.get(id) {
                Some(&index) if declared[index] == *program => id.clone(),
                Some(_) => {
                    let fresh = unique_id(id, &mut taken);
                    added.push((fresh.clone(), program.clone()));
                    fresh
                }
                None => {
                    added.push((id.clone(), program.clone()));
                    id.clone()
                }
            };
            remap.insert(id.clone(), merged_id);
        }

        // Previous-program links point at ids of the same file, which may have been renamed.
        for (id, original) in added {
            let mut program = original.clone();
            let fields = program.other_fields_mut();
            if let Some(previous) = fields.get_mut(&program_tag::PREVIOUS_PROGRAM_ID) {
                if let Some(renamed) = remap.get(previous.as_slice()) {
                    *previous = renamed.clone();
                }
            }
            by_id.insert(id.clone(), merged.len());
            merged.push((id, program));
            declared.push(original);
        }
        remaps.push(remap);
    }

    (merged, remaps)
}

/// Claims `"{id}.{n}"` for the smallest `n >= 1` not already in `taken`.
fn unique_id(id: &BString, taken: &mut HashSet<BString>) -> BString {
    let mut n = 1usize;
    loop {
        let candidate = BString::from(format!("{id}.{n}"));
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
