//! Reader bundles: one open reader handle per source file.
//!
//! A bundle is the unit the pool leases out. It is either entirely leased or entirely
//! available; the handles inside it are never handed out individually. Everything about a
//! bundle that is fixed when it is opened (headers, indexes, data-start positions) lives in
//! an immutable [`BundleMetadata`] snapshot that can be shared without holding the bundle.

use std::sync::Arc;

use bstr::BString;
use log::debug;
use noodles::bam::bai;
use noodles::bgzf::VirtualPosition;
use noodles::sam::Header;
use noodles::sam::header::record::value::Map;
use noodles::sam::header::record::value::map::ReadGroup;
use noodles::sam::header::record::value::map::read_group::tag as rg_tag;

use crate::codec::{AlignmentCodec, ReaderHandle, ValidationStringency};
use crate::errors::{DataSourceError, Result};
use crate::sam::check_coordinate_sorted;
use crate::source::SourceFileId;

/// Facts about a bundle that never change after it is opened.
#[derive(Debug)]
pub struct BundleMetadata {
    files: Vec<SourceFileId>,
    headers: Vec<Header>,
    indexes: Vec<Option<Arc<bai::Index>>>,
    data_starts: Vec<VirtualPosition>,
}

impl BundleMetadata {
    /// Files in registration order.
    #[must_use]
    pub fn files(&self) -> &[SourceFileId] {
        &self.files
    }

    /// Per-file headers, in registration order, after read group synthesis.
    #[must_use]
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// Header of the file at `file_index`.
    #[must_use]
    pub fn header(&self, file_index: usize) -> Option<&Header> {
        self.headers.get(file_index)
    }

    /// Index of the file at `file_index`, if it has one.
    #[must_use]
    pub fn index(&self, file_index: usize) -> Option<&Arc<bai::Index>> {
        self.indexes.get(file_index).and_then(Option::as_ref)
    }

    /// True iff every file has an index.
    #[must_use]
    pub fn has_index(&self) -> bool {
        self.indexes.iter().all(Option::is_some)
    }

    /// Virtual position of the first record of the file at `file_index`.
    #[must_use]
    pub fn data_start(&self, file_index: usize) -> Option<VirtualPosition> {
        self.data_starts.get(file_index).copied()
    }

    /// Registration index of `file`.
    ///
    /// # Errors
    ///
    /// Returns [`DataSourceError::UnknownFileId`] if `file` is not part of the bundle.
    pub fn file_index(&self, file: &SourceFileId) -> Result<usize> {
        self.files
            .iter()
            .position(|f| f == file)
            .ok_or_else(|| DataSourceError::UnknownFileId { id: file.to_string() })
    }

    /// Checks that `self` describes the same files as `canonical`.
    ///
    /// # Errors
    ///
    /// Returns [`DataSourceError::HeaderMismatch`] naming the first file whose header or
    /// index presence differs.
    pub fn check_consistent_with(&self, canonical: &BundleMetadata) -> Result<()> {
        for (i, file) in self.files.iter().enumerate() {
            let mismatch = |reason: &str| DataSourceError::HeaderMismatch {
                path: file.to_string(),
                reason: reason.to_string(),
            };
            let (Some(ours), Some(theirs)) = (self.headers.get(i), canonical.headers.get(i))
            else {
                return Err(mismatch("file is missing from one of the bundles"));
            };

            if ours.reference_sequences() != theirs.reference_sequences() {
                return Err(mismatch("reference sequences differ"));
            }
            if ours.read_groups() != theirs.read_groups() {
                return Err(mismatch("read groups differ"));
            }
            if ours != theirs {
                return Err(mismatch("header records differ"));
            }
            if self.index(i).is_some() != canonical.index(i).is_some() {
                return Err(mismatch("index presence differs"));
            }
        }
        Ok(())
    }
}

/// An open set of reader handles, one per source file, leased as a unit.
pub struct ReaderBundle {
    pool_id: u64,
    serial: usize,
    handles: Vec<Box<dyn ReaderHandle>>,
    metadata: Arc<BundleMetadata>,
}

impl ReaderBundle {
    /// Opens one handle per file with `codec`.
    ///
    /// Files declaring no read group get one synthesized from the file name. Each file's
    /// declared sort order is checked against `stringency`.
    ///
    /// # Errors
    ///
    /// Returns the first error from opening a file or from the sort order check. Handles
    /// opened before the failure are closed.
    pub(crate) fn open(
        pool_id: u64,
        serial: usize,
        files: &[SourceFileId],
        codec: &dyn AlignmentCodec,
        stringency: ValidationStringency,
    ) -> Result<Self> {
        let mut handles = Vec::with_capacity(files.len());
        let mut headers = Vec::with_capacity(files.len());
        let mut indexes = Vec::with_capacity(files.len());
        let mut data_starts = Vec::with_capacity(files.len());

        for file in files {
            let handle = codec.open(file, stringency)?;
            check_coordinate_sorted(handle.header(), file, stringency)?;

            let mut header = handle.header().clone();
            synthesize_read_group(&mut header, file);
            headers.push(header);
            indexes.push(handle.index().cloned().map(Arc::new));
            data_starts.push(handle.data_start());
            handles.push(handle);
        }

        debug!("Opened reader bundle {serial} of pool {pool_id} over {} file(s)", files.len());
        let metadata = BundleMetadata { files: files.to_vec(), headers, indexes, data_starts };
        Ok(Self { pool_id, serial, handles, metadata: Arc::new(metadata) })
    }

    /// Identifier of the pool that created this bundle.
    #[must_use]
    pub fn pool_id(&self) -> u64 {
        self.pool_id
    }

    /// Creation order of this bundle within its pool.
    #[must_use]
    pub fn serial(&self) -> usize {
        self.serial
    }

    /// The bundle's immutable metadata.
    #[must_use]
    pub fn metadata(&self) -> &Arc<BundleMetadata> {
        &self.metadata
    }

    /// Handle for the file at `file_index`.
    pub(crate) fn handle_mut(&mut self, file_index: usize) -> Option<&mut (dyn ReaderHandle + 'static)> {
        self.handles.get_mut(file_index).map(|h| &mut **h)
    }
}

impl std::fmt::Debug for ReaderBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderBundle")
            .field("pool_id", &self.pool_id)
            .field("serial", &self.serial)
            .field("files", &self.metadata.files)
            .finish_non_exhaustive()
    }
}

/// Adds a read group named after `file` when the header declares none.
///
/// The synthesized group uses the file name as its id, library, and sample so every record
/// can be attributed to a read group downstream.
fn synthesize_read_group(header: &mut Header, file: &SourceFileId) {
    if !header.read_groups().is_empty() {
        return;
    }

    let name = file.file_name();
    debug!("{file} declares no read groups; using '{name}'");
    let mut read_group = Map::<ReadGroup>::default();
    read_group.other_fields_mut().insert(rg_tag::LIBRARY, BString::from(name.as_str()));
    read_group.other_fields_mut().insert(rg_tag::SAMPLE, BString::from(name.as_str()));
    header.read_groups_mut().insert(BString::from(name), read_group);
}
