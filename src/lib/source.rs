//! Identifiers for the physical alignment files behind a data source.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Identifies one physical alignment file.
///
/// Ids are cheap to clone and compare by path. Within a data source each id is unique, and
/// the order in which ids are registered is the file registration order used to break merge
/// ties and to assign remapped read group ids.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceFileId(Arc<Path>);

impl SourceFileId {
    /// Creates an id for the file at `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self(Arc::from(path.as_ref()))
    }

    /// The path this id refers to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.0
    }

    /// The final path component, used when a read group has to be synthesized for the file.
    ///
    /// Falls back to the full path when the path has no file name (e.g. `..`).
    #[must_use]
    pub fn file_name(&self) -> String {
        self.0.file_name().map_or_else(
            || self.0.display().to_string(),
            |name| name.to_string_lossy().into_owned(),
        )
    }
}

impl fmt::Debug for SourceFileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SourceFileId").field(&self.0).finish()
    }
}

impl fmt::Display for SourceFileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl From<&str> for SourceFileId {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<&Path> for SourceFileId {
    fn from(path: &Path) -> Self {
        Self::new(path)
    }
}

impl From<PathBuf> for SourceFileId {
    fn from(path: PathBuf) -> Self {
        Self(Arc::from(path))
    }
}
