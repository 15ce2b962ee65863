//! Furthest consumed position per source file.
//!
//! Buffering fills record, for every file that contributed a record, the chunk starting just
//! past that record and running to the end of the file. Callers use the snapshot to resume
//! scanning where the last fill stopped. Positions are process-local and never persisted.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::chunk::Chunk;
use crate::merge::SourcedRecord;
use crate::source::SourceFileId;

/// Snapshot of the tracked position of every file.
pub type PositionMap = BTreeMap<SourceFileId, Chunk>;

/// Thread-safe per-file position table.
#[derive(Debug, Default)]
pub struct PositionTracker {
    positions: Mutex<PositionMap>,
}

impl PositionTracker {
    /// A tracker starting every file at `initial`.
    #[must_use]
    pub fn new(initial: PositionMap) -> Self {
        Self { positions: Mutex::new(initial) }
    }

    /// Advances the entry of the file `record` came from to just past it.
    pub fn advance(&self, record: &SourcedRecord) {
        self.positions
            .lock()
            .insert(record.source.clone(), Chunk::open_ended(record.end_position));
    }

    /// Current position of `file`.
    #[must_use]
    pub fn get(&self, file: &SourceFileId) -> Option<Chunk> {
        self.positions.lock().get(file).copied()
    }

    /// A copy of every tracked position.
    #[must_use]
    pub fn snapshot(&self) -> PositionMap {
        self.positions.lock().clone()
    }
}
