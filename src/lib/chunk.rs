//! Virtual-offset chunks within block-compressed files.
//!
//! A BGZF virtual position packs the compressed offset of a block (high 48 bits) with the
//! offset of a byte inside that block once decompressed (low 16 bits). Virtual positions are
//! totally ordered, so a half-open range of them selects a contiguous run of records that
//! can be reached with a single seek and no decompression of the preceding data.
//!
//! Chunks are produced by an index query against a genomic interval; this module only
//! represents and normalizes them.

use std::fmt;

use noodles::bgzf::VirtualPosition;
use noodles::csi::binning_index::index::reference_sequence::bin::Chunk as IndexChunk;

/// Sentinel end meaning "to the end of the stream".
pub const OPEN_END: VirtualPosition = VirtualPosition::MAX;

/// A half-open range `[start, end)` of virtual positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Chunk {
    start: VirtualPosition,
    end: VirtualPosition,
}

impl Chunk {
    /// Creates the chunk `[start, end)`.
    #[must_use]
    pub fn new(start: VirtualPosition, end: VirtualPosition) -> Self {
        Self { start, end }
    }

    /// Creates a chunk from `start` to the end of the stream.
    #[must_use]
    pub fn open_ended(start: VirtualPosition) -> Self {
        Self { start, end: OPEN_END }
    }

    /// Inclusive start.
    #[must_use]
    pub fn start(&self) -> VirtualPosition {
        self.start
    }

    /// Exclusive end; [`OPEN_END`] for open-ended chunks.
    #[must_use]
    pub fn end(&self) -> VirtualPosition {
        self.end
    }

    /// True if the chunk extends to the end of the stream.
    #[must_use]
    pub fn is_open_ended(&self) -> bool {
        self.end == OPEN_END
    }

    /// True if the chunk selects nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// True if a record starting at `position` lies inside the chunk.
    #[must_use]
    pub fn contains(&self, position: VirtualPosition) -> bool {
        self.start <= position && position < self.end
    }
}

impl From<IndexChunk> for Chunk {
    fn from(chunk: IndexChunk) -> Self {
        Self::new(chunk.start(), chunk.end())
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, ", format_position(self.start))?;
        if self.is_open_ended() {
            write!(f, "EOF)")
        } else {
            write!(f, "{})", format_position(self.end))
        }
    }
}

/// Formats a virtual position as `compressed:uncompressed`.
#[must_use]
pub fn format_position(position: VirtualPosition) -> String {
    format!("{}:{}", position.compressed(), position.uncompressed())
}

/// Sorts chunks by start, drops empty ones, and coalesces chunks that overlap or abut.
///
/// Scanning the normalized list visits every selected record exactly once and never seeks
/// backwards.
#[must_use]
pub fn normalize(chunks: &[Chunk]) -> Vec<Chunk> {
    let mut sorted: Vec<Chunk> = chunks.iter().copied().filter(|c| !c.is_empty()).collect();
    sorted.sort_unstable();

    let mut merged: Vec<Chunk> = Vec::with_capacity(sorted.len());
    for chunk in sorted {
        match merged.last_mut() {
            Some(last) if chunk.start <= last.end => {
                last.end = last.end.max(chunk.end);
            }
            _ => merged.push(chunk),
        }
    }
    merged
}
