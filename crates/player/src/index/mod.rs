//! Segment indexes: mapping between segment numbers, media time and byte ranges.
//!
//! ```text
//!                 +-------------------+
//!  manifest ----> | Single / Formula  |  available right after parsing
//!                 +-------------------+
//!                 +-------------------+
//!  sidx box ----> | Chunk             |  resolved after the index chunk is loaded
//!                 +-------------------+
//! ```

mod formula;
mod sidx;

pub use formula::FormulaIndex;
pub use sidx::{ChunkEntry, ChunkIndex};
#[cfg(test)]
pub(crate) use sidx::tests::build_sidx;

use std::{sync::Arc, time::Duration};

use crate::dash::{RangedUri, Representation};

#[derive(Debug, Clone)]
pub enum SegmentIndex {
    /// The whole representation is one segment covering the period.
    Single,
    /// Segment list or template, computed from manifest data.
    Formula(FormulaIndex),
    /// Parsed `sidx` box.
    Chunk(Arc<ChunkIndex>),
}

impl SegmentIndex {
    pub fn single() -> Self {
        Self::Single
    }

    pub fn formula(representation: Arc<Representation>) -> Self {
        Self::Formula(FormulaIndex::new(representation))
    }

    pub fn chunk(index: ChunkIndex) -> Self {
        Self::Chunk(Arc::new(index))
    }

    /// Number of the segment containing `time`.
    pub fn segment_num(&self, time: Duration, period_duration: Option<Duration>) -> u64 {
        match self {
            Self::Single => 0,
            Self::Formula(index) => index.segment_num(time, period_duration),
            Self::Chunk(index) => index.segment_num(time),
        }
    }

    pub fn start_time(&self, segment_num: u64) -> Duration {
        match self {
            Self::Single => Duration::ZERO,
            Self::Formula(index) => index.start_time(segment_num),
            Self::Chunk(index) => index.start_time(segment_num),
        }
    }

    pub fn duration(&self, segment_num: u64, period_duration: Option<Duration>) -> Option<Duration> {
        match self {
            Self::Single => period_duration,
            Self::Formula(index) => index.duration(segment_num, period_duration),
            Self::Chunk(index) => index.duration(segment_num),
        }
    }

    /// Location of a segment, relative to the representation base URL.
    pub fn segment_url(&self, segment_num: u64) -> Option<RangedUri> {
        match self {
            Self::Single => (segment_num == 0).then(RangedUri::default),
            Self::Formula(index) => index.segment_url(segment_num),
            Self::Chunk(index) => index.segment_url(segment_num),
        }
    }

    pub fn first_segment_num(&self) -> u64 {
        match self {
            Self::Single | Self::Chunk(_) => 0,
            Self::Formula(index) => index.first_segment_num(),
        }
    }

    /// `None` when the number of segments is unbounded or unknown, e.g. for live streams.
    pub fn segment_count(&self, period_duration: Option<Duration>) -> Option<u64> {
        match self {
            Self::Single => Some(1),
            Self::Formula(index) => index.segment_count(period_duration),
            Self::Chunk(index) => Some(index.len() as u64),
        }
    }

    /// Number of the last segment, if the index is bounded.
    pub fn last_segment_num(&self, period_duration: Option<Duration>) -> Option<u64> {
        let count = self.segment_count(period_duration)?;
        Some((self.first_segment_num() + count).saturating_sub(1))
    }
}
