//! `sidx` (segment index) box parsing, ISO/IEC 14496-12 8.16.3.

use std::{io::Cursor, time::Duration};

use byteorder::{BigEndian, ReadBytesExt};

use crate::{
    dash::RangedUri,
    util::ticks_to_duration,
    ByteRange, DashError, DashResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkEntry {
    pub start: Duration,
    pub end: Duration,
    /// Absolute byte range inside the media file.
    pub range: ByteRange,
}

/// Index resolved from a downloaded `sidx` box. Segment numbers start at 0.
#[derive(Debug, Clone, Default)]
pub struct ChunkIndex {
    entries: Vec<ChunkEntry>,
}

fn truncated(_: std::io::Error) -> DashError {
    DashError::IndexParseError("sidx box is truncated".to_string())
}

impl ChunkIndex {
    /// Parses a `sidx` box that was downloaded from `index_range`.
    ///
    /// Referenced byte offsets are relative to the first byte after the box, so the index
    /// range is needed to turn them into absolute ranges.
    pub fn parse(
        data: &[u8],
        index_range: ByteRange,
        presentation_time_offset: Duration,
    ) -> DashResult<Self> {
        let mut cursor = Cursor::new(data);

        let size = cursor.read_u32::<BigEndian>().map_err(truncated)? as u64;
        let mut fourcc = [0u8; 4];
        std::io::Read::read_exact(&mut cursor, &mut fourcc).map_err(truncated)?;
        if &fourcc != b"sidx" {
            return Err(DashError::IndexParseError(format!(
                "Expected sidx box, found {}",
                String::from_utf8_lossy(&fourcc)
            )));
        }
        if size > data.len() as u64 {
            return Err(DashError::IndexParseError(format!(
                "sidx box declares {size} bytes but only {} are available",
                data.len()
            )));
        }

        let version = cursor.read_u8().map_err(truncated)?;
        let _flags = cursor.read_u24::<BigEndian>().map_err(truncated)?;
        let _reference_id = cursor.read_u32::<BigEndian>().map_err(truncated)?;
        let timescale = cursor.read_u32::<BigEndian>().map_err(truncated)? as u64;
        if timescale == 0 {
            return Err(DashError::IndexParseError(
                "sidx timescale is zero".to_string(),
            ));
        }

        let (earliest_presentation_time, first_offset) = match version {
            0 => (
                cursor.read_u32::<BigEndian>().map_err(truncated)? as u64,
                cursor.read_u32::<BigEndian>().map_err(truncated)? as u64,
            ),
            1 => (
                cursor.read_u64::<BigEndian>().map_err(truncated)?,
                cursor.read_u64::<BigEndian>().map_err(truncated)?,
            ),
            v => {
                return Err(DashError::IndexParseError(format!(
                    "Unsupported sidx version {v}"
                )))
            }
        };
        let _reserved = cursor.read_u16::<BigEndian>().map_err(truncated)?;
        let reference_count = cursor.read_u16::<BigEndian>().map_err(truncated)?;

        let mut offset = index_range.offset + index_range.length.unwrap_or(size) + first_offset;
        let mut time = earliest_presentation_time;
        let mut entries = Vec::with_capacity(reference_count as usize);
        for _ in 0..reference_count {
            let reference = cursor.read_u32::<BigEndian>().map_err(truncated)?;
            if reference & 0x8000_0000 != 0 {
                return Err(DashError::IndexParseError(
                    "Hierarchical sidx is not supported".to_string(),
                ));
            }
            let referenced_size = (reference & 0x7FFF_FFFF) as u64;
            let subsegment_duration = cursor.read_u32::<BigEndian>().map_err(truncated)? as u64;
            let _sap = cursor.read_u32::<BigEndian>().map_err(truncated)?;

            let start = ticks_to_duration(time, timescale).saturating_sub(presentation_time_offset);
            time += subsegment_duration;
            let end = ticks_to_duration(time, timescale).saturating_sub(presentation_time_offset);

            entries.push(ChunkEntry {
                start,
                end,
                range: ByteRange::new(offset, Some(referenced_size)),
            });
            offset += referenced_size;
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ChunkEntry] {
        &self.entries
    }

    pub fn segment_num(&self, time: Duration) -> u64 {
        let rank = self.entries.partition_point(|e| e.end <= time);
        rank.min(self.entries.len().saturating_sub(1)) as u64
    }

    pub fn start_time(&self, segment_num: u64) -> Duration {
        match self.entries.get(segment_num as usize) {
            Some(entry) => entry.start,
            None => self.entries.last().map(|e| e.end).unwrap_or_default(),
        }
    }

    pub fn duration(&self, segment_num: u64) -> Option<Duration> {
        self.entries
            .get(segment_num as usize)
            .map(|e| e.end.saturating_sub(e.start))
    }

    pub fn segment_url(&self, segment_num: u64) -> Option<RangedUri> {
        self.entries
            .get(segment_num as usize)
            .map(|e| RangedUri::new(None, e.range))
    }
}
