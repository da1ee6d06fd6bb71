use std::{sync::Arc, time::Duration};

use crate::{
    dash::{MultiSegmentBase, RangedUri, Representation, SegmentBase},
    util::{duration_to_ticks, ticks_to_duration},
    ByteRange,
};

static SINGLE_BASE: MultiSegmentBase = MultiSegmentBase {
    initialization: None,
    timescale: 1,
    presentation_time_offset: 0,
    start_number: 1,
    duration: None,
    timeline: None,
};

/// Index of a `SegmentList` or `SegmentTemplate` representation.
#[derive(Debug, Clone)]
pub struct FormulaIndex {
    representation: Arc<Representation>,
}

impl FormulaIndex {
    pub fn new(representation: Arc<Representation>) -> Self {
        Self { representation }
    }

    fn multi(&self) -> &MultiSegmentBase {
        match &self.representation.segment_base {
            SegmentBase::List { multi, .. } | SegmentBase::Template { multi, .. } => multi,
            SegmentBase::Single { .. } => &SINGLE_BASE,
        }
    }

    pub fn first_segment_num(&self) -> u64 {
        self.multi().start_number
    }

    pub fn segment_count(&self, period_duration: Option<Duration>) -> Option<u64> {
        match &self.representation.segment_base {
            SegmentBase::Single { .. } => Some(0),
            SegmentBase::List { media_segments, .. } => Some(media_segments.len() as u64),
            SegmentBase::Template {
                multi, end_number, ..
            } => {
                if let Some(timeline) = &multi.timeline {
                    return Some(timeline.len() as u64);
                }
                if let Some(end_number) = end_number {
                    return Some((end_number + 1).saturating_sub(multi.start_number));
                }
                match (multi.duration, period_duration) {
                    (Some(duration), Some(period_duration)) if duration > 0 => {
                        let period = period_duration.as_nanos() * multi.timescale.max(1) as u128;
                        let segment = duration as u128 * 1_000_000_000;
                        Some(period.div_ceil(segment) as u64)
                    }
                    _ => None,
                }
            }
        }
    }

    pub fn segment_num(&self, time: Duration, period_duration: Option<Duration>) -> u64 {
        let multi = self.multi();
        let first = multi.start_number;
        let count = self.segment_count(period_duration);
        if count == Some(0) {
            return first;
        }

        let segment_num = match &multi.timeline {
            Some(timeline) => {
                let ticks = duration_to_ticks(time, multi.timescale) + multi.presentation_time_offset;
                let position = timeline.partition_point(|e| e.start_time <= ticks);
                first + position.saturating_sub(1) as u64
            }
            None => match multi.duration {
                Some(duration) if duration > 0 => first + duration_to_ticks(time, multi.timescale) / duration,
                _ => first,
            },
        };

        match count {
            Some(count) => segment_num.min(first + count - 1),
            None => segment_num,
        }
    }

    pub fn start_time(&self, segment_num: u64) -> Duration {
        let multi = self.multi();
        let index = segment_num.saturating_sub(multi.start_number);
        match &multi.timeline {
            Some(timeline) => {
                let ticks = match timeline.get(index as usize) {
                    Some(element) => element.start_time,
                    None => timeline
                        .last()
                        .map(|last| last.start_time + last.duration)
                        .unwrap_or_default(),
                };
                ticks_to_duration(
                    ticks.saturating_sub(multi.presentation_time_offset),
                    multi.timescale,
                )
            }
            None => ticks_to_duration(index * multi.duration.unwrap_or(0), multi.timescale),
        }
    }

    pub fn duration(&self, segment_num: u64, period_duration: Option<Duration>) -> Option<Duration> {
        let multi = self.multi();
        let index = segment_num.checked_sub(multi.start_number)?;
        if let Some(timeline) = &multi.timeline {
            return timeline
                .get(index as usize)
                .map(|e| ticks_to_duration(e.duration, multi.timescale));
        }

        let duration = ticks_to_duration(multi.duration?, multi.timescale);
        // the last segment ends with the period
        if let (Some(count), Some(period_duration)) =
            (self.segment_count(period_duration), period_duration)
        {
            if count > 0 && index == count - 1 {
                return Some(period_duration.saturating_sub(self.start_time(segment_num)));
            }
        }
        Some(duration)
    }

    pub fn segment_url(&self, segment_num: u64) -> Option<RangedUri> {
        let index = segment_num.checked_sub(self.first_segment_num())?;
        match &self.representation.segment_base {
            SegmentBase::Single { .. } => None,
            SegmentBase::List { media_segments, .. } => media_segments.get(index as usize).cloned(),
            SegmentBase::Template {
                multi,
                media_template,
                ..
            } => {
                let time = match &multi.timeline {
                    Some(timeline) => timeline.get(index as usize)?.start_time,
                    None => index * multi.duration.unwrap_or(0),
                };
                let format = &self.representation.format;
                let url = media_template.as_ref()?.resolve_media(
                    &format.id,
                    format.bitrate,
                    segment_num,
                    time,
                );
                Some(RangedUri::new(Some(url), ByteRange::default()))
            }
        }
    }
}
