//! In-memory model of a parsed MPD.
//!
//! Everything here is immutable once built by the parser. A manifest refresh produces a
//! whole new [`Manifest`].

use std::{ops::BitOr, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use url::Url;

use crate::{
    dash::{merge_baseurls, mime::ContentType, template::UrlTemplate},
    index::SegmentIndex,
    ByteRange, DashResult,
};

#[derive(Debug, Clone)]
pub struct Manifest {
    /// `MPD@mediaPresentationDuration`, or the end of the last period when absent.
    pub duration: Option<Duration>,
    pub availability_start_time: Option<DateTime<Utc>>,
    pub publish_time: Option<DateTime<Utc>>,
    pub min_buffer_time: Option<Duration>,
    pub time_shift_buffer_depth: Option<Duration>,
    pub suggested_presentation_delay: Option<Duration>,
    pub minimum_update_period: Option<Duration>,
    pub program_information: Option<ProgramInformation>,
    pub utc_timing: Option<UtcTiming>,
    pub periods: Vec<Arc<Period>>,
    pub dynamic: bool,
    /// `MPD.Location`, where later refreshes should be fetched from.
    pub location: Option<Url>,
}

impl Manifest {
    /// Duration of the period at `index`: up to the next period start, or up to the end of
    /// the presentation for the last one.
    pub fn period_duration(&self, index: usize) -> Option<Duration> {
        let start = self.periods.get(index)?.start?;
        let end = match self.periods.get(index + 1) {
            Some(next) => next.start?,
            None => self.duration?,
        };
        Some(end.saturating_sub(start))
    }

    pub fn period_index(&self, period: &Arc<Period>) -> Option<usize> {
        self.periods.iter().position(|p| Arc::ptr_eq(p, period))
    }
}

#[derive(Debug, Clone)]
pub struct Period {
    pub id: Option<String>,
    /// Always resolved for periods that made it into a [`Manifest`].
    pub start: Option<Duration>,
    pub duration: Option<Duration>,
    pub adaptation_sets: Vec<Arc<AdaptationSet>>,
    pub asset_identifier: Option<Descriptor>,
}

#[derive(Debug, Clone)]
pub struct AdaptationSet {
    pub id: Option<u64>,
    pub content_type: ContentType,
    pub representations: Vec<Arc<Representation>>,
    pub accessibility_descriptors: Vec<Descriptor>,
    pub supplemental_properties: Vec<Descriptor>,
    pub role_descriptors: Vec<Descriptor>,
}

#[derive(Debug, Clone)]
pub struct Representation {
    pub format: Format,
    pub base_url: Url,
    pub segment_base: SegmentBase,
    pub inband_event_streams: Vec<Descriptor>,
    pub content_protections: Vec<ContentProtection>,
    pub drm_scheme_type: Option<String>,
}

impl Representation {
    /// Location of the initialization segment, if the representation has one.
    pub fn initialization_uri(&self) -> Option<RangedUri> {
        match &self.segment_base {
            SegmentBase::Single { initialization, .. } => initialization.clone(),
            SegmentBase::List { multi, .. } => multi.initialization.clone(),
            SegmentBase::Template {
                multi,
                initialization_template,
                ..
            } => match initialization_template {
                Some(template) => Some(RangedUri::new(
                    Some(template.resolve_initialization(&self.format.id, self.format.bitrate)),
                    ByteRange::default(),
                )),
                None => multi.initialization.clone(),
            },
        }
    }

    /// Location of the segment index box. Only single segment representations carry one.
    pub fn index_uri(&self) -> Option<RangedUri> {
        match &self.segment_base {
            SegmentBase::Single {
                index_range: Some(range),
                ..
            } if range.length.unwrap_or(0) > 0 => Some(RangedUri::new(None, *range)),
            _ => None,
        }
    }

    /// The segment index that is available without downloading anything.
    ///
    /// Returns `None` when the index has to be loaded from [`Representation::index_uri`].
    pub fn index(self: &Arc<Self>) -> Option<SegmentIndex> {
        match &self.segment_base {
            SegmentBase::Single { .. } if self.index_uri().is_some() => None,
            SegmentBase::Single { .. } => Some(SegmentIndex::single()),
            SegmentBase::List { .. } | SegmentBase::Template { .. } => {
                Some(SegmentIndex::formula(self.clone()))
            }
        }
    }

    pub fn presentation_time_offset(&self) -> Duration {
        let (timescale, pto) = match &self.segment_base {
            SegmentBase::Single {
                timescale,
                presentation_time_offset,
                ..
            } => (*timescale, *presentation_time_offset),
            SegmentBase::List { multi, .. } | SegmentBase::Template { multi, .. } => {
                (multi.timescale, multi.presentation_time_offset)
            }
        };
        crate::util::ticks_to_duration(pto, timescale)
    }
}

/// A URL (relative to the representation base URL) plus a byte range inside it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RangedUri {
    pub url: Option<String>,
    pub range: ByteRange,
}

impl RangedUri {
    pub fn new(url: Option<String>, range: ByteRange) -> Self {
        Self { url, range }
    }

    pub fn resolve(&self, base_url: &Url) -> DashResult<Url> {
        match self.url.as_deref() {
            Some(url) if !url.is_empty() => merge_baseurls(base_url, url),
            _ => Ok(base_url.clone()),
        }
    }
}

/// How the segments of a representation are addressed.
#[derive(Debug, Clone)]
pub enum SegmentBase {
    /// One media file, optionally indexed by a `sidx` box at `index_range`.
    Single {
        initialization: Option<RangedUri>,
        timescale: u64,
        presentation_time_offset: u64,
        index_range: Option<ByteRange>,
    },
    /// Explicit `SegmentURL` list.
    List {
        multi: MultiSegmentBase,
        media_segments: Vec<RangedUri>,
    },
    /// `SegmentTemplate` with either a fixed duration or a timeline.
    Template {
        multi: MultiSegmentBase,
        initialization_template: Option<UrlTemplate>,
        media_template: Option<UrlTemplate>,
        end_number: Option<u64>,
    },
}

impl Default for SegmentBase {
    fn default() -> Self {
        Self::Single {
            initialization: None,
            timescale: 1,
            presentation_time_offset: 0,
            index_range: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MultiSegmentBase {
    pub initialization: Option<RangedUri>,
    pub timescale: u64,
    pub presentation_time_offset: u64,
    pub start_number: u64,
    /// Fixed segment duration in timescale units.
    pub duration: Option<u64>,
    pub timeline: Option<Vec<TimelineElement>>,
}

impl Default for MultiSegmentBase {
    fn default() -> Self {
        Self {
            initialization: None,
            timescale: 1,
            presentation_time_offset: 0,
            start_number: 1,
            duration: None,
            timeline: None,
        }
    }
}

/// One expanded `S` entry, in timescale units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineElement {
    pub start_time: u64,
    pub duration: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Format {
    pub id: String,
    pub label: Option<String>,
    pub selection_flags: SelectionFlags,
    pub role_flags: RoleFlags,
    pub bitrate: Option<u64>,
    pub codecs: Option<String>,
    pub container_mime_type: Option<String>,
    pub sample_mime_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f32>,
    pub channel_count: Option<u32>,
    pub sample_rate: Option<u32>,
    pub language: Option<String>,
    pub accessibility_channel: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionFlags {
    #[default]
    Unknown,
    /// Role `main`.
    Default,
}

/// Track role bitset, filled from `Role` and `Accessibility` descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RoleFlags(u32);

impl RoleFlags {
    pub const NONE: Self = Self(0);
    pub const MAIN: Self = Self(1);
    pub const ALTERNATE: Self = Self(1 << 1);
    pub const SUPPLEMENTARY: Self = Self(1 << 2);
    pub const COMMENTARY: Self = Self(1 << 3);
    pub const DUB: Self = Self(1 << 4);
    pub const EMERGENCY: Self = Self(1 << 5);
    pub const CAPTION: Self = Self(1 << 6);
    pub const SUBTITLE: Self = Self(1 << 7);
    pub const SIGN: Self = Self(1 << 8);
    pub const DESCRIBES_VIDEO: Self = Self(1 << 9);
    pub const ENHANCED_DIALOG_INTELLIGIBILITY: Self = Self(1 << 10);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for RoleFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for RoleFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// A generic `(schemeIdUri, value, id)` descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Descriptor {
    pub scheme_id_uri: String,
    pub value: Option<String>,
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgramInformation {
    pub title: Option<String>,
    pub source: Option<String>,
    pub copyright: Option<String>,
    pub lang: Option<String>,
    pub more_information_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtcTiming {
    pub scheme_id_uri: String,
    pub value: String,
}

/// `ContentProtection` element. Parsed for inspection only, no DRM handling happens here.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContentProtection {
    pub scheme_id_uri: String,
    pub value: Option<String>,
    pub default_kid: Option<String>,
    /// Base64 `cenc:pssh` payload.
    pub pssh: Option<String>,
}
