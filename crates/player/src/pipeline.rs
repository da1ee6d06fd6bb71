//! Collaborators at the edge of the engine.
//!
//! The engine never looks at codec bytes. It pushes [`SegmentBuffer`]s into a [`Demuxer`],
//! forwards the packets it produces to a [`Renderer`], and paces downloads against a
//! [`Clock`].

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{buffer::SegmentBuffer, dash::mime::ContentType, DashResult};

/// Decoder configuration of one elementary stream, as found by the demuxer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamConfig {
    pub content_type: ContentType,
    pub codec: Option<String>,
    pub extra_data: Bytes,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub channel_count: Option<u32>,
    pub sample_rate: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrmInitData {
    pub content_type: ContentType,
    pub scheme_id: String,
    pub data: Bytes,
}

/// Result of parsing an initialization segment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClipConfiguration {
    pub stream_config: Option<StreamConfig>,
    pub drm_init_data: Vec<DrmInitData>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPacket {
    pub content_type: ContentType,
    pub pts: Duration,
    pub dts: Duration,
    pub duration: Option<Duration>,
    pub is_key_frame: bool,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Media(MediaPacket),
    /// No more packets will follow for this stream type.
    Eos(ContentType),
}

/// Turns pushed byte buffers into timed packets.
///
/// Buffers arrive in order. The logical offsets of consecutive buffers are contiguous
/// until [`Demuxer::reset`].
#[async_trait]
pub trait Demuxer: Send + Sync {
    fn push_chunk(&self, buffer: SegmentBuffer);

    /// Parses the initialization data pushed since the last reset.
    async fn init_for_es(&self, cancel: &CancellationToken) -> DashResult<ClipConfiguration>;

    /// Next packet with a pts of at least `min_pts`. `None` once the demuxer is completed
    /// and drained.
    async fn next_packet(
        &self,
        min_pts: Option<Duration>,
        cancel: &CancellationToken,
    ) -> DashResult<Option<MediaPacket>>;

    /// No more buffers will be pushed until the next reset.
    fn complete(&self);

    /// Resolves when every buffer pushed before [`Demuxer::complete`] was consumed.
    async fn completion(&self);

    fn reset(&self);

    fn is_initialized(&self) -> bool;
}

pub trait Renderer: Send + Sync {
    fn handle_packet(&self, packet: Packet);

    fn handle_drm_init_data(&self, data: DrmInitData);
}

pub trait Clock: Send + Sync {
    /// Monotonic time since playback started.
    fn elapsed(&self) -> Duration;
}

/// [`Clock`] counting from its creation.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    started: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Maps clock time onto the presentation timeline.
///
/// Clock time `base` corresponds to presentation time `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackSegment {
    pub base: Duration,
    pub start: Duration,
    pub stop: Option<Duration>,
}

impl PlaybackSegment {
    pub fn new(base: Duration, start: Duration) -> Self {
        Self {
            base,
            start,
            stop: None,
        }
    }

    pub fn to_playback_time(&self, clock: Duration) -> Duration {
        clock.saturating_sub(self.base) + self.start
    }
}
