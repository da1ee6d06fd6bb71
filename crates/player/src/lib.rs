pub mod buffer;
pub(crate) mod chunk;
pub mod config;
pub mod dash;
pub mod download;
pub mod error;
pub mod index;
pub mod period;
pub mod pipeline;
pub mod provider;
pub mod selector;
pub mod stream;
pub mod throughput;
pub mod util;

pub use config::PlayerConfig;
pub use error::{DashError, DashResult};
pub use provider::DashStreamProvider;
pub use stream::DashStream;
pub use util::{http::HttpClient, range::ByteRange};

/// ┌───────────────────────┐   prepare   ┌────────────────────┐
/// │                       ├─────────────►                    │
/// │     MPD (refresh)     │             │ DashStreamProvider │
/// │                       │  Timeline   │                    │
/// └───────────────────────┘◄────────────┤  [DashPeriod ...]  │
///                                       └─────────┬──────────┘
///                                                 │ create_stream
///            ┌────────────────────────────────────┼───────────────────────────┐
///            │                                    │                           │
/// ┌──────────▼──────────┐           ┌─────────────▼───────┐       ┌───────────▼─────────┐
/// │  DashStream(video)  │           │  DashStream(audio)  │       │         ...         │
/// │                     │           │                     │       │                     │
/// │ Init ► Index ► Data │           │ Init ► Index ► Data │       │                     │
/// └──────────┬──────────┘           └──────────┬──────────┘       └─────────────────────┘
///            │ SegmentBuffer                   │ SegmentBuffer
/// ┌──────────▼──────────┐           ┌──────────▼──────────┐
/// │       Demuxer       │           │       Demuxer       │
/// └──────────┬──────────┘           └──────────┬──────────┘
///            │ Packet                          │ Packet
/// ┌──────────▼─────────────────────────────────▼──────────┐
/// │                       Renderer                        │
/// └───────────────────────────────────────────────────────┘
pub mod prelude {
    pub use crate::{
        dash::{loader::ManifestLoader, mime::ContentType, Manifest},
        download::{Downloader, HttpDownloader},
        period::{ClientPeriod, StreamGroup, StreamInfo, Timeline},
        pipeline::{
            ClipConfiguration, Clock, Demuxer, DrmInitData, MediaPacket, MonotonicClock, Packet,
            PlaybackSegment, Renderer, StreamConfig,
        },
        selector::StreamSelector,
        stream::{StreamContext, StreamEvent},
        throughput::ThroughputHistory,
        ByteRange, DashError, DashResult, DashStream, DashStreamProvider, HttpClient,
        PlayerConfig,
    };
}
