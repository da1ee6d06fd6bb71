//! The three kinds of download a representation needs, in the order they are needed:
//! initialization, segment index, then media data.

use std::{
    sync::{Arc, Mutex, RwLock},
    time::Duration,
};

use bytes::Bytes;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    buffer::segment_buffer,
    dash::{RangedUri, Representation},
    download::Downloader,
    index::{ChunkIndex, SegmentIndex},
    pipeline::Demuxer,
    throughput::ThroughputHistory,
    DashError, DashResult,
};

/// Per stream state of one representation.
#[derive(Debug)]
pub struct RepresentationWrapper {
    representation: Arc<Representation>,
    period_duration: Option<Duration>,
    index: RwLock<Option<SegmentIndex>>,
    init_data: Mutex<Option<Vec<Bytes>>>,
}

impl RepresentationWrapper {
    pub fn new(representation: Arc<Representation>, period_duration: Option<Duration>) -> Self {
        Self {
            index: RwLock::new(representation.index()),
            representation,
            period_duration,
            init_data: Mutex::new(None),
        }
    }

    pub fn representation(&self) -> &Arc<Representation> {
        &self.representation
    }

    pub fn index(&self) -> Option<SegmentIndex> {
        self.index.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_index(&self, index: SegmentIndex) {
        *self.index.write().unwrap_or_else(|e| e.into_inner()) = Some(index);
    }

    pub fn init_data(&self) -> Option<Vec<Bytes>> {
        self.init_data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_init_data(&self, init_data: Option<Vec<Bytes>>) {
        *self.init_data.lock().unwrap_or_else(|e| e.into_inner()) = init_data;
    }

    /// Number of the last segment, `None` when the index is unbounded or not resolved.
    pub fn last_segment_num(&self) -> Option<u64> {
        self.index()?.last_segment_num(self.period_duration)
    }

    /// Downloads and installs the `sidx` based index.
    pub async fn resolve_index(
        &self,
        downloader: &dyn Downloader,
        history: &ThroughputHistory,
        cancel: &CancellationToken,
    ) -> DashResult<()> {
        let Some(uri) = self.representation.index_uri() else {
            return Ok(());
        };
        let chunk = Chunk::Index { uri };
        let context = ChunkContext {
            downloader,
            history,
            demuxer: None,
            cancel,
        };
        chunk.load(self, &context, 0).await.map(|_| ())
    }
}

/// Everything a chunk load talks to.
pub struct ChunkContext<'a> {
    pub downloader: &'a dyn Downloader,
    pub history: &'a ThroughputHistory,
    /// Absent when only an index is resolved ahead of playback.
    pub demuxer: Option<&'a dyn Demuxer>,
    pub cancel: &'a CancellationToken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Initialization { uri: Option<RangedUri> },
    Index { uri: RangedUri },
    Data { segment_num: u64, uri: RangedUri },
}

impl Chunk {
    /// What `wrapper` needs next. `None` once `segment_num` is past the last segment.
    pub fn next(
        wrapper: &RepresentationWrapper,
        segment_num: impl FnOnce(&SegmentIndex) -> u64,
    ) -> DashResult<Option<Self>> {
        let representation = wrapper.representation();
        if wrapper.init_data().is_none() {
            return Ok(Some(Self::Initialization {
                uri: representation.initialization_uri(),
            }));
        }

        let Some(index) = wrapper.index() else {
            let uri = representation.index_uri().ok_or_else(|| {
                DashError::IndexParseError(format!(
                    "Representation {} has neither a segment index nor an index range",
                    representation.format.id
                ))
            })?;
            return Ok(Some(Self::Index { uri }));
        };

        let segment_num = segment_num(&index);
        if let Some(last) = wrapper.last_segment_num() {
            if segment_num > last {
                return Ok(None);
            }
        }
        let uri = index.segment_url(segment_num).ok_or_else(|| {
            DashError::IndexParseError(format!("Segment {segment_num} has no URL"))
        })?;
        Ok(Some(Self::Data { segment_num, uri }))
    }

    /// Loads the chunk and returns how many bytes were pushed to the demuxer.
    pub async fn load(
        &self,
        wrapper: &RepresentationWrapper,
        context: &ChunkContext<'_>,
        demux_offset: u64,
    ) -> DashResult<u64> {
        match self {
            Self::Initialization { uri } => {
                Self::load_initialization(uri.as_ref(), wrapper, context, demux_offset).await
            }
            Self::Index { uri } => {
                Self::load_index(uri, wrapper, context).await?;
                Ok(0)
            }
            Self::Data { segment_num, uri } => {
                Self::load_data(*segment_num, uri, wrapper, context, demux_offset).await
            }
        }
    }

    async fn load_initialization(
        uri: Option<&RangedUri>,
        wrapper: &RepresentationWrapper,
        context: &ChunkContext<'_>,
        demux_offset: u64,
    ) -> DashResult<u64> {
        let (writer, buffer) = segment_buffer(demux_offset);
        if let Some(demuxer) = context.demuxer {
            demuxer.push_chunk(buffer);
        }

        let Some(uri) = uri else {
            // nothing to initialize from, media segments are self-contained
            wrapper.set_init_data(Some(Vec::new()));
            return Ok(0);
        };

        let url = uri.resolve(&wrapper.representation().base_url)?;
        tracing::info!(
            url = %url,
            start = uri.range.offset,
            length = uri.range.length,
            "initialization chunk load starts"
        );
        let started = Instant::now();

        let mut collected = Vec::new();
        let result = context
            .downloader
            .download(
                &url,
                uri.range,
                &mut |bytes: Bytes| {
                    collected.push(bytes.clone());
                    writer.add(bytes);
                },
                context.history,
                context.cancel,
            )
            .await;
        writer.complete_adding();

        match result {
            Ok(()) => {
                let received = writer.len();
                wrapper.set_init_data(Some(collected));
                tracing::info!(
                    url = %url,
                    bytes = received,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "initialization chunk load ends"
                );
                Ok(received)
            }
            Err(e) => {
                // a retry must start from scratch
                wrapper.set_init_data(None);
                Err(e)
            }
        }
    }

    async fn load_index(
        uri: &RangedUri,
        wrapper: &RepresentationWrapper,
        context: &ChunkContext<'_>,
    ) -> DashResult<()> {
        let representation = wrapper.representation();
        let url = uri.resolve(&representation.base_url)?;
        tracing::info!(
            url = %url,
            start = uri.range.offset,
            length = uri.range.length,
            "index chunk load starts"
        );

        let data = context
            .downloader
            .download_bytes(&url, uri.range, context.history, context.cancel)
            .await?;
        let index = ChunkIndex::parse(
            &data,
            uri.range,
            representation.presentation_time_offset(),
        )?;
        tracing::info!(url = %url, segments = index.len(), "index chunk load ends");

        wrapper.set_index(SegmentIndex::chunk(index));
        Ok(())
    }

    async fn load_data(
        segment_num: u64,
        uri: &RangedUri,
        wrapper: &RepresentationWrapper,
        context: &ChunkContext<'_>,
        demux_offset: u64,
    ) -> DashResult<u64> {
        let url = uri.resolve(&wrapper.representation().base_url)?;
        tracing::info!(
            url = %url,
            segment = segment_num,
            start = uri.range.offset,
            length = uri.range.length,
            "data chunk load starts"
        );

        let (writer, buffer) = segment_buffer(demux_offset);
        if let Some(demuxer) = context.demuxer {
            demuxer.push_chunk(buffer);
        }
        let result = context
            .downloader
            .download(
                &url,
                uri.range,
                &mut |bytes: Bytes| writer.add(bytes),
                context.history,
                context.cancel,
            )
            .await;
        writer.complete_adding();
        result?;

        tracing::info!(
            url = %url,
            segment = segment_num,
            bytes = writer.len(),
            "data chunk load ends"
        );
        Ok(writer.len())
    }
}
