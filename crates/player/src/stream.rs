//! Per content type load loop.
//!
//! ```text
//!            +---------------+   select    +---------------------+
//!  clock --> | buffered <= M | ----------> | Init / Index / Data | --> demuxer
//!            +---------------+             +---------------------+        |
//!                   | no                                                  v
//!                   v                                   forwarding task --> renderer
//!          sleep(buffered - M / 2)
//! ```

use std::{
    sync::{Arc, Mutex, RwLock},
    time::Duration,
};

use tokio::{
    sync::{broadcast, oneshot},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    buffer::segment_buffer,
    chunk::{Chunk, ChunkContext, RepresentationWrapper},
    dash::{mime::ContentType, AdaptationSet},
    download::Downloader,
    period::StreamGroup,
    pipeline::{Clock, Demuxer, Packet, PlaybackSegment, Renderer, StreamConfig},
    selector::StreamSelector,
    throughput::ThroughputHistory,
    DashError, DashResult,
};

pub const DEFAULT_MAX_BUFFER_TIME: Duration = Duration::from_secs(8);

/// Collaborators shared by every stream of one provider.
#[derive(Clone)]
pub struct StreamContext {
    pub downloader: Arc<dyn Downloader>,
    pub history: Arc<ThroughputHistory>,
    pub clock: Arc<dyn Clock>,
    pub max_buffer_time: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    StreamInfoChanged {
        group: StreamGroup,
        selected_index: usize,
        position: Duration,
    },
    Error(String),
}

#[derive(Default)]
struct LoadState {
    current: Option<usize>,
    buffer_position: Duration,
    previous_segment: Option<u64>,
    /// Logical offset of the next buffer pushed to the demuxer.
    demux_offset: u64,
    /// Something was pushed to the demuxer since its last reset.
    demuxer_dirty: bool,
    forward_task: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct ConfigState {
    config: Option<StreamConfig>,
    waiter: Option<oneshot::Sender<StreamConfig>>,
}

/// Latest stream config plus at most one pending waiter.
#[derive(Default)]
struct ConfigSlot {
    state: Mutex<ConfigState>,
}

impl ConfigSlot {
    fn publish(&self, config: StreamConfig) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(waiter) = state.waiter.take() {
            let _ = waiter.send(config.clone());
        }
        state.config = Some(config);
    }

    /// Registering a waiter drops the previous one, whose receiver then resolves as cancelled.
    fn register(&self) -> Result<StreamConfig, oneshot::Receiver<StreamConfig>> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(config) = &state.config {
            return Ok(config.clone());
        }
        let (sender, receiver) = oneshot::channel();
        state.waiter = Some(sender);
        Err(receiver)
    }
}

pub struct DashStream {
    group: StreamGroup,
    adaptation_set: Arc<AdaptationSet>,
    period_duration: Option<Duration>,
    wrappers: Vec<RepresentationWrapper>,

    context: StreamContext,
    demuxer: Arc<dyn Demuxer>,
    selector: RwLock<StreamSelector>,

    state: tokio::sync::Mutex<LoadState>,
    config: Arc<ConfigSlot>,
    events: broadcast::Sender<StreamEvent>,
}

impl DashStream {
    pub fn new(
        context: StreamContext,
        demuxer: Arc<dyn Demuxer>,
        group: StreamGroup,
        adaptation_set: Arc<AdaptationSet>,
        period_duration: Option<Duration>,
        selector: StreamSelector,
    ) -> Self {
        let wrappers = adaptation_set
            .representations
            .iter()
            .map(|r| RepresentationWrapper::new(r.clone(), period_duration))
            .collect();
        let (events, _) = broadcast::channel(16);
        Self {
            group,
            adaptation_set,
            period_duration,
            wrappers,
            context,
            demuxer,
            selector: RwLock::new(selector),
            state: Default::default(),
            config: Default::default(),
            events,
        }
    }

    pub fn stream_group(&self) -> &StreamGroup {
        &self.group
    }

    pub fn adaptation_set(&self) -> &Arc<AdaptationSet> {
        &self.adaptation_set
    }

    pub fn content_type(&self) -> ContentType {
        self.group.content_type
    }

    pub fn stream_selector(&self) -> StreamSelector {
        self.selector
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Takes effect on the next chunk selection.
    pub fn set_stream_selector(&self, selector: StreamSelector) {
        *self.selector.write().unwrap_or_else(|e| e.into_inner()) = selector;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.events.subscribe()
    }

    /// Resolves the index of the first representation unless some representation already
    /// has one, so the first stream config arrives sooner.
    pub async fn prepare(&self, cancel: &CancellationToken) -> DashResult<()> {
        if self.wrappers.iter().any(|w| w.index().is_some()) {
            return Ok(());
        }
        let Some(first) = self.wrappers.first() else {
            return Ok(());
        };
        first
            .resolve_index(&*self.context.downloader, &self.context.history, cancel)
            .await
    }

    /// Start time of the segment containing `position`, or `position` itself when no
    /// representation has a resolved index yet.
    pub fn adjusted_seek_position(&self, position: Duration) -> Duration {
        self.wrappers
            .iter()
            .find_map(|w| w.index())
            .map(|index| index.start_time(index.segment_num(position, self.period_duration)))
            .unwrap_or(position)
    }

    /// Stream config reported by the demuxer for the current representation.
    ///
    /// Can be awaited before loading started. A later call supersedes a pending one, which
    /// then fails with [`DashError::Cancelled`].
    pub async fn get_stream_config(
        &self,
        cancel: &CancellationToken,
    ) -> DashResult<StreamConfig> {
        let receiver = match self.config.register() {
            Ok(config) => return Ok(config),
            Err(receiver) => receiver,
        };
        tokio::select! {
            _ = cancel.cancelled() => Err(DashError::Cancelled),
            config = receiver => config.map_err(|_| DashError::Cancelled),
        }
    }

    /// Keeps the buffer filled ahead of playback until end of stream or cancellation.
    ///
    /// Cancellation is not an error. Any other failure is logged, broadcast as
    /// [`StreamEvent::Error`] and returned.
    pub async fn load_chunks(
        &self,
        segment: PlaybackSegment,
        renderer: Arc<dyn Renderer>,
        cancel: &CancellationToken,
    ) -> DashResult<()> {
        let mut state = self.state.lock().await;
        state.buffer_position = segment.start;
        state.previous_segment = None;
        state.current = None;

        let result = self
            .run_load_loop(&mut state, &segment, &renderer, cancel)
            .await;

        if let Some(task) = state.forward_task.take() {
            self.demuxer.complete();
            if let Err(e) = task.await {
                tracing::warn!("packet forwarding task failed: {e}");
            }
        }

        match result {
            Err(DashError::Cancelled) => {
                tracing::debug!(content_type = %self.content_type(), "load loop cancelled");
                Ok(())
            }
            Err(e) => {
                tracing::error!(content_type = %self.content_type(), "load loop failed: {e}");
                let _ = self.events.send(StreamEvent::Error(e.to_string()));
                Err(e)
            }
            Ok(()) => Ok(()),
        }
    }

    async fn run_load_loop(
        &self,
        state: &mut LoadState,
        segment: &PlaybackSegment,
        renderer: &Arc<dyn Renderer>,
        cancel: &CancellationToken,
    ) -> DashResult<()> {
        let max_buffer_time = self.context.max_buffer_time;
        loop {
            if cancel.is_cancelled() {
                return Err(DashError::Cancelled);
            }

            let playback = segment.to_playback_time(self.context.clock.elapsed());
            let buffered = state.buffer_position.saturating_sub(playback);
            tracing::debug!(
                content_type = %self.content_type(),
                position_ms = state.buffer_position.as_millis() as u64,
                playback_ms = playback.as_millis() as u64,
                buffered_ms = buffered.as_millis() as u64,
                "buffered = position - playback"
            );

            if buffered <= max_buffer_time {
                if !self.load_next_chunk(state, segment, renderer, cancel).await? {
                    return Ok(());
                }
                continue;
            }

            let delay = buffered - max_buffer_time / 2;
            tokio::select! {
                _ = cancel.cancelled() => return Err(DashError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Returns `false` once the end of stream was reached.
    async fn load_next_chunk(
        &self,
        state: &mut LoadState,
        segment: &PlaybackSegment,
        renderer: &Arc<dyn Renderer>,
        cancel: &CancellationToken,
    ) -> DashResult<bool> {
        let selected = self.stream_selector().select(&self.group);
        let wrapper = self.wrappers.get(selected).ok_or_else(|| {
            DashError::StreamSelectionError(format!(
                "Stream {selected} is out of range for {} streams",
                self.wrappers.len()
            ))
        })?;

        let switched = state.current != Some(selected);
        if switched {
            let format = &wrapper.representation().format;
            tracing::info!(
                content_type = %self.content_type(),
                representation = %format.id,
                bitrate = format.bitrate,
                "representation change"
            );
            self.drain_demuxer(state, cancel).await?;
            self.demuxer.reset();
            state.demux_offset = 0;
            state.current = Some(selected);

            if let Some(init_data) = wrapper.init_data() {
                let (writer, buffer) = segment_buffer(0);
                self.demuxer.push_chunk(buffer);
                for bytes in init_data {
                    writer.add(bytes);
                }
                writer.complete_adding();
                state.demux_offset = writer.len();
                state.demuxer_dirty = true;
                self.start_forwarding(state, segment, renderer, cancel);
            }
        }

        let previous = state.previous_segment;
        let position = state.buffer_position;
        let chunk = Chunk::next(wrapper, |index| match previous {
            Some(previous) => previous + 1,
            None => index.segment_num(position, self.period_duration),
        })?;
        let Some(chunk) = chunk else {
            self.end_of_stream(state, renderer, cancel).await?;
            return Ok(false);
        };

        if switched {
            let _ = self.events.send(StreamEvent::StreamInfoChanged {
                group: self.group.clone(),
                selected_index: selected,
                position,
            });
        }

        let context = ChunkContext {
            downloader: &*self.context.downloader,
            history: &self.context.history,
            demuxer: Some(&*self.demuxer),
            cancel,
        };
        if !matches!(chunk, Chunk::Index { .. }) {
            state.demuxer_dirty = true;
        }
        let result = chunk.load(wrapper, &context, state.demux_offset).await;
        if cancel.is_cancelled() {
            return Err(DashError::Cancelled);
        }
        match result {
            Ok(pushed) => {
                state.demux_offset += pushed;
                match chunk {
                    Chunk::Initialization { .. } => {
                        self.start_forwarding(state, segment, renderer, cancel);
                    }
                    Chunk::Index { .. } => {}
                    Chunk::Data { segment_num, .. } => {
                        state.previous_segment = Some(segment_num);
                        if let Some(index) = wrapper.index() {
                            state.buffer_position = index.start_time(segment_num)
                                + index
                                    .duration(segment_num, self.period_duration)
                                    .unwrap_or_default();
                        }
                    }
                }
                Ok(true)
            }
            Err(e) if e.is_chunk_load_error() => {
                let Chunk::Data { segment_num, .. } = chunk else {
                    return Err(e);
                };
                let follows_previous = previous.is_some_and(|p| p + 1 == segment_num);
                if follows_previous && wrapper.last_segment_num() == Some(segment_num) {
                    tracing::info!(
                        content_type = %self.content_type(),
                        segment = segment_num,
                        "last segment is unavailable, treating as end of stream: {e}"
                    );
                    self.end_of_stream(state, renderer, cancel).await?;
                    return Ok(false);
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Completes the demuxer and waits until every packet it produced reached the renderer.
    async fn drain_demuxer(
        &self,
        state: &mut LoadState,
        cancel: &CancellationToken,
    ) -> DashResult<()> {
        if !state.demuxer_dirty {
            return Ok(());
        }
        self.demuxer.complete();
        tokio::select! {
            _ = cancel.cancelled() => return Err(DashError::Cancelled),
            _ = self.demuxer.completion() => {}
        }
        if let Some(task) = state.forward_task.take() {
            if let Err(e) = task.await {
                tracing::warn!("packet forwarding task failed: {e}");
            }
        }
        state.demuxer_dirty = false;
        Ok(())
    }

    async fn end_of_stream(
        &self,
        state: &mut LoadState,
        renderer: &Arc<dyn Renderer>,
        cancel: &CancellationToken,
    ) -> DashResult<()> {
        self.drain_demuxer(state, cancel).await?;
        tracing::info!(content_type = %self.content_type(), "end of stream");
        renderer.handle_packet(Packet::Eos(self.content_type()));
        Ok(())
    }

    fn start_forwarding(
        &self,
        state: &mut LoadState,
        segment: &PlaybackSegment,
        renderer: &Arc<dyn Renderer>,
        cancel: &CancellationToken,
    ) {
        let forwarder = PacketForwarder {
            content_type: self.content_type(),
            min_pts: (self.content_type() == ContentType::Audio).then_some(segment.start),
            period_duration: self.period_duration,
            demuxer: self.demuxer.clone(),
            renderer: renderer.clone(),
            config: self.config.clone(),
            events: self.events.clone(),
        };
        state.forward_task = Some(tokio::spawn(forwarder.run(cancel.clone())));
    }
}

/// Moves packets from the demuxer to the renderer for one representation.
struct PacketForwarder {
    content_type: ContentType,
    min_pts: Option<Duration>,
    period_duration: Option<Duration>,
    demuxer: Arc<dyn Demuxer>,
    renderer: Arc<dyn Renderer>,
    config: Arc<ConfigSlot>,
    events: broadcast::Sender<StreamEvent>,
}

impl PacketForwarder {
    async fn run(self, cancel: CancellationToken) {
        if let Err(e) = self.forward(&cancel).await {
            if !e.is_cancelled() {
                tracing::error!(content_type = %self.content_type, "demuxer failed: {e}");
                let _ = self.events.send(StreamEvent::Error(e.to_string()));
            }
        }
    }

    async fn forward(&self, cancel: &CancellationToken) -> DashResult<()> {
        let clip = self.demuxer.init_for_es(cancel).await?;
        for drm_init_data in clip.drm_init_data {
            self.renderer.handle_drm_init_data(drm_init_data);
        }
        if let Some(config) = clip.stream_config {
            self.config.publish(config);
        }

        while let Some(packet) = self.demuxer.next_packet(self.min_pts, cancel).await? {
            if self.period_duration.is_some_and(|d| packet.pts > d) {
                tracing::trace!(pts = ?packet.pts, "dropping packet past the period end");
                continue;
            }
            self.renderer.handle_packet(Packet::Media(packet));
        }
        Ok(())
    }
}
