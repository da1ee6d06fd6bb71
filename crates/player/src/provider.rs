//! Entry point of the engine: owns the manifest, the period list and the created streams.

use std::{
    sync::{Arc, RwLock},
    time::Duration,
};

use crate::{
    config::PlayerConfig,
    dash::{loader::ManifestLoader, mime::ContentType, Manifest},
    download::Downloader,
    period::{ClientPeriod, DashPeriod, StreamGroup, Timeline},
    pipeline::{Clock, Demuxer},
    selector::StreamSelector,
    stream::{DashStream, StreamContext},
    throughput::ThroughputHistory,
    DashError, DashResult,
};

pub type DemuxerFactory = Arc<dyn Fn() -> Arc<dyn Demuxer> + Send + Sync>;

#[derive(Default)]
struct ProviderState {
    manifest: Option<Arc<Manifest>>,
    periods: Vec<Arc<DashPeriod>>,
    /// Id handed to the next appended period. Only ever grows, so ids are never reused.
    next_period_id: usize,
    streams: Vec<Arc<DashStream>>,
}

pub struct DashStreamProvider {
    loader: tokio::sync::Mutex<ManifestLoader>,
    context: StreamContext,
    demuxer_factory: DemuxerFactory,
    config: PlayerConfig,
    state: RwLock<ProviderState>,
}

impl DashStreamProvider {
    pub fn new(
        loader: ManifestLoader,
        downloader: Arc<dyn Downloader>,
        clock: Arc<dyn Clock>,
        demuxer_factory: DemuxerFactory,
        config: PlayerConfig,
    ) -> Self {
        let context = StreamContext {
            downloader,
            history: Arc::new(ThroughputHistory::new()),
            clock,
            max_buffer_time: config.max_buffer_time,
        };
        Self {
            loader: tokio::sync::Mutex::new(loader),
            context,
            demuxer_factory,
            config,
            state: Default::default(),
        }
    }

    /// Shared by every stream created here.
    pub fn throughput_history(&self) -> &Arc<ThroughputHistory> {
        &self.context.history
    }

    /// Loads (or reloads) the manifest and returns the resulting timeline.
    pub async fn prepare(&self) -> DashResult<Timeline> {
        let manifest = self.loader.lock().await.load().await?;
        Ok(self.update_manifest(manifest))
    }

    /// Reconciles the period list with `manifest` and makes it current.
    ///
    /// Periods starting before the first period of `manifest` rolled off and are dropped.
    /// Surviving periods keep their [`DashPeriod`] instance and id.
    pub fn update_manifest(&self, manifest: Manifest) -> Timeline {
        let mut state = self.write_state();
        let manifest = Arc::new(manifest);

        let removed = match (&state.manifest, manifest.periods.first()) {
            (Some(previous), Some(first)) => previous
                .periods
                .iter()
                .take(state.periods.len())
                .take_while(|p| p.start < first.start)
                .count(),
            _ => 0,
        };
        if removed > 0 {
            tracing::info!(removed, "periods rolled off");
            state.periods.drain(..removed);
        }

        for (index, period) in manifest.periods.iter().enumerate() {
            if index < state.periods.len() {
                state.periods[index].update(period.clone());
            } else {
                let id = state.next_period_id;
                state.next_period_id += 1;
                state
                    .periods
                    .push(Arc::new(DashPeriod::new(id, period.clone())));
            }
        }
        state.periods.truncate(manifest.periods.len());
        state.manifest = Some(manifest.clone());

        let periods = state
            .periods
            .iter()
            .enumerate()
            .map(|(index, period)| ClientPeriod {
                id: period.id(),
                start: period.period().start,
                duration: manifest.period_duration(index),
            })
            .collect();
        Timeline {
            periods,
            dynamic: manifest.dynamic,
        }
    }

    pub fn manifest(&self) -> Option<Arc<Manifest>> {
        self.read_state().manifest.clone()
    }

    pub fn get_duration(&self) -> Option<Duration> {
        self.read_state().manifest.as_ref()?.duration
    }

    pub fn dash_period(&self, period_id: usize) -> DashResult<Arc<DashPeriod>> {
        self.read_state()
            .periods
            .iter()
            .find(|p| p.id() == period_id)
            .cloned()
            .ok_or(DashError::InvalidPeriod(period_id))
    }

    pub fn get_stream_groups(&self, period: &ClientPeriod) -> DashResult<Vec<StreamGroup>> {
        Ok(self.dash_period(period.id)?.stream_groups())
    }

    pub fn create_stream(
        &self,
        period: &ClientPeriod,
        group: &StreamGroup,
        selector: Option<StreamSelector>,
    ) -> DashResult<Arc<DashStream>> {
        let dash_period = self.dash_period(period.id)?;
        let adaptation_set = dash_period.adaptation_set(group)?;
        let selector = self.fixup_selector(selector, group)?;

        let period_duration = self.manifest().and_then(|manifest| {
            let index = manifest.period_index(&dash_period.period())?;
            manifest.period_duration(index)
        });

        tracing::debug!(
            period = period.id,
            content_type = %group.content_type,
            streams = group.streams.len(),
            "creating stream"
        );
        let stream = Arc::new(DashStream::new(
            self.context.clone(),
            (self.demuxer_factory)(),
            group.clone(),
            adaptation_set,
            period_duration,
            selector,
        ));
        self.write_state().streams.push(stream.clone());
        Ok(stream)
    }

    pub fn update_stream(
        &self,
        stream: &DashStream,
        selector: Option<StreamSelector>,
    ) -> DashResult<()> {
        let selector = self.fixup_selector(selector, stream.stream_group())?;
        stream.set_stream_selector(selector);
        Ok(())
    }

    pub fn release_stream(&self, stream: &Arc<DashStream>) {
        self.write_state()
            .streams
            .retain(|s| !Arc::ptr_eq(s, stream));
    }

    pub fn streams(&self) -> Vec<Arc<DashStream>> {
        self.read_state().streams.clone()
    }

    fn throughput_selector(&self) -> StreamSelector {
        StreamSelector::Throughput {
            history: self.context.history.clone(),
            safety_factor: self.config.throughput_safety_factor,
        }
    }

    /// Fills in a default selector for `group` and rejects combinations the renderer
    /// cannot play.
    fn fixup_selector(
        &self,
        selector: Option<StreamSelector>,
        group: &StreamGroup,
    ) -> DashResult<StreamSelector> {
        match group.content_type {
            ContentType::Video => Ok(selector.unwrap_or_else(|| self.throughput_selector())),
            ContentType::Audio => {
                let seamless = self.config.supports_seamless_audio_change;
                match selector {
                    Some(selector) if selector.is_throughput() && !seamless => {
                        Err(DashError::StreamSelectionError(
                            "throughput selection for audio needs seamless audio switching"
                                .to_string(),
                        ))
                    }
                    Some(selector) => Ok(selector),
                    None if seamless => Ok(self.throughput_selector()),
                    None => Ok(StreamSelector::fixed(group.streams.len().saturating_sub(1))),
                }
            }
            content_type => Err(DashError::StreamSelectionError(format!(
                "{content_type} is not supported"
            ))),
        }
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, ProviderState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, ProviderState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}
