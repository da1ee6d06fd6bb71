//! Recording collaborators for driving streams without a network or a real demuxer.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use iori_player::{
    buffer::SegmentBuffer,
    dash::loader::ManifestLoader,
    prelude::*,
    provider::DemuxerFactory,
};
use reqwest::StatusCode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

pub const BASE_URL: &str = "http://cdn.test/vod/manifest.mpd";

/// One video adaptation set, 2.5 s segments, two representations.
pub fn video_manifest(duration: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" type="static" mediaPresentationDuration="{duration}" minBufferTime="PT2S">
  <Period id="p0" start="PT0S">
    <AdaptationSet mimeType="video/mp4" contentType="video">
      <SegmentTemplate timescale="10" duration="25" startNumber="1"
          initialization="$RepresentationID$/init.mp4" media="$RepresentationID$/$Number$.m4s"/>
      <Representation id="low" bandwidth="500000" codecs="avc1.4d401f" width="640" height="360"/>
      <Representation id="high" bandwidth="2000000" codecs="avc1.640028" width="1920" height="1080"/>
    </AdaptationSet>
  </Period>
</MPD>"#
    )
}

pub fn parse_manifest(xml: &str) -> Manifest {
    Manifest::parse(xml.as_bytes(), &Url::parse(BASE_URL).unwrap()).unwrap()
}

/// Serves every path with its own name as the body, unless a body was registered with
/// [`MockDownloader::serve`].
#[derive(Default)]
pub struct MockDownloader {
    requests: Mutex<Vec<(String, ByteRange)>>,
    failures: Mutex<HashMap<String, StatusCode>>,
    bodies: Mutex<HashMap<String, Bytes>>,
    cancel_after: Mutex<HashMap<String, CancellationToken>>,
}

impl MockDownloader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, path: &str, status: StatusCode) {
        self.failures
            .lock()
            .unwrap()
            .insert(path.to_string(), status);
    }

    /// Ranged requests on `path` return the matching slice of `body`.
    pub fn serve(&self, path: &str, body: impl Into<Bytes>) {
        self.bodies
            .lock()
            .unwrap()
            .insert(path.to_string(), body.into());
    }

    /// Cancels `token` once the download of `path` delivered its bytes.
    pub fn cancel_after(&self, path: &str, token: &CancellationToken) {
        self.cancel_after
            .lock()
            .unwrap()
            .insert(path.to_string(), token.clone());
    }

    pub fn requests(&self) -> Vec<String> {
        self.ranged_requests()
            .into_iter()
            .map(|(path, _)| path)
            .collect()
    }

    pub fn ranged_requests(&self) -> Vec<(String, ByteRange)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn data_requests(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.ends_with(".m4s"))
            .count()
    }
}

#[async_trait]
impl Downloader for MockDownloader {
    async fn download(
        &self,
        url: &Url,
        range: ByteRange,
        on_bytes: &mut (dyn FnMut(Bytes) + Send),
        history: &ThroughputHistory,
        _cancel: &CancellationToken,
    ) -> DashResult<()> {
        let path = url.path().to_string();
        self.requests.lock().unwrap().push((path.clone(), range));

        let failure = self.failures.lock().unwrap().get(&path).copied();
        if let Some(status) = failure {
            history.push(0, Duration::from_millis(10));
            return Err(DashError::HttpError(status));
        }

        let body = self.bodies.lock().unwrap().get(&path).cloned();
        let data = match body {
            Some(body) => {
                let start = (range.offset as usize).min(body.len());
                let end = range
                    .end()
                    .map_or(body.len(), |end| (end as usize).min(body.len()));
                body.slice(start..end)
            }
            None => Bytes::from(path.clone()),
        };
        history.push(data.len() as u64, Duration::from_millis(10));
        on_bytes(data);

        if let Some(token) = self.cancel_after.lock().unwrap().get(&path) {
            token.cancel();
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DemuxerCall {
    PushChunk { offset: u64 },
    InitForEs,
    Complete,
    Completion,
    Reset,
    /// `next_packet` reported the end of the pushed data.
    Drained,
}

/// Every pushed buffer after the first one of a reset becomes one packet.
pub struct MockDemuxer {
    calls: Mutex<Vec<DemuxerCall>>,
    sender: Mutex<Option<mpsc::UnboundedSender<SegmentBuffer>>>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<SegmentBuffer>>,
    packets: AtomicU64,
    initialized: AtomicBool,
}

impl MockDemuxer {
    pub fn new() -> Arc<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        Arc::new(Self {
            calls: Default::default(),
            sender: Mutex::new(Some(sender)),
            receiver: tokio::sync::Mutex::new(receiver),
            packets: AtomicU64::new(0),
            initialized: AtomicBool::new(false),
        })
    }

    pub fn factory(self: &Arc<Self>) -> DemuxerFactory {
        let demuxer = self.clone();
        Arc::new(move || demuxer.clone() as Arc<dyn Demuxer>)
    }

    pub fn calls(&self) -> Vec<DemuxerCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: DemuxerCall) {
        self.calls.lock().unwrap().push(call);
    }

    async fn next_buffer(&self, cancel: &CancellationToken) -> DashResult<Option<Bytes>> {
        let mut receiver = self.receiver.lock().await;
        let buffer = tokio::select! {
            _ = cancel.cancelled() => return Err(DashError::Cancelled),
            buffer = receiver.recv() => buffer,
        };
        match buffer {
            Some(mut buffer) => Ok(Some(buffer.read(usize::MAX, cancel).await?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Demuxer for MockDemuxer {
    fn push_chunk(&self, buffer: SegmentBuffer) {
        self.record(DemuxerCall::PushChunk {
            offset: buffer.start_offset(),
        });
        if let Some(sender) = self.sender.lock().unwrap().as_ref() {
            let _ = sender.send(buffer);
        }
    }

    async fn init_for_es(&self, cancel: &CancellationToken) -> DashResult<ClipConfiguration> {
        self.record(DemuxerCall::InitForEs);
        let data = self
            .next_buffer(cancel)
            .await?
            .ok_or_else(|| DashError::DemuxerError("missing initialization data".to_string()))?;
        self.initialized.store(true, Ordering::SeqCst);
        Ok(ClipConfiguration {
            stream_config: Some(StreamConfig {
                content_type: ContentType::Video,
                codec: Some(String::from_utf8_lossy(&data).into_owned()),
                ..Default::default()
            }),
            drm_init_data: vec![DrmInitData {
                content_type: ContentType::Video,
                scheme_id: "urn:uuid:test".to_string(),
                data,
            }],
        })
    }

    async fn next_packet(
        &self,
        _min_pts: Option<Duration>,
        cancel: &CancellationToken,
    ) -> DashResult<Option<MediaPacket>> {
        let Some(data) = self.next_buffer(cancel).await? else {
            self.record(DemuxerCall::Drained);
            return Ok(None);
        };
        let pts = Duration::from_secs(self.packets.fetch_add(1, Ordering::SeqCst));
        Ok(Some(MediaPacket {
            content_type: ContentType::Video,
            pts,
            dts: pts,
            duration: None,
            is_key_frame: true,
            data,
        }))
    }

    fn complete(&self) {
        self.record(DemuxerCall::Complete);
        self.sender.lock().unwrap().take();
    }

    async fn completion(&self) {
        self.record(DemuxerCall::Completion);
    }

    fn reset(&self) {
        self.record(DemuxerCall::Reset);
        let (sender, receiver) = mpsc::unbounded_channel();
        *self.sender.lock().unwrap() = Some(sender);
        if let Ok(mut current) = self.receiver.try_lock() {
            *current = receiver;
        }
        self.initialized.store(false, Ordering::SeqCst);
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct MockRenderer {
    packets: Mutex<Vec<Packet>>,
    drm_init_data: Mutex<Vec<DrmInitData>>,
}

impl MockRenderer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn packets(&self) -> Vec<Packet> {
        self.packets.lock().unwrap().clone()
    }

    pub fn drm_init_data(&self) -> Vec<DrmInitData> {
        self.drm_init_data.lock().unwrap().clone()
    }
}

impl Renderer for MockRenderer {
    fn handle_packet(&self, packet: Packet) {
        self.packets.lock().unwrap().push(packet);
    }

    fn handle_drm_init_data(&self, data: DrmInitData) {
        self.drm_init_data.lock().unwrap().push(data);
    }
}

pub struct Harness {
    pub provider: DashStreamProvider,
    pub downloader: Arc<MockDownloader>,
    pub demuxer: Arc<MockDemuxer>,
    pub renderer: Arc<MockRenderer>,
}

impl Harness {
    pub fn new(config: PlayerConfig) -> Self {
        let downloader = MockDownloader::new();
        let demuxer = MockDemuxer::new();
        let loader = ManifestLoader::new(HttpClient::default(), Url::parse(BASE_URL).unwrap());
        let provider = DashStreamProvider::new(
            loader,
            downloader.clone(),
            Arc::new(MonotonicClock::new()),
            demuxer.factory(),
            config,
        );
        Self {
            provider,
            downloader,
            demuxer,
            renderer: MockRenderer::new(),
        }
    }

    /// First stream group of the first period of `manifest`.
    pub fn video_stream(&self, manifest: Manifest, selector: StreamSelector) -> Arc<DashStream> {
        let timeline = self.provider.update_manifest(manifest);
        let period = &timeline.periods[0];
        let groups = self.provider.get_stream_groups(period).unwrap();
        self.provider
            .create_stream(period, &groups[0], Some(selector))
            .unwrap()
    }

    pub fn renderer(&self) -> Arc<dyn Renderer> {
        self.renderer.clone()
    }
}
