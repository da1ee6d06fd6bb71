use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use iori_player::{buffer::SegmentBuffer, prelude::*};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Pretends every pushed segment is one packet. Good enough to drive the load loops.
pub struct CountingDemuxer {
    sender: Mutex<Option<mpsc::UnboundedSender<SegmentBuffer>>>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<SegmentBuffer>>,
    bytes: AtomicU64,
    initialized: std::sync::atomic::AtomicBool,
}

impl CountingDemuxer {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: tokio::sync::Mutex::new(receiver),
            bytes: AtomicU64::new(0),
            initialized: Default::default(),
        }
    }

    async fn next_segment(&self, cancel: &CancellationToken) -> DashResult<Option<Bytes>> {
        let mut receiver = self.receiver.lock().await;
        let buffer = tokio::select! {
            _ = cancel.cancelled() => return Err(DashError::Cancelled),
            buffer = receiver.recv() => buffer,
        };
        let Some(mut buffer) = buffer else {
            return Ok(None);
        };
        let data = buffer.read(usize::MAX, cancel).await?;
        self.bytes.fetch_add(data.len() as u64, Ordering::Relaxed);
        Ok(Some(data))
    }
}

#[async_trait]
impl Demuxer for CountingDemuxer {
    fn push_chunk(&self, buffer: SegmentBuffer) {
        if let Ok(sender) = self.sender.lock() {
            if let Some(sender) = sender.as_ref() {
                let _ = sender.send(buffer);
            }
        }
    }

    async fn init_for_es(&self, cancel: &CancellationToken) -> DashResult<ClipConfiguration> {
        let data = self.next_segment(cancel).await?.unwrap_or_default();
        self.initialized.store(true, Ordering::Relaxed);
        Ok(ClipConfiguration {
            stream_config: Some(StreamConfig {
                extra_data: data,
                ..Default::default()
            }),
            drm_init_data: vec![],
        })
    }

    async fn next_packet(
        &self,
        _min_pts: Option<Duration>,
        cancel: &CancellationToken,
    ) -> DashResult<Option<MediaPacket>> {
        Ok(self.next_segment(cancel).await?.map(|data| MediaPacket {
            content_type: ContentType::Unknown,
            pts: Duration::ZERO,
            dts: Duration::ZERO,
            duration: None,
            is_key_frame: true,
            data,
        }))
    }

    fn complete(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }

    async fn completion(&self) {}

    fn reset(&self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        if let Ok(mut current) = self.sender.lock() {
            *current = Some(sender);
        }
        if let Ok(mut current) = self.receiver.try_lock() {
            *current = receiver;
        }
        self.initialized.store(false, Ordering::Relaxed);
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Relaxed)
    }
}

/// Logs what it receives and keeps totals.
#[derive(Default)]
pub struct LoggingRenderer {
    packets: AtomicU64,
    bytes: AtomicU64,
}

impl LoggingRenderer {
    pub fn packets(&self) -> u64 {
        self.packets.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

impl Renderer for LoggingRenderer {
    fn handle_packet(&self, packet: Packet) {
        match packet {
            Packet::Media(packet) => {
                self.packets.fetch_add(1, Ordering::Relaxed);
                self.bytes
                    .fetch_add(packet.data.len() as u64, Ordering::Relaxed);
                tracing::debug!(bytes = packet.data.len(), "packet");
            }
            Packet::Eos(content_type) => tracing::info!("{content_type} reached end of stream"),
        }
    }

    fn handle_drm_init_data(&self, data: DrmInitData) {
        tracing::info!(scheme = %data.scheme_id, "drm init data");
    }
}
