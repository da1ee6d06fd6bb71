use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::header::RANGE;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    throughput::ThroughputHistory, util::http::HttpClient, ByteRange, DashError, DashResult,
};

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Transport used by the chunk loaders.
///
/// Implementations must report every received byte span to `on_bytes` in order, and must
/// push exactly one sample to `history` per call, whether the download succeeded or not.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(
        &self,
        url: &Url,
        range: ByteRange,
        on_bytes: &mut (dyn FnMut(Bytes) + Send),
        history: &ThroughputHistory,
        cancel: &CancellationToken,
    ) -> DashResult<()>;

    async fn download_bytes(
        &self,
        url: &Url,
        range: ByteRange,
        history: &ThroughputHistory,
        cancel: &CancellationToken,
    ) -> DashResult<Bytes> {
        let mut data = BytesMut::new();
        self.download(
            url,
            range,
            &mut |chunk: Bytes| data.extend_from_slice(&chunk),
            history,
            cancel,
        )
        .await?;
        Ok(data.freeze())
    }
}

/// [`Downloader`] over [`HttpClient`]. The body is streamed and re-chunked to
/// `chunk_size` bytes.
#[derive(Clone)]
pub struct HttpDownloader {
    client: HttpClient,
    chunk_size: usize,
}

impl HttpDownloader {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    async fn stream_body(
        &self,
        url: &Url,
        range: ByteRange,
        on_bytes: &mut (dyn FnMut(Bytes) + Send),
        received: &mut u64,
        cancel: &CancellationToken,
    ) -> DashResult<()> {
        let mut request = self.client.get(url.clone());
        if let Some(range) = range.to_http_range() {
            request = request.header(RANGE, range);
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DashError::Cancelled),
            response = request.send() => response?,
        };
        if !response.status().is_success() {
            let status = response.status();
            if let Ok(body) = response.text().await {
                tracing::warn!("Error body: {body}");
            }
            return Err(DashError::HttpError(status));
        }

        let mut stream = response.bytes_stream();
        let mut pending = BytesMut::new();
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DashError::Cancelled),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else {
                break;
            };
            let chunk = chunk?;
            *received += chunk.len() as u64;
            pending.extend_from_slice(&chunk);
            while pending.len() >= self.chunk_size {
                on_bytes(pending.split_to(self.chunk_size).freeze());
            }
        }
        if !pending.is_empty() {
            on_bytes(pending.freeze());
        }
        Ok(())
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(
        &self,
        url: &Url,
        range: ByteRange,
        on_bytes: &mut (dyn FnMut(Bytes) + Send),
        history: &ThroughputHistory,
        cancel: &CancellationToken,
    ) -> DashResult<()> {
        let started = Instant::now();
        let mut received = 0;
        let result = self
            .stream_body(url, range, on_bytes, &mut received, cancel)
            .await;
        history.push(received, started.elapsed());
        result
    }
}
