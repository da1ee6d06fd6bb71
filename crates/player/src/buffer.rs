//! Bridge between the chunk downloads and the demuxer.
//!
//! ```text
//!  download ──add()──► [chunk 0][chunk 1][chunk 2] ... ──read()/seek()──► demuxer
//!                          ▲ cursor (chunk, offset)
//! ```
//!
//! Every chunk of one init or data segment is retained until the buffer is dropped, so a
//! seek backwards is always served from memory. A seek forwards past the received data
//! waits for more chunks.

use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard},
    time::Duration,
};

use bytes::{Bytes, BytesMut};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::{DashError, DashResult};

#[derive(Debug, Default)]
struct State {
    chunks: Vec<Bytes>,
    len: u64,
    completed: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
    notify: Notify,
    condvar: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wake(&self) {
        self.notify.notify_waiters();
        self.condvar.notify_all();
    }
}

/// Creates a connected writer and reader. `start_offset` is the logical position of the
/// first byte, as seen by the demuxer.
pub fn segment_buffer(start_offset: u64) -> (SegmentBufferWriter, SegmentBuffer) {
    let shared = Arc::new(Shared::default());
    (
        SegmentBufferWriter {
            shared: shared.clone(),
        },
        SegmentBuffer {
            shared,
            start_offset,
            position: 0,
            chunk: 0,
            chunk_offset: 0,
        },
    )
}

/// Producer half. Dropping it completes the buffer.
#[derive(Debug)]
pub struct SegmentBufferWriter {
    shared: Arc<Shared>,
}

impl SegmentBufferWriter {
    /// Appends a chunk. Never blocks.
    pub fn add(&self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        {
            let mut state = self.shared.lock();
            if state.completed {
                tracing::warn!("chunk added to a completed segment buffer is dropped");
                return;
            }
            state.len += chunk.len() as u64;
            state.chunks.push(chunk);
        }
        self.shared.wake();
    }

    /// Signals that no more chunks will be added.
    pub fn complete_adding(&self) {
        self.shared.lock().completed = true;
        self.shared.wake();
    }

    pub fn len(&self) -> u64 {
        self.shared.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for SegmentBufferWriter {
    fn drop(&mut self) {
        self.complete_adding();
    }
}

/// Consumer half, owned by the demuxer.
#[derive(Debug)]
pub struct SegmentBuffer {
    shared: Arc<Shared>,
    start_offset: u64,
    /// Bytes consumed from the start of this buffer.
    position: u64,
    chunk: usize,
    chunk_offset: usize,
}

impl SegmentBuffer {
    pub fn start_offset(&self) -> u64 {
        self.start_offset
    }

    /// Logical position of the next byte to be read.
    pub fn position(&self) -> u64 {
        self.start_offset + self.position
    }

    /// Bytes received so far.
    pub fn len(&self) -> u64 {
        self.shared.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_completed(&self) -> bool {
        self.shared.lock().completed
    }

    /// Whether everything was received and read.
    pub fn is_eof(&self) -> bool {
        let state = self.shared.lock();
        state.completed && self.position >= state.len
    }

    /// Reads up to `size` bytes, waiting until that many are available or the writer is
    /// done. An empty result means the end of the buffer.
    pub async fn read(&mut self, size: usize, cancel: &CancellationToken) -> DashResult<Bytes> {
        loop {
            let shared = self.shared.clone();
            let notified = shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(bytes) = self.try_read(size) {
                return Ok(bytes);
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DashError::Cancelled),
                _ = &mut notified => {}
            }
        }
    }

    /// Same as [`SegmentBuffer::read`], for demuxers running on a blocking thread.
    pub fn blocking_read(&mut self, size: usize, cancel: &CancellationToken) -> DashResult<Bytes> {
        loop {
            if let Some(bytes) = self.try_read(size) {
                return Ok(bytes);
            }
            if cancel.is_cancelled() {
                return Err(DashError::Cancelled);
            }
            let state = self.shared.lock();
            if !Self::readable(&state, self.position, size) {
                // cancellation has no condvar to signal, poll it
                let _ = self
                    .shared
                    .condvar
                    .wait_timeout(state, Duration::from_millis(50))
                    .unwrap_or_else(|e| e.into_inner());
            }
        }
    }

    /// Moves the cursor to the logical `position`, clamped to the end once the writer is
    /// done. Positions before the start of the buffer are clamped to its start.
    pub async fn seek(&mut self, position: u64, cancel: &CancellationToken) -> DashResult<u64> {
        let target = position.saturating_sub(self.start_offset);
        loop {
            let shared = self.shared.clone();
            let notified = shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = shared.lock();
                if state.len >= target || state.completed {
                    let target = target.min(state.len);
                    let (chunk, chunk_offset) = Self::locate(&state.chunks, target);
                    drop(state);

                    self.position = target;
                    self.chunk = chunk;
                    self.chunk_offset = chunk_offset;
                    return Ok(self.position());
                }
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DashError::Cancelled),
                _ = &mut notified => {}
            }
        }
    }

    fn readable(state: &State, position: u64, size: usize) -> bool {
        state.completed || state.len - position >= size as u64
    }

    /// Scans from the first chunk for the one containing `position`.
    fn locate(chunks: &[Bytes], position: u64) -> (usize, usize) {
        let mut remaining = position;
        for (index, chunk) in chunks.iter().enumerate() {
            let len = chunk.len() as u64;
            if remaining < len {
                return (index, remaining as usize);
            }
            remaining -= len;
        }
        (chunks.len(), 0)
    }

    fn try_read(&mut self, size: usize) -> Option<Bytes> {
        let state = self.shared.lock();
        if !Self::readable(&state, self.position, size) {
            return None;
        }

        let available = (state.len - self.position).min(size as u64) as usize;
        if available == 0 {
            return Some(Bytes::new());
        }

        // a read within one chunk is a zero-copy slice
        let current = &state.chunks[self.chunk];
        let result = if current.len() - self.chunk_offset >= available {
            current.slice(self.chunk_offset..self.chunk_offset + available)
        } else {
            let mut out = BytesMut::with_capacity(available);
            let (mut chunk, mut offset) = (self.chunk, self.chunk_offset);
            while out.len() < available {
                let data = &state.chunks[chunk];
                let take = (data.len() - offset).min(available - out.len());
                out.extend_from_slice(&data[offset..offset + take]);
                offset += take;
                if offset == data.len() {
                    chunk += 1;
                    offset = 0;
                }
            }
            out.freeze()
        };

        let (chunk, chunk_offset) =
            Self::advance(&state.chunks, self.chunk, self.chunk_offset, available);
        drop(state);

        self.position += available as u64;
        self.chunk = chunk;
        self.chunk_offset = chunk_offset;
        Some(result)
    }

    fn advance(
        chunks: &[Bytes],
        mut chunk: usize,
        mut offset: usize,
        mut count: usize,
    ) -> (usize, usize) {
        while count > 0 {
            let left = chunks[chunk].len() - offset;
            if count < left {
                return (chunk, offset + count);
            }
            count -= left;
            chunk += 1;
            offset = 0;
        }
        (chunk, offset)
    }
}
