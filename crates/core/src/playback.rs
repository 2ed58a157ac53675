//! Playback Controller: buffers response audio and supports an immediate stop.

use crate::frame::AudioChunk;
use bytes::BytesMut;
use std::collections::VecDeque;

/// Accepts response audio in arrival order and can be silenced at any time.
#[cfg_attr(test, mockall::automock)]
pub trait PlaybackController: Send {
    fn enqueue(&mut self, chunk: AudioChunk);

    /// Discards all audio not yet played. Safe to call when idle.
    fn stop(&mut self);
}

/// In-memory playback queue. The output device pulls assembled PCM with
/// [`PlaybackBuffer::take_ready`].
#[derive(Debug, Default)]
pub struct PlaybackBuffer {
    pending: VecDeque<AudioChunk>,
    stops: usize,
}

impl PlaybackBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_chunks(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_bytes(&self) -> usize {
        self.pending.iter().map(|c| c.pcm.len()).sum()
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    /// How many times playback was stopped.
    pub fn stops(&self) -> usize {
        self.stops
    }

    /// Assembles every pending chunk into one contiguous buffer.
    ///
    /// Chunks are joined while they share a sample rate; a chunk at a different
    /// rate stays queued for the next call.
    pub fn take_ready(&mut self) -> Option<AudioChunk> {
        let first = self.pending.pop_front()?;
        let sample_rate = first.sample_rate;
        let mut pcm = BytesMut::from(first.pcm.as_ref());
        while self
            .pending
            .front()
            .is_some_and(|next| next.sample_rate == sample_rate)
        {
            if let Some(next) = self.pending.pop_front() {
                pcm.extend_from_slice(&next.pcm);
            }
        }
        Some(AudioChunk {
            pcm: pcm.freeze(),
            sample_rate,
        })
    }
}

impl PlaybackController for PlaybackBuffer {
    fn enqueue(&mut self, chunk: AudioChunk) {
        if !chunk.pcm.is_empty() {
            self.pending.push_back(chunk);
        }
    }

    fn stop(&mut self) {
        self.pending.clear();
        self.stops += 1;
    }
}
