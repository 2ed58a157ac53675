//! Chunks recorder output into self-contained audio frames.
//!
//! The recorder pushes encoded bytes whenever it has them; [`chunk_frames`]
//! groups them into one [`AudioBlob`] per interval so every frame carries its
//! own mime type and the relay keeps no codec state between frames.

use crate::frame::AudioBlob;
use bytes::{Bytes, BytesMut};
use futures::{Stream, stream};
use std::time::Duration;
use tokio::{
    sync::mpsc,
    time::{Instant, Interval, MissedTickBehavior, interval_at},
};

pub const DEFAULT_MIME_TYPE: &str = "audio/webm;codecs=opus";
/// Shorter chunks lower the latency between end of speech and first response.
pub const DEFAULT_CHUNK_INTERVAL: Duration = Duration::from_millis(200);
/// Floor applied to the chunking interval; a zero period cannot drive a timer.
pub const MIN_CHUNK_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub mime_type: String,
    pub interval: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            mime_type: DEFAULT_MIME_TYPE.to_string(),
            interval: DEFAULT_CHUNK_INTERVAL,
        }
    }
}

struct Chunker {
    source: mpsc::Receiver<Bytes>,
    buffer: BytesMut,
    ticker: Interval,
    mime_type: String,
    finished: bool,
}

impl Chunker {
    fn flush(&mut self) -> Option<AudioBlob> {
        if self.buffer.is_empty() {
            return None;
        }
        let bytes = self.buffer.split().freeze();
        Some(AudioBlob::encode(self.mime_type.clone(), &bytes))
    }

    async fn next_frame(&mut self) -> Option<AudioBlob> {
        while !self.finished {
            tokio::select! {
                chunk = self.source.recv() => match chunk {
                    Some(bytes) => self.buffer.extend_from_slice(&bytes),
                    None => {
                        self.finished = true;
                        return self.flush();
                    }
                },
                _ = self.ticker.tick() => {
                    if let Some(frame) = self.flush() {
                        return Some(frame);
                    }
                }
            }
        }
        None
    }
}

/// Turns recorder output into a lazy, ordered stream of audio frames.
///
/// Intervals with no audio produce no frame. Intervals shorter than
/// [`MIN_CHUNK_INTERVAL`] are raised to it. When the recorder stops (the
/// sender is dropped) any remaining bytes are flushed and the stream ends.
pub fn chunk_frames(
    source: mpsc::Receiver<Bytes>,
    config: CaptureConfig,
) -> impl Stream<Item = AudioBlob> {
    let period = config.interval.max(MIN_CHUNK_INTERVAL);
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let chunker = Chunker {
        source,
        buffer: BytesMut::new(),
        ticker,
        mime_type: config.mime_type,
        finished: false,
    };
    stream::unfold(chunker, |mut chunker| async move {
        let frame = chunker.next_frame().await?;
        Some((frame, chunker))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
    use futures::StreamExt;

    fn decode(blob: &AudioBlob) -> Vec<u8> {
        BASE64.decode(&blob.data).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_bytes_within_an_interval_form_one_frame() {
        let (tx, rx) = mpsc::channel(16);
        let frames = chunk_frames(rx, CaptureConfig::default());
        tokio::pin!(frames);

        tx.send(Bytes::from_static(&[1, 2])).await.unwrap();
        tx.send(Bytes::from_static(&[3])).await.unwrap();

        let frame = frames.next().await.unwrap();
        assert_eq!(frame.mime_type, DEFAULT_MIME_TYPE);
        assert_eq!(decode(&frame), vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_follow_recording_order() {
        let (tx, rx) = mpsc::channel(16);
        let frames = chunk_frames(rx, CaptureConfig::default());
        tokio::pin!(frames);

        tx.send(Bytes::from_static(&[1])).await.unwrap();
        let first = frames.next().await.unwrap();
        tx.send(Bytes::from_static(&[2])).await.unwrap();
        let second = frames.next().await.unwrap();

        assert_eq!(decode(&first), vec![1]);
        assert_eq!(decode(&second), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_raised_to_minimum() {
        let (tx, rx) = mpsc::channel(16);
        let config = CaptureConfig {
            interval: Duration::ZERO,
            ..CaptureConfig::default()
        };
        let frames = chunk_frames(rx, config);
        tokio::pin!(frames);

        tx.send(Bytes::from_static(&[4, 5])).await.unwrap();
        let frame = frames.next().await.unwrap();
        assert_eq!(decode(&frame), vec![4, 5]);

        drop(tx);
        assert!(frames.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopping_flushes_remainder_and_ends() {
        let (tx, rx) = mpsc::channel(16);
        let config = CaptureConfig {
            mime_type: "audio/pcm;rate=16000".into(),
            interval: Duration::from_secs(60),
        };
        let frames = chunk_frames(rx, config);
        tokio::pin!(frames);

        tx.send(Bytes::from_static(&[9, 9])).await.unwrap();
        drop(tx);

        let frame = frames.next().await.unwrap();
        assert_eq!(frame.mime_type, "audio/pcm;rate=16000");
        assert_eq!(decode(&frame), vec![9, 9]);
        assert!(frames.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_recording_yields_nothing() {
        let (tx, rx) = mpsc::channel::<Bytes>(16);
        let frames = chunk_frames(rx, CaptureConfig::default());
        tokio::pin!(frames);

        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(tx);
        assert!(frames.next().await.is_none());
    }
}
