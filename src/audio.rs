//! Microphone capture.
//!
//! The OS audio driver invokes a callback roughly every 100 ms with a mono
//! f32 block; the callback copies the block onto a bounded [`FrameQueue`] and
//! returns. Under overload the queue sheds its *oldest* frame — the capture
//! callback must never block, and stale audio is worth less than fresh audio
//! to a live aligner.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, error};

/// Capture sample rate. The recognizer consumes the same rate, so no
/// resampling happens anywhere in the pipeline.
pub const SAMPLE_RATE: u32 = 16_000;
/// Nominal duration of one captured block.
pub const FRAME_DURATION: Duration = Duration::from_millis(100);
/// Samples per nominal block.
pub const FRAME_SAMPLES: usize = (SAMPLE_RATE as usize) / 10;
/// Frames buffered between the capture callback and the decode thread.
pub const QUEUE_CAPACITY: usize = 5;

// ─────────────────────────────────────────────────────────────────────────────
// FrameQueue
// ─────────────────────────────────────────────────────────────────────────────

/// Bounded FIFO of audio frames with drop-oldest backpressure.
///
/// `push` never blocks; `pop_timeout` parks the consumer briefly so the
/// decode loop can interleave shutdown checks without spinning.
pub struct FrameQueue {
    inner: Mutex<VecDeque<Vec<f32>>>,
    available: Condvar,
    capacity: usize,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Enqueue `frame`, discarding the oldest entry when full.
    pub fn push(&self, frame: Vec<f32>) {
        let mut queue = self.inner.lock().expect("frame queue poisoned");
        if queue.len() == self.capacity {
            queue.pop_front();
            debug!("frame queue full, dropped oldest frame");
        }
        queue.push_back(frame);
        self.available.notify_one();
    }

    /// Dequeue the oldest frame, waiting up to `timeout` for one to arrive.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Vec<f32>> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.inner.lock().expect("frame queue poisoned");
        while queue.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .available
                .wait_timeout(queue, deadline - now)
                .expect("frame queue poisoned");
            queue = guard;
        }
        queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("frame queue poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// AudioCapture
// ─────────────────────────────────────────────────────────────────────────────

/// An open input stream on the default microphone.
///
/// The device is held for as long as this value lives; dropping it releases
/// the stream on every exit path.
pub struct AudioCapture {
    _stream: cpal::Stream,
}

impl AudioCapture {
    /// Open the system default input at 16 kHz mono and start pushing frames
    /// onto `queue`. A driver error sets `failed` so the session can abort.
    pub fn start(queue: Arc<FrameQueue>, failed: Arc<AtomicBool>) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .context("No default audio input device")?;

        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Fixed(FRAME_SAMPLES as u32),
        };

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    queue.push(data.to_vec());
                },
                move |err| {
                    error!("audio capture failed: {err}");
                    failed.store(true, Ordering::SeqCst);
                },
                None,
            )
            .context("Cannot open 16 kHz mono input stream")?;

        stream.play().context("Cannot start audio input stream")?;
        Ok(Self { _stream: stream })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let queue = FrameQueue::new(3);
        queue.push(vec![1.0]);
        queue.push(vec![2.0]);
        assert_eq!(queue.pop_timeout(Duration::ZERO), Some(vec![1.0]));
        assert_eq!(queue.pop_timeout(Duration::ZERO), Some(vec![2.0]));
        assert_eq!(queue.pop_timeout(Duration::ZERO), None);
    }

    #[test]
    fn test_drop_oldest_when_full() {
        let queue = FrameQueue::new(2);
        queue.push(vec![1.0]);
        queue.push(vec![2.0]);
        queue.push(vec![3.0]);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop_timeout(Duration::ZERO), Some(vec![2.0]));
        assert_eq!(queue.pop_timeout(Duration::ZERO), Some(vec![3.0]));
    }

    #[test]
    fn test_pop_timeout_returns_none_when_starved() {
        let queue = FrameQueue::new(2);
        assert_eq!(queue.pop_timeout(Duration::from_millis(1)), None);
    }

    #[test]
    fn test_push_wakes_waiting_consumer() {
        let queue = Arc::new(FrameQueue::new(2));
        let consumer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || queue.pop_timeout(Duration::from_secs(2)))
        };
        std::thread::sleep(Duration::from_millis(20));
        queue.push(vec![7.0]);
        assert_eq!(consumer.join().unwrap(), Some(vec![7.0]));
    }
}
