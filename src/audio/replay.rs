//! Scripted capture device for tests and batch processing.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::device::{AudioFrame, CaptureDevice, InputHints, OpenInput, StreamHandle, StreamSpec};
use super::CaptureError;

/// A `CaptureDevice` that replays a fixed frame sequence instead of touching
/// hardware. Every `open_input` call yields the full sequence again, so the
/// same device serves the microphone probe, the capture session, and the
/// waveform monitor within one recording cycle.
///
/// The device counts opened and still-live handles, which is how tests verify
/// that every exit path releases its tracks.
pub struct ReplayDevice {
    frames: Vec<AudioFrame>,
    frame_interval: Option<Duration>,
    refuse: Option<String>,
    opens: Arc<AtomicUsize>,
    live_handles: Arc<AtomicUsize>,
}

impl ReplayDevice {
    /// Replay `frames`, delivering all of them as soon as the input opens and
    /// then ending the stream.
    pub fn new(frames: Vec<AudioFrame>) -> Self {
        Self {
            frames,
            frame_interval: None,
            refuse: None,
            opens: Arc::new(AtomicUsize::new(0)),
            live_handles: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Replay `frames` paced at `interval`, keeping the stream open after the
    /// last frame until the consumer hangs up. Requires a tokio runtime.
    pub fn paced(frames: Vec<AudioFrame>, interval: Duration) -> Self {
        let mut device = Self::new(frames);
        device.frame_interval = Some(interval);
        device
    }

    /// A device whose `open_input` always fails with `DeviceUnavailable`.
    pub fn refusing(message: &str) -> Self {
        let mut device = Self::new(Vec::new());
        device.refuse = Some(message.to_string());
        device
    }

    /// Number of `open_input` calls, including refused ones.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Number of handles that have been opened but not yet stopped.
    pub fn live_handles(&self) -> usize {
        self.live_handles.load(Ordering::SeqCst)
    }

    fn spec(&self) -> StreamSpec {
        self.frames
            .first()
            .map(|f| StreamSpec {
                sample_rate: f.sample_rate,
                channels: f.channels,
            })
            .unwrap_or(StreamSpec {
                sample_rate: 16_000,
                channels: 1,
            })
    }
}

impl CaptureDevice for ReplayDevice {
    fn open_input(&self, _hints: &InputHints) -> Result<OpenInput, CaptureError> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = &self.refuse {
            return Err(CaptureError::DeviceUnavailable(message.clone()));
        }

        let (tx, rx) = mpsc::channel(self.frames.len().max(1));

        match self.frame_interval {
            Some(interval) => {
                let frames = self.frames.clone();
                tokio::spawn(async move {
                    for frame in frames {
                        tokio::time::sleep(interval).await;
                        if tx.send(frame).await.is_err() {
                            return;
                        }
                    }
                    // Keep the stream open until the consumer hangs up.
                    tx.closed().await;
                });
            }
            None => {
                for frame in &self.frames {
                    let _ = tx.try_send(frame.clone());
                }
                // tx drops here; the receiver ends after draining.
            }
        }

        self.live_handles.fetch_add(1, Ordering::SeqCst);

        Ok(OpenInput {
            handle: Box::new(ReplayHandle {
                live: AtomicBool::new(true),
                counter: self.live_handles.clone(),
            }),
            frames: rx,
            spec: self.spec(),
        })
    }

    fn name(&self) -> String {
        "replay".into()
    }
}

struct ReplayHandle {
    live: AtomicBool,
    counter: Arc<AtomicUsize>,
}

impl StreamHandle for ReplayHandle {
    fn stop(&mut self) {
        if self.live.swap(false, Ordering::SeqCst) {
            self.counter.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

/// Split `samples` into frames of `chunk` samples each, with running
/// timestamps.
pub fn frames_from_samples(
    samples: &[i16],
    sample_rate: u32,
    channels: u16,
    chunk: usize,
) -> Vec<AudioFrame> {
    let chunk = chunk.max(1);
    let mut frames = Vec::new();
    let mut offset = 0usize;
    for piece in samples.chunks(chunk) {
        let timestamp_ms = offset as u64 * 1_000 / (sample_rate as u64 * channels as u64).max(1);
        frames.push(AudioFrame {
            samples: piece.to_vec(),
            sample_rate,
            channels,
            timestamp_ms,
        });
        offset += piece.len();
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_frames_then_ends() {
        let frames = frames_from_samples(&[1, 2, 3, 4, 5, 6], 16_000, 1, 2);
        let device = ReplayDevice::new(frames);

        let mut opened = device.open_input(&InputHints::default()).unwrap();
        let mut collected = Vec::new();
        while let Some(frame) = opened.frames.recv().await {
            collected.extend(frame.samples);
        }

        assert_eq!(collected, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(device.live_handles(), 1);

        opened.handle.stop();
        assert_eq!(device.live_handles(), 0);
        assert!(!opened.handle.is_live());
    }

    #[test]
    fn stop_is_idempotent() {
        let device = ReplayDevice::new(Vec::new());
        let mut opened = device.open_input(&InputHints::default()).unwrap();

        opened.handle.stop();
        opened.handle.stop();
        assert_eq!(device.live_handles(), 0);
    }

    #[test]
    fn refusing_device_counts_the_attempt() {
        let device = ReplayDevice::refusing("permission denied");
        let err = device.open_input(&InputHints::default()).unwrap_err();

        assert!(matches!(err, CaptureError::DeviceUnavailable(_)));
        assert_eq!(device.opens(), 1);
        assert_eq!(device.live_handles(), 0);
    }

    #[test]
    fn frames_carry_running_timestamps() {
        let frames = frames_from_samples(&[0i16; 32_000], 16_000, 1, 16_000);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].timestamp_ms, 0);
        assert_eq!(frames[1].timestamp_ms, 1_000);
    }
}
