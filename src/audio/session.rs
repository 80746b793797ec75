//! Capture sessions
//!
//! A `CaptureSession` owns one device stream and one encoder for a single
//! recording cycle. A pump task moves frames from the device channel into the
//! encoder; stopping flushes the encoder and concatenates the collected
//! fragments, in arrival order, into the final artifact.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::device::{AudioFrame, CaptureDevice, InputHints, StreamHandle};
use super::encoder::{negotiate_encoding, AudioEncoder, AudioEncoding};
use super::CaptureError;
use crate::adapter::RecordingOptions;

/// Cadence for mid-stream fragment polling when continuous capture with
/// interim results is requested.
const FRAGMENT_INTERVAL_MS: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
    Stopping,
    Disposed,
}

/// The finalized audio payload of one session, tagged with its negotiated
/// encoding. Immutable once produced; consumed by exactly one upload.
#[derive(Debug, Clone)]
pub struct AudioArtifact {
    pub bytes: Vec<u8>,
    pub encoding: AudioEncoding,
}

impl AudioArtifact {
    /// Upload filename, `recording.<ext>`.
    pub fn file_name(&self) -> String {
        format!("recording.{}", self.encoding.extension())
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// One microphone recording in progress.
pub struct CaptureSession {
    id: Uuid,
    state: SessionState,
    handle: Option<Box<dyn StreamHandle>>,
    fragments: Arc<Mutex<Vec<Vec<u8>>>>,
    encoding: AudioEncoding,
    stop_tx: Option<oneshot::Sender<()>>,
    pump: Option<JoinHandle<()>>,
}

impl CaptureSession {
    /// Acquire the microphone and begin capturing.
    ///
    /// Each session handles exactly one recording; callers start a new
    /// session per cycle, so a double start cannot happen at this level (the
    /// adapter rejects it with `AlreadyRecording`).
    pub async fn start(
        device: &Arc<dyn CaptureDevice>,
        mut encoder: Box<dyn AudioEncoder>,
        options: &RecordingOptions,
    ) -> Result<Self, CaptureError> {
        let opened = device.open_input(&InputHints::default())?;

        let encoding = negotiate_encoding(encoder.as_ref());
        encoder.begin(encoding, opened.spec);

        let id = Uuid::new_v4();
        let fragments = Arc::new(Mutex::new(Vec::new()));
        let (stop_tx, stop_rx) = oneshot::channel();

        // Continuous capture with interim results switches fragment delivery
        // to a fixed 1-second cadence. The fragments still only surface at
        // stop; no interim transcript path consumes them yet.
        let timeslice = options.continuous && options.interim_results;

        let pump = tokio::spawn(run_pump(
            opened.frames,
            encoder,
            fragments.clone(),
            stop_rx,
            timeslice,
        ));

        log::info!(
            "Capture session {} started: {} @ {} Hz, {} channel(s)",
            id,
            encoding.mime_type(),
            opened.spec.sample_rate,
            opened.spec.channels
        );

        Ok(Self {
            id,
            state: SessionState::Recording,
            handle: Some(opened.handle),
            fragments,
            encoding,
            stop_tx: Some(stop_tx),
            pump: Some(pump),
        })
    }

    /// End the capture, wait for the encoder to flush, and assemble the
    /// artifact from all fragments in arrival order.
    pub async fn stop(&mut self) -> Result<AudioArtifact, CaptureError> {
        if self.state != SessionState::Recording {
            return Err(CaptureError::NotRecording);
        }
        self.state = SessionState::Stopping;

        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(pump) = self.pump.take() {
            let _ = pump.await;
        }
        if let Some(handle) = self.handle.as_mut() {
            handle.stop();
        }

        let fragments = {
            let mut guard = self.fragments.lock().unwrap();
            std::mem::take(&mut *guard)
        };
        let total: usize = fragments.iter().map(Vec::len).sum();
        self.state = SessionState::Idle;

        log::info!(
            "Capture session {} stopped: {} fragment(s), {} bytes",
            self.id,
            fragments.len(),
            total
        );

        if total == 0 {
            return Err(CaptureError::EmptyRecording);
        }

        let mut bytes = Vec::with_capacity(total);
        for fragment in &fragments {
            bytes.extend_from_slice(fragment);
        }

        Ok(AudioArtifact {
            bytes,
            encoding: self.encoding,
        })
    }

    /// Release everything: pump, device tracks, buffered fragments.
    /// Idempotent and safe from any state; a dispose before `stop` discards
    /// the recording.
    pub fn dispose(&mut self) {
        if self.state == SessionState::Disposed {
            return;
        }

        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(handle) = self.handle.as_mut() {
            handle.stop();
        }
        self.fragments.lock().unwrap().clear();

        self.state = SessionState::Disposed;
        log::debug!("Capture session {} disposed", self.id);
    }

    pub fn is_recording(&self) -> bool {
        self.state == SessionState::Recording
    }

    pub fn state(&self) -> SessionState {
        self.state
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Move frames from the device into the encoder until stopped or the stream
/// ends, then flush the final fragment.
async fn run_pump(
    mut frames: mpsc::Receiver<AudioFrame>,
    mut encoder: Box<dyn AudioEncoder>,
    fragments: Arc<Mutex<Vec<Vec<u8>>>>,
    mut stop_rx: oneshot::Receiver<()>,
    timeslice: bool,
) {
    let mut slicer = tokio::time::interval(Duration::from_millis(FRAGMENT_INTERVAL_MS));

    loop {
        tokio::select! {
            _ = &mut stop_rx => break,
            maybe = frames.recv() => match maybe {
                Some(frame) => encoder.push(&frame),
                None => break,
            },
            _ = slicer.tick(), if timeslice => {
                if let Some(fragment) = encoder.poll_fragment() {
                    if !fragment.is_empty() {
                        fragments.lock().unwrap().push(fragment);
                    }
                }
            }
        }
    }

    // Drain whatever the device already queued before the stop landed.
    while let Ok(frame) = frames.try_recv() {
        encoder.push(&frame);
    }

    let tail = encoder.finish();
    if !tail.is_empty() {
        fragments.lock().unwrap().push(tail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::encoder::WavEncoder;
    use crate::audio::replay::{frames_from_samples, ReplayDevice};
    use crate::audio::StreamSpec;

    /// Emits one fragment per pushed frame, in push order.
    struct ChunkEncoder {
        queued: Vec<Vec<u8>>,
    }

    impl ChunkEncoder {
        fn new() -> Self {
            Self { queued: Vec::new() }
        }
    }

    impl AudioEncoder for ChunkEncoder {
        fn supports(&self, encoding: AudioEncoding) -> bool {
            matches!(encoding, AudioEncoding::WebmOpus)
        }

        fn begin(&mut self, _encoding: AudioEncoding, _spec: StreamSpec) {}

        fn push(&mut self, frame: &AudioFrame) {
            let bytes = frame
                .samples
                .iter()
                .flat_map(|s| s.to_le_bytes())
                .collect();
            self.queued.push(bytes);
        }

        fn poll_fragment(&mut self) -> Option<Vec<u8>> {
            if self.queued.is_empty() {
                None
            } else {
                Some(self.queued.remove(0))
            }
        }

        fn finish(self: Box<Self>) -> Vec<u8> {
            self.queued.concat()
        }
    }

    fn interim_options() -> RecordingOptions {
        RecordingOptions {
            continuous: true,
            interim_results: true,
            ..RecordingOptions::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fragments_concatenate_in_capture_order() {
        let frames = vec![
            AudioFrame {
                samples: vec![0x0101],
                sample_rate: 16_000,
                channels: 1,
                timestamp_ms: 0,
            },
            AudioFrame {
                samples: vec![0x0202],
                sample_rate: 16_000,
                channels: 1,
                timestamp_ms: 300,
            },
            AudioFrame {
                samples: vec![0x0303],
                sample_rate: 16_000,
                channels: 1,
                timestamp_ms: 600,
            },
        ];
        let device: Arc<ReplayDevice> = Arc::new(ReplayDevice::paced(
            frames,
            Duration::from_millis(300),
        ));
        let capture: Arc<dyn CaptureDevice> = device.clone();

        let mut session =
            CaptureSession::start(&capture, Box::new(ChunkEncoder::new()), &interim_options())
                .await
                .unwrap();

        // Let several fragment intervals elapse while frames trickle in.
        tokio::time::sleep(Duration::from_millis(3_500)).await;

        let artifact = session.stop().await.unwrap();
        assert_eq!(artifact.bytes, vec![0x01, 0x01, 0x02, 0x02, 0x03, 0x03]);

        session.dispose();
        assert_eq!(device.live_handles(), 0);
    }

    #[tokio::test]
    async fn immediate_stop_reports_empty_recording() {
        let device: Arc<dyn CaptureDevice> = Arc::new(ReplayDevice::new(Vec::new()));

        let mut session = CaptureSession::start(
            &device,
            Box::new(WavEncoder::new()),
            &RecordingOptions::default(),
        )
        .await
        .unwrap();

        let err = session.stop().await.unwrap_err();
        assert!(matches!(err, CaptureError::EmptyRecording));
    }

    #[tokio::test]
    async fn second_stop_is_rejected() {
        let frames = frames_from_samples(&[5i16; 160], 16_000, 1, 160);
        let device: Arc<dyn CaptureDevice> = Arc::new(ReplayDevice::new(frames));

        let mut session = CaptureSession::start(
            &device,
            Box::new(WavEncoder::new()),
            &RecordingOptions::default(),
        )
        .await
        .unwrap();

        assert!(session.stop().await.is_ok());
        let err = session.stop().await.unwrap_err();
        assert!(matches!(err, CaptureError::NotRecording));
    }

    #[tokio::test]
    async fn dispose_releases_tracks_on_every_path() {
        // Success path
        let frames = frames_from_samples(&[7i16; 160], 16_000, 1, 160);
        let device = Arc::new(ReplayDevice::new(frames));
        let capture: Arc<dyn CaptureDevice> = device.clone();
        let mut session = CaptureSession::start(
            &capture,
            Box::new(WavEncoder::new()),
            &RecordingOptions::default(),
        )
        .await
        .unwrap();
        session.stop().await.unwrap();
        session.dispose();
        assert_eq!(device.live_handles(), 0);

        // Empty-recording path
        let device = Arc::new(ReplayDevice::new(Vec::new()));
        let capture: Arc<dyn CaptureDevice> = device.clone();
        let mut session = CaptureSession::start(
            &capture,
            Box::new(WavEncoder::new()),
            &RecordingOptions::default(),
        )
        .await
        .unwrap();
        assert!(session.stop().await.is_err());
        session.dispose();
        assert_eq!(device.live_handles(), 0);
    }

    #[tokio::test]
    async fn dispose_before_stop_discards_the_recording() {
        let frames = frames_from_samples(&[9i16; 320], 16_000, 1, 160);
        let device = Arc::new(ReplayDevice::new(frames));
        let capture: Arc<dyn CaptureDevice> = device.clone();

        let mut session = CaptureSession::start(
            &capture,
            Box::new(WavEncoder::new()),
            &RecordingOptions::default(),
        )
        .await
        .unwrap();

        session.dispose();
        assert_eq!(session.state(), SessionState::Disposed);
        assert_eq!(device.live_handles(), 0);

        let err = session.stop().await.unwrap_err();
        assert!(matches!(err, CaptureError::NotRecording));

        // Safe to call again from the disposed state.
        session.dispose();
    }

    #[tokio::test]
    async fn device_refusal_propagates_at_start() {
        let device: Arc<dyn CaptureDevice> = Arc::new(ReplayDevice::refusing("permission denied"));

        let err = CaptureSession::start(
            &device,
            Box::new(WavEncoder::new()),
            &RecordingOptions::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CaptureError::DeviceUnavailable(_)));
    }

    #[tokio::test]
    async fn stop_only_capture_yields_a_single_wav_artifact() {
        let frames = frames_from_samples(&[100i16; 1_600], 16_000, 1, 160);
        let device: Arc<dyn CaptureDevice> = Arc::new(ReplayDevice::new(frames));

        let mut session = CaptureSession::start(
            &device,
            Box::new(WavEncoder::new()),
            &RecordingOptions::default(),
        )
        .await
        .unwrap();

        let artifact = session.stop().await.unwrap();
        assert_eq!(artifact.encoding, AudioEncoding::Wav);
        assert_eq!(artifact.file_name(), "recording.wav");
        assert!(!artifact.is_empty());

        let reader = hound::WavReader::new(std::io::Cursor::new(artifact.bytes)).unwrap();
        assert_eq!(reader.len(), 1_600);
    }
}
