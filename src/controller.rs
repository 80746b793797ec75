//! Voice input controller
//!
//! UI-facing state machine for the record button: Idle → Recording →
//! Processing → Idle, with errors surfaced on any transition. The controller
//! wires capture to transcription to the caller's transcript callback, runs
//! the waveform monitor alongside the recording, and guarantees the adapter
//! is disposed after every cycle so device handles never leak across repeated
//! recordings.

use std::sync::Arc;

use crate::adapter::{Provider, RecordingOptions, VoiceToTextAdapter, VoiceToTextFactory};
use crate::audio::{
    CaptureDevice, CaptureError, InputHints, RenderSurface, StreamHandle, WaveformMonitor,
};

/// Message surfaced when the pre-cycle microphone probe fails.
const MIC_UNAVAILABLE_MESSAGE: &str =
    "Microphone not available. Please check permissions and that a microphone is connected.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Recording,
    Processing,
}

/// Receives the final transcript of each successful cycle. Whether to replace
/// or append to existing text is the caller's policy.
pub type TranscriptHandler = Box<dyn Fn(String) + Send>;

pub struct VoiceInputController {
    device: Arc<dyn CaptureDevice>,
    factory: VoiceToTextFactory,
    provider: Provider,
    options: RecordingOptions,
    monitor: WaveformMonitor,
    adapter: Option<Box<dyn VoiceToTextAdapter>>,
    state: ControllerState,
    last_error: Option<String>,
    on_transcript: TranscriptHandler,
}

impl VoiceInputController {
    pub fn new(
        device: Arc<dyn CaptureDevice>,
        factory: VoiceToTextFactory,
        surface: Box<dyn RenderSurface>,
        on_transcript: TranscriptHandler,
    ) -> Self {
        let monitor = WaveformMonitor::new(device.clone(), surface);
        Self {
            device,
            factory,
            provider: Provider::GoogleCloud,
            options: RecordingOptions::default(),
            monitor,
            adapter: None,
            state: ControllerState::Idle,
            last_error: None,
            on_transcript,
        }
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_options(mut self, options: RecordingOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// The most recently surfaced error, cleared when a new cycle starts.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Current waveform amplitude, 0-255.
    pub fn waveform_level(&self) -> u8 {
        self.monitor.level()
    }

    /// The record-button click. Starts a cycle from Idle, stops it from
    /// Recording; clicks while Processing are refused so a new cycle can
    /// never interleave with an outstanding transcription.
    pub async fn handle_click(&mut self) {
        match self.state {
            ControllerState::Idle => self.start_recording().await,
            ControllerState::Recording => self.stop_recording().await,
            ControllerState::Processing => {
                log::debug!("Click ignored while transcription is in progress");
            }
        }
    }

    async fn start_recording(&mut self) {
        self.last_error = None;

        if let Err(err) = self.probe_microphone() {
            log::error!("Microphone probe failed: {}", err);
            self.last_error = Some(MIC_UNAVAILABLE_MESSAGE.to_string());
            return;
        }

        let mut adapter = match self.factory.create(self.provider) {
            Ok(adapter) => adapter,
            Err(err) => {
                log::error!("Voice provider selection failed: {}", err);
                self.last_error = Some(err.to_string());
                return;
            }
        };

        match adapter.start_recording(self.options.clone()).await {
            Ok(()) => {
                self.adapter = Some(adapter);
                self.state = ControllerState::Recording;
                self.monitor.activate();
                log::info!("Recording started ({})", self.provider);
            }
            Err(err) => {
                log::error!("Failed to start recording: {}", err);
                self.last_error = Some(err.to_string());
            }
        }
    }

    async fn stop_recording(&mut self) {
        let Some(mut adapter) = self.adapter.take() else {
            self.state = ControllerState::Idle;
            return;
        };

        // Busy state first: the monitor teardown and the upload below are
        // independent of each other.
        self.state = ControllerState::Processing;
        self.monitor.deactivate().await;

        let result = adapter.stop_recording().await;

        match result.error {
            Some(message) => {
                log::error!("Transcription failed: {}", message);
                self.last_error = Some(message);
            }
            None => {
                // Empty transcripts pass through as-is.
                log::info!("Transcript delivered ({} chars)", result.transcript.len());
                (self.on_transcript)(result.transcript);
            }
        }

        adapter.dispose();
        self.state = ControllerState::Idle;
    }

    /// Open and immediately release the microphone, confirming it is usable
    /// before an adapter is created.
    fn probe_microphone(&self) -> Result<(), CaptureError> {
        let mut opened = self.device.open_input(&InputHints::default())?;
        opened.handle.stop();
        log::debug!("Microphone probe ok on {}", self.device.name());
        Ok(())
    }
}

impl Drop for VoiceInputController {
    fn drop(&mut self) {
        // Teardown exit path: never leak a live adapter.
        if let Some(adapter) = self.adapter.as_mut() {
            adapter.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioEncoder, ReplayDevice, WavEncoder, WaveformBar};
    use crate::transcription::TranscriptionClient;

    struct NullSurface;

    impl RenderSurface for NullSurface {
        fn draw(&mut self, _bars: &[WaveformBar]) {}
        fn clear(&mut self) {}
    }

    fn controller_for(device: Arc<ReplayDevice>) -> VoiceInputController {
        let factory = VoiceToTextFactory::new(
            device.clone(),
            Arc::new(|| Box::new(WavEncoder::new()) as Box<dyn AudioEncoder>),
            TranscriptionClient::new("http://localhost:9/api/speech-to-text"),
        );
        VoiceInputController::new(device, factory, Box::new(NullSurface), Box::new(|_| {}))
    }

    #[test]
    fn starts_idle_with_no_error() {
        let controller = controller_for(Arc::new(ReplayDevice::new(Vec::new())));
        assert_eq!(controller.state(), ControllerState::Idle);
        assert!(controller.last_error().is_none());
        assert_eq!(controller.waveform_level(), 0);
    }

    #[tokio::test]
    async fn refused_device_keeps_the_controller_idle() {
        let device = Arc::new(ReplayDevice::refusing("permission denied"));
        let mut controller = controller_for(device.clone());

        controller.handle_click().await;

        assert_eq!(controller.state(), ControllerState::Idle);
        assert_eq!(controller.last_error(), Some(MIC_UNAVAILABLE_MESSAGE));
        assert_eq!(device.live_handles(), 0);
    }

    #[tokio::test]
    async fn unimplemented_provider_surfaces_at_selection() {
        let device = Arc::new(ReplayDevice::new(Vec::new()));
        let mut controller = controller_for(device.clone()).with_provider(Provider::Aws);

        controller.handle_click().await;

        assert_eq!(controller.state(), ControllerState::Idle);
        assert_eq!(
            controller.last_error(),
            Some("AWS Transcribe adapter not yet implemented")
        );
        // Only the probe touched the device, and it released its handle.
        assert_eq!(device.opens(), 1);
        assert_eq!(device.live_handles(), 0);
    }
}
