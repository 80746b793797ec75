//! Google Cloud speech-to-text adapter
//!
//! Captures microphone audio into one artifact and uploads it to the
//! speech-to-text endpoint (which fronts Google Cloud Speech) as a single
//! multipart request. The endpoint's parsed error message travels back to the
//! caller through the result's `error` field; nothing here panics or throws
//! past the adapter boundary.

use std::sync::Arc;

use async_trait::async_trait;

use crate::adapter::{
    EncoderFactory, RecordingOptions, TranscriptionResult, VoiceToTextAdapter,
};
use crate::audio::{CaptureDevice, CaptureError, CaptureSession};

use super::client::TranscriptionClient;

pub struct GoogleCloudAdapter {
    device: Arc<dyn CaptureDevice>,
    encoders: EncoderFactory,
    client: TranscriptionClient,
    session: Option<CaptureSession>,
    language: String,
}

impl GoogleCloudAdapter {
    pub(crate) fn new(
        device: Arc<dyn CaptureDevice>,
        encoders: EncoderFactory,
        client: TranscriptionClient,
    ) -> Self {
        Self {
            device,
            encoders,
            client,
            session: None,
            language: crate::adapter::DEFAULT_LANGUAGE.to_string(),
        }
    }
}

#[async_trait]
impl VoiceToTextAdapter for GoogleCloudAdapter {
    async fn start_recording(&mut self, options: RecordingOptions) -> Result<(), CaptureError> {
        // Starting twice is a caller bug; reject it explicitly rather than
        // silently restarting the session.
        if self.session.is_some() {
            return Err(CaptureError::AlreadyRecording);
        }

        self.language = options.language.clone();
        let session = CaptureSession::start(&self.device, (self.encoders)(), &options).await?;
        self.session = Some(session);
        Ok(())
    }

    async fn stop_recording(&mut self) -> TranscriptionResult {
        let Some(mut session) = self.session.take() else {
            return TranscriptionResult::failure(CaptureError::NotRecording.to_string());
        };

        let stopped = session.stop().await;
        // Release the microphone before the network round-trip; the artifact
        // is already assembled.
        session.dispose();

        let artifact = match stopped {
            Ok(artifact) => artifact,
            Err(err) => return TranscriptionResult::failure(err.to_string()),
        };

        match self.client.transcribe(&artifact, &self.language).await {
            Ok(payload) => TranscriptionResult {
                transcript: payload.transcript,
                confidence: payload.confidence,
                is_final: true,
                error: None,
            },
            Err(err) => TranscriptionResult::failure(err.user_message()),
        }
    }

    fn is_recording(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(CaptureSession::is_recording)
    }

    fn dispose(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.dispose();
        }
    }
}
