//! Voice-to-text adapter interface and provider factory
//!
//! The adapter trait is the capability boundary between callers and a
//! specific transcription backend: swap the provider without touching the
//! controller. Exactly one backend is functional (`google-cloud`); the other
//! tags fail fast at selection time.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::audio::{AudioEncoder, CaptureDevice, CaptureError};
use crate::transcription::{GoogleCloudAdapter, TranscriptionClient};

/// Language tag sent with requests when the caller does not override it.
pub const DEFAULT_LANGUAGE: &str = "en-NZ";

/// Options for one recording cycle.
#[derive(Debug, Clone)]
pub struct RecordingOptions {
    /// BCP 47 language tag forwarded to the transcription service.
    pub language: String,
    /// Keep capturing across pauses in speech.
    pub continuous: bool,
    /// Request partial transcripts while recording. Together with
    /// `continuous` this switches fragment collection to a 1-second cadence;
    /// interim delivery itself is not implemented yet.
    pub interim_results: bool,
}

impl Default for RecordingOptions {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            continuous: false,
            interim_results: false,
        }
    }
}

/// Outcome of one recording cycle. Failures are carried in `error`;
/// `stop_recording` itself never fails.
#[derive(Debug, Clone, Default)]
pub struct TranscriptionResult {
    pub transcript: String,
    pub confidence: Option<f32>,
    pub is_final: bool,
    pub error: Option<String>,
}

impl TranscriptionResult {
    /// A final result carrying only an error message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            transcript: String::new(),
            confidence: None,
            is_final: true,
            error: Some(message.into()),
        }
    }
}

/// Callback for partial transcripts while recording.
pub type InterimHandler = Box<dyn Fn(TranscriptionResult) + Send>;

/// A swappable transcription backend.
#[async_trait]
pub trait VoiceToTextAdapter: Send {
    /// Acquire the microphone and begin capturing.
    async fn start_recording(&mut self, options: RecordingOptions) -> Result<(), CaptureError>;

    /// Stop capturing and transcribe what was recorded. Failures are encoded
    /// in the result's `error` field.
    async fn stop_recording(&mut self) -> TranscriptionResult;

    fn is_recording(&self) -> bool;

    /// Register a callback for partial transcripts. Default: ignored — no
    /// bundled backend delivers interim results yet.
    fn on_interim_result(&mut self, _handler: InterimHandler) {}

    /// Release all device resources. Idempotent, safe from any state.
    fn dispose(&mut self);
}

/// Named transcription backends selectable through the factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    GoogleCloud,
    WebSpeech,
    Azure,
    Aws,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::GoogleCloud => "google-cloud",
            Provider::WebSpeech => "web-speech",
            Provider::Azure => "azure",
            Provider::Aws => "aws",
        }
    }

    fn display_name(&self) -> &'static str {
        match self {
            Provider::GoogleCloud => "Google Cloud Speech-to-Text",
            Provider::WebSpeech => "Web Speech API",
            Provider::Azure => "Azure Speech",
            Provider::Aws => "AWS Transcribe",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ProviderError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "google-cloud" => Ok(Provider::GoogleCloud),
            "web-speech" => Ok(Provider::WebSpeech),
            "azure" => Ok(Provider::Azure),
            "aws" => Ok(Provider::Aws),
            other => Err(ProviderError::UnknownProvider(other.to_string())),
        }
    }
}

/// Selection-time failures. These are raised by the factory, never at use
/// time.
#[derive(Debug, Clone)]
pub enum ProviderError {
    NotImplemented(Provider),
    UnknownProvider(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::NotImplemented(provider) => {
                write!(f, "{} adapter not yet implemented", provider.display_name())
            }
            ProviderError::UnknownProvider(tag) => write!(f, "Unknown voice provider: {}", tag),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Builds a fresh encoder for each recording cycle.
pub type EncoderFactory = Arc<dyn Fn() -> Box<dyn AudioEncoder> + Send + Sync>;

/// Creates adapter instances for a provider tag.
pub struct VoiceToTextFactory {
    device: Arc<dyn CaptureDevice>,
    encoders: EncoderFactory,
    client: TranscriptionClient,
}

impl VoiceToTextFactory {
    pub fn new(
        device: Arc<dyn CaptureDevice>,
        encoders: EncoderFactory,
        client: TranscriptionClient,
    ) -> Self {
        Self {
            device,
            encoders,
            client,
        }
    }

    /// Select an implementation. Unimplemented providers fail here, before
    /// any device or network interaction.
    pub fn create(&self, provider: Provider) -> Result<Box<dyn VoiceToTextAdapter>, ProviderError> {
        match provider {
            Provider::GoogleCloud => Ok(Box::new(GoogleCloudAdapter::new(
                self.device.clone(),
                self.encoders.clone(),
                self.client.clone(),
            ))),
            other => Err(ProviderError::NotImplemented(other)),
        }
    }
}
