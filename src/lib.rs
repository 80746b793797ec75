//! Voice-to-text capture pipeline
//!
//! Provider-agnostic voice input for the marketplace web app: microphone
//! capture, chunked audio encoding, a live waveform feedback loop, and remote
//! transcription behind a swappable adapter interface.
//!
//! The flow for one recording cycle:
//! 1. [`VoiceInputController`] starts a capture session through the selected
//!    [`adapter::VoiceToTextAdapter`] and activates the waveform monitor.
//! 2. On stop, the session assembles its fragments into one audio artifact,
//!    which the transcription client uploads as a single multipart request.
//! 3. The final transcript reaches the caller through its transcript
//!    callback; failures surface as user-readable error strings and the
//!    controller returns to idle.
//!
//! Device and encoder access go through capability traits
//! ([`audio::CaptureDevice`], [`audio::AudioEncoder`]) so everything above
//! them is testable without hardware.

pub mod adapter;
pub mod audio;
pub mod controller;
pub mod settings;
pub mod transcription;

pub use adapter::{
    Provider, ProviderError, RecordingOptions, TranscriptionResult, VoiceToTextAdapter,
    VoiceToTextFactory,
};
pub use audio::{AudioArtifact, CaptureError};
pub use controller::{ControllerState, TranscriptHandler, VoiceInputController};
pub use settings::VoiceSettings;
pub use transcription::TranscriptionClient;
