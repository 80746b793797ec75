//! Audio capture for voice input
//!
//! This module handles microphone acquisition, PCM encoding, capture sessions,
//! and the waveform monitor. Device and encoder access go through capability
//! traits so the pipeline runs against real hardware (CPAL + hound) or scripted
//! frames in tests.

pub mod device;
pub mod encoder;
pub mod replay;
pub mod session;
pub mod waveform;

pub use device::{
    AudioFrame, CaptureDevice, CpalDevice, InputHints, OpenInput, StreamHandle, StreamSpec,
};
pub use encoder::{negotiate_encoding, AudioEncoder, AudioEncoding, WavEncoder};
pub use replay::{frames_from_samples, ReplayDevice};
pub use session::{AudioArtifact, CaptureSession, SessionState};
pub use waveform::{FrequencyAnalyzer, RenderSurface, WaveformBar, WaveformMonitor};

/// Errors that can occur while acquiring the microphone or running a capture
/// session.
#[derive(Debug, Clone)]
pub enum CaptureError {
    /// The platform denied microphone access or has no input device.
    DeviceUnavailable(String),
    /// The session captured zero bytes of audio.
    EmptyRecording,
    /// A start was requested while a recording is already in progress.
    AlreadyRecording,
    /// A stop was requested with no recording in progress.
    NotRecording,
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::DeviceUnavailable(detail) => {
                write!(f, "Failed to access microphone: {}", detail)
            }
            CaptureError::EmptyRecording => {
                write!(f, "No audio was recorded. Please check your microphone.")
            }
            CaptureError::AlreadyRecording => write!(f, "Recording already in progress"),
            CaptureError::NotRecording => write!(f, "No recording in progress"),
        }
    }
}

impl std::error::Error for CaptureError {}
