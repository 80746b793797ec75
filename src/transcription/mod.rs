//! Remote transcription for voice input
//!
//! This module handles turning a finished audio artifact into text via the
//! speech-to-text endpoint.

mod client;
mod google_cloud;

pub use client::{TranscriptPayload, TranscriptionClient, UploadError};
pub use google_cloud::GoogleCloudAdapter;
