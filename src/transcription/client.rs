//! HTTP client for the speech-to-text endpoint
//!
//! Uploads one finished audio artifact as a multipart request and parses the
//! JSON result. One request per recording cycle; failures are never retried
//! automatically.

use std::sync::OnceLock;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;

use crate::audio::AudioArtifact;

/// Global HTTP client for reuse across requests (avoids TLS handshake overhead)
static HTTP_CLIENT: OnceLock<Client> = OnceLock::new();

fn http_client() -> &'static Client {
    HTTP_CLIENT.get_or_init(|| {
        Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to build HTTP client")
    })
}

/// Errors that can occur during a transcription upload.
#[derive(Debug, Clone)]
pub enum UploadError {
    /// Network/HTTP transport error.
    Network(String),
    /// The endpoint returned a non-2xx status. `message` is the structured
    /// error from the body when one could be parsed, or a synthesized message
    /// naming the status.
    Api { status: u16, message: String },
    /// The response body did not parse.
    Parse(String),
}

impl UploadError {
    /// The string surfaced to the user. API errors surface the server's own
    /// message verbatim.
    pub fn user_message(&self) -> String {
        match self {
            UploadError::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl std::fmt::Display for UploadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadError::Network(e) => write!(f, "Network error: {}", e),
            UploadError::Api { status, message } => {
                write!(f, "Transcription service error ({}): {}", status, message)
            }
            UploadError::Parse(e) => write!(f, "Failed to parse transcription response: {}", e),
        }
    }
}

impl std::error::Error for UploadError {}

/// Success response from the speech-to-text endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptPayload {
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default, rename = "isFinal")]
    pub is_final: bool,
}

/// Structured error body, `{ "error": "..." }`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Client for one speech-to-text endpoint.
#[derive(Debug, Clone)]
pub struct TranscriptionClient {
    endpoint: String,
}

impl TranscriptionClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Upload `artifact` and return the parsed transcript.
    pub async fn transcribe(
        &self,
        artifact: &AudioArtifact,
        language: &str,
    ) -> Result<TranscriptPayload, UploadError> {
        let file_name = artifact.file_name();
        log::info!(
            "Uploading {} ({} bytes, {}) for transcription",
            file_name,
            artifact.len(),
            language
        );

        let audio_part = Part::bytes(artifact.bytes.clone())
            .file_name(file_name)
            .mime_str(artifact.encoding.mime_type())
            .map_err(|e| UploadError::Parse(e.to_string()))?;

        let form = Form::new()
            .part("audio", audio_part)
            .text("language", language.to_string());

        let response = http_client()
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;

        let status = response.status();

        if status.is_success() {
            let payload: TranscriptPayload = response
                .json()
                .await
                .map_err(|e| UploadError::Parse(e.to_string()))?;

            log::info!(
                "Transcription successful: {} chars (confidence={:?})",
                payload.transcript.len(),
                payload.confidence
            );

            Ok(payload)
        } else {
            let body = response.text().await.unwrap_or_default();

            let message = match serde_json::from_str::<ErrorBody>(&body) {
                Ok(parsed) => parsed.error,
                Err(_) => format!(
                    "Transcription request failed with status {}",
                    status.as_u16()
                ),
            };

            log::error!("Transcription endpoint error ({}): {}", status, message);

            Err(UploadError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display_includes_status_and_message() {
        let err = UploadError::Api {
            status: 500,
            message: "quota exceeded".to_string(),
        };
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[test]
    fn api_error_surfaces_the_server_message_verbatim() {
        let err = UploadError::Api {
            status: 500,
            message: "quota exceeded".to_string(),
        };
        assert_eq!(err.user_message(), "quota exceeded");
    }

    #[test]
    fn transport_errors_surface_with_context() {
        let err = UploadError::Network("connection refused".to_string());
        assert_eq!(err.user_message(), "Network error: connection refused");
    }

    #[test]
    fn payload_tolerates_missing_optional_fields() {
        let payload: TranscriptPayload =
            serde_json::from_str(r#"{"transcript":"hello"}"#).unwrap();
        assert_eq!(payload.transcript, "hello");
        assert_eq!(payload.confidence, None);
        assert!(!payload.is_final);
    }

    #[test]
    fn payload_parses_the_full_response_shape() {
        let payload: TranscriptPayload = serde_json::from_str(
            r#"{"transcript":"hello world","confidence":0.95,"isFinal":true}"#,
        )
        .unwrap();
        assert_eq!(payload.transcript, "hello world");
        assert_eq!(payload.confidence, Some(0.95));
        assert!(payload.is_final);
    }
}
