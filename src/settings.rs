//! Runtime configuration for the voice pipeline.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::adapter::{Provider, DEFAULT_LANGUAGE};

/// Endpoint used when nothing else is configured; matches the web app's own
/// speech-to-text route during local development.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:3000/api/speech-to-text";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    /// Speech-to-text endpoint receiving the multipart upload.
    pub endpoint: String,

    /// BCP 47 language tag sent with each request.
    pub language: String,

    /// Transcription backend tag.
    pub provider: Provider,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            provider: Provider::GoogleCloud,
        }
    }
}

impl VoiceSettings {
    /// Load settings from the environment, reading `.env` first. Unset or
    /// empty variables keep their defaults; a malformed provider tag logs a
    /// warning and keeps the default backend.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();

        if let Some(url) = lookup("SPEECH_TO_TEXT_URL").filter(|v| !v.is_empty()) {
            settings.endpoint = url;
        }
        if let Some(language) = lookup("SPEECH_TO_TEXT_LANGUAGE").filter(|v| !v.is_empty()) {
            settings.language = language;
        }
        if let Some(tag) = lookup("VOICE_PROVIDER").filter(|v| !v.is_empty()) {
            match Provider::from_str(&tag) {
                Ok(provider) => settings.provider = provider,
                Err(e) => log::warn!("Settings: {}; keeping {}", e, settings.provider),
            }
        }

        settings
    }

    /// Load settings from a JSON file, falling back to defaults on a missing
    /// or unreadable file.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<VoiceSettings>(&contents) {
                Ok(settings) => settings,
                Err(e) => {
                    log::warn!("Settings: failed to parse {:?}: {}", path, e);
                    VoiceSettings::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => VoiceSettings::default(),
            Err(e) => {
                log::warn!("Settings: failed to read {:?}: {}", path, e);
                VoiceSettings::default()
            }
        }
    }

    /// Save settings as JSON.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory {:?}: {}", parent, e))?;
        }

        let contents =
            serde_json::to_string_pretty(self).map_err(|e| format!("Serialize settings: {}", e))?;

        // Write atomically: write to a temp file in the same directory, then
        // rename. This prevents a partial settings file if the process dies
        // mid-write.
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &contents)
            .map_err(|e| format!("Write temp settings {:?}: {}", tmp_path, e))?;

        // On Unix, rename atomically replaces the destination. On Windows,
        // rename fails if the destination exists, so remove it first.
        if cfg!(windows) && path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    return Err(format!("Remove existing settings file {:?}: {}", path, e));
                }
            }
        }

        std::fs::rename(&tmp_path, path)
            .map_err(|e| format!("Rename temp settings {:?} to {:?}: {}", tmp_path, path, e))?;
        Ok(())
    }
}
