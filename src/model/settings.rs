use std::path::Path;

use base64::{engine::general_purpose::STANDARD as B64, Engine};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest accepted custom alarm clip, before encoding.
pub const MAX_CUSTOM_AUDIO_BYTES: usize = 500 * 1024;

pub const DEFAULT_VOLUME: f32 = 0.8;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Audio file is too large ({0} bytes, max {MAX_CUSTOM_AUDIO_BYTES})")]
    TooLarge(usize),
    #[error("Unsupported audio format {0}")]
    UnsupportedFormat(String),
    #[error("Malformed audio data: {0}")]
    Malformed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// User supplied alarm clip kept as a `data:` URI, the form it is persisted in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CustomAudio(String);

impl CustomAudio {
    pub fn from_bytes(bytes: &[u8], mime: &str) -> Result<Self, AudioError> {
        if bytes.len() > MAX_CUSTOM_AUDIO_BYTES {
            return Err(AudioError::TooLarge(bytes.len()));
        }
        Ok(Self(format!("data:{mime};base64,{}", B64.encode(bytes))))
    }

    pub fn from_file(path: &Path) -> Result<Self, AudioError> {
        let extension = path
            .extension()
            .map(|v| v.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let mime = match extension.as_str() {
            "mp3" => "audio/mpeg",
            "wav" => "audio/wav",
            "ogg" | "oga" => "audio/ogg",
            other => return Err(AudioError::UnsupportedFormat(other.to_string())),
        };
        let size = std::fs::metadata(path)?.len() as usize;
        if size > MAX_CUSTOM_AUDIO_BYTES {
            return Err(AudioError::TooLarge(size));
        }
        Self::from_bytes(&std::fs::read(path)?, mime)
    }

    pub fn mime(&self) -> &str {
        self.0
            .strip_prefix("data:")
            .and_then(|v| v.split(';').next())
            .unwrap_or_default()
    }

    pub fn decode(&self) -> Result<Vec<u8>, AudioError> {
        let (_, data) = self
            .0
            .split_once(";base64,")
            .ok_or_else(|| AudioError::Malformed("missing base64 marker".into()))?;
        B64.decode(data)
            .map_err(|e| AudioError::Malformed(e.to_string()))
    }

    pub fn as_data_uri(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CustomAudio {
    type Error = AudioError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if !value.starts_with("data:") {
            return Err(AudioError::Malformed("not a data uri".into()));
        }
        let audio = CustomAudio(value);
        let size = audio.decode()?.len();
        if size > MAX_CUSTOM_AUDIO_BYTES {
            return Err(AudioError::TooLarge(size));
        }
        Ok(audio)
    }
}

impl From<CustomAudio> for String {
    fn from(value: CustomAudio) -> Self {
        value.0
    }
}

/// Scalar preferences. Each field is stored under its own key.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// 0.0 - 1.0
    pub audio_volume: f32,
    pub custom_audio: Option<CustomAudio>,
    pub dark_mode: bool,
    pub notifications_enabled: bool,
    pub animations_enabled: bool,
    pub current_view: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            audio_volume: DEFAULT_VOLUME,
            custom_audio: None,
            dark_mode: false,
            notifications_enabled: true,
            animations_enabled: true,
            current_view: "dashboard".into(),
        }
    }
}

impl Settings {
    pub fn set_volume(&mut self, volume: f32) {
        self.audio_volume = volume.clamp(0., 1.);
    }
}
