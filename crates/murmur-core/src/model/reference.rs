//! Reference recording used by voice-cloning engines.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{MurmurError, MurmurResult};
use crate::model::ModelKey;

/// Public sample used when no reference recording exists locally
pub const DEFAULT_REFERENCE_URL: &str =
    "https://github.com/coqui-ai/TTS/raw/dev/tests/inputs/audio/ljspeech_1.wav";

/// Sentence synthesized when the reference has to be generated locally
pub const DEFAULT_REFERENCE_TEXT: &str = "This is a reference audio for voice cloning.";

/// A validated WAV file on disk. Read-only once published.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceAudio {
    path: PathBuf,
    sample_rate: u32,
    channels: u16,
    duration: Duration,
}

impl ReferenceAudio {
    /// Open and validate a WAV file
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or is not a readable WAV file.
    pub fn open<P: AsRef<Path>>(path: P) -> MurmurResult<Self> {
        let path = path.as_ref();
        let reader = hound::WavReader::open(path).map_err(|e| {
            MurmurError::file(format!("Invalid reference audio {}: {e}", path.display()))
        })?;
        let spec = reader.spec();
        if spec.sample_rate == 0 || spec.channels == 0 {
            return Err(MurmurError::file(format!(
                "Reference audio {} has an empty format",
                path.display()
            )));
        }
        let frames = reader.duration();
        Ok(Self {
            path: path.to_path_buf(),
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            duration: Duration::from_secs_f64(f64::from(frames) / f64::from(spec.sample_rate)),
        })
    }

    /// Write `bytes` to `path` and validate the result
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or is not valid WAV.
    pub fn store<P: AsRef<Path>>(path: P, bytes: &[u8]) -> MurmurResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bytes)?;
        match Self::open(path) {
            Ok(audio) => Ok(audio),
            Err(e) => {
                let _ = std::fs::remove_file(path);
                Err(e)
            }
        }
    }

    /// Path of the recording
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of channels
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Length of the recording
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

/// Where the reference recording comes from, tried in order:
/// an existing file, a download, then local synthesis with a fallback model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceAudioConfig {
    /// Location of the recording on disk
    pub path: PathBuf,
    /// URL to download from when the file is missing
    pub download_url: Option<String>,
    /// Model used to synthesize a recording when the download fails
    pub fallback_model: Option<ModelKey>,
    /// Sentence the fallback model speaks
    pub fallback_text: String,
    /// Download timeout in seconds
    pub download_timeout_secs: u64,
}

impl Default for ReferenceAudioConfig {
    fn default() -> Self {
        Self {
            path: default_reference_path(),
            download_url: Some(DEFAULT_REFERENCE_URL.to_string()),
            fallback_model: Some(ModelKey::default_engine()),
            fallback_text: DEFAULT_REFERENCE_TEXT.to_string(),
            download_timeout_secs: 30,
        }
    }
}

impl ReferenceAudioConfig {
    /// Configuration that only ever uses an existing file
    pub fn local_only<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            download_url: None,
            fallback_model: None,
            ..Self::default()
        }
    }
}

fn default_reference_path() -> PathBuf {
    directories::ProjectDirs::from("ai", "Murmur", "murmur")
        .map(|dirs| dirs.cache_dir().join("reference_audio.wav"))
        .unwrap_or_else(|| PathBuf::from("reference_audio.wav"))
}

/// Download `url` into `path` and validate it
///
/// # Errors
///
/// Returns an error on network failure, non-success status or invalid WAV.
pub async fn download(url: &str, path: &Path, timeout: Duration) -> MurmurResult<ReferenceAudio> {
    info!("Downloading reference audio from {}", url);
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| MurmurError::transport(format!("Failed to build HTTP client: {e}")))?;
    let response = client.get(url).send().await?.error_for_status()?;
    let bytes = response.bytes().await?;

    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || ReferenceAudio::store(&path, &bytes))
        .await
        .map_err(|e| MurmurError::file(format!("Reference audio task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_tone(path: &Path, sample_rate: u32, frames: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            let sample = ((i % 100) as i16 - 50) * 100;
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_open_valid_wav() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ref.wav");
        write_tone(&path, 22_050, 22_050);

        let audio = ReferenceAudio::open(&path).unwrap();
        assert_eq!(audio.sample_rate(), 22_050);
        assert_eq!(audio.channels(), 1);
        assert_eq!(audio.duration(), Duration::from_secs(1));
        assert_eq!(audio.path(), path.as_path());
    }

    #[test]
    fn test_open_rejects_non_wav() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ref.wav");
        std::fs::write(&path, b"<html>not audio</html>").unwrap();

        let err = ReferenceAudio::open(&path).unwrap_err();
        assert_eq!(err.category(), "file");
    }

    #[test]
    fn test_store_removes_invalid_payload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("ref.wav");

        assert!(ReferenceAudio::store(&path, b"garbage").is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_local_only_config_has_no_fallbacks() {
        let config = ReferenceAudioConfig::local_only("/tmp/ref.wav");
        assert!(config.download_url.is_none());
        assert!(config.fallback_model.is_none());
    }
}
