//! Engine backend that shells out to a synthesis command line.
//!
//! The default program is the Coqui `tts` CLI. Each call writes to a
//! uniquely named temporary WAV file which is read back and removed.
//!
//! `load` only checks that the program runs (`--help`). Every synthesis
//! starts a fresh process that loads the model weights again, so with
//! this backend the cache holds cheap handles rather than warm models.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{EngineBackend, EngineCapabilities, SynthesisEngine, SynthesisOptions};
use crate::model::ModelKey;

/// Languages accepted by the multilingual engine
const MULTILINGUAL_LANGUAGES: &[&str] = &[
    "en", "es", "fr", "de", "it", "pt", "pl", "tr", "ru", "nl", "cs", "ar", "zh-cn", "hu", "ko",
    "ja", "hi",
];

/// Declared capabilities for one model key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Model key the entry describes
    pub model: ModelKey,
    /// Capabilities the engine is loaded with
    #[serde(flatten)]
    pub capabilities: EngineCapabilities,
}

/// Command backend configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandEngineConfig {
    /// Program to run
    pub program: PathBuf,
    /// Directory for temporary output files
    pub work_dir: Option<PathBuf>,
    /// Per-model capabilities; unknown models load as single-speaker,
    /// single-language engines
    pub catalog: Vec<CatalogEntry>,
}

impl Default for CommandEngineConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("tts"),
            work_dir: None,
            catalog: default_catalog(),
        }
    }
}

fn default_catalog() -> Vec<CatalogEntry> {
    vec![
        CatalogEntry {
            model: ModelKey::default_engine(),
            capabilities: EngineCapabilities::single(),
        },
        CatalogEntry {
            model: ModelKey::multilingual(),
            capabilities: EngineCapabilities {
                multi_speaker: true,
                speakers: Vec::new(),
                multi_lingual: true,
                languages: MULTILINGUAL_LANGUAGES.iter().map(ToString::to_string).collect(),
                voice_cloning: true,
            },
        },
    ]
}

/// Loads [`CommandEngine`]s from a [`CommandEngineConfig`]
#[derive(Debug, Clone)]
pub struct CommandBackend {
    config: CommandEngineConfig,
}

impl CommandBackend {
    /// Create a backend from configuration
    #[must_use]
    pub fn new(config: CommandEngineConfig) -> Self {
        Self { config }
    }

    fn capabilities_for(&self, key: &ModelKey) -> EngineCapabilities {
        self.config
            .catalog
            .iter()
            .find(|entry| &entry.model == key)
            .map(|entry| entry.capabilities.clone())
            .unwrap_or_default()
    }

    fn work_dir(&self) -> PathBuf {
        self.config
            .work_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

impl EngineBackend for CommandBackend {
    fn load(&self, key: &ModelKey) -> Result<Box<dyn SynthesisEngine>> {
        let program = &self.config.program;
        let status = Command::new(program)
            .arg("--help")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .with_context(|| format!("Failed to run synthesis program {}", program.display()))?;
        if !status.success() {
            bail!("Synthesis program {} exited with {status}", program.display());
        }

        let capabilities = self.capabilities_for(key);
        info!(model = %key, ?capabilities, "Command engine ready");

        Ok(Box::new(CommandEngine {
            program: program.clone(),
            key: key.clone(),
            capabilities,
            work_dir: self.work_dir(),
        }))
    }
}

/// One model served through the synthesis command line
#[derive(Debug)]
pub struct CommandEngine {
    program: PathBuf,
    key: ModelKey,
    capabilities: EngineCapabilities,
    work_dir: PathBuf,
}

impl CommandEngine {
    fn build_command(&self, text: &str, options: &SynthesisOptions, out_path: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("--model_name")
            .arg(self.key.as_str())
            .arg(format!("--text={text}"))
            .arg("--out_path")
            .arg(out_path);
        if let Some(speaker) = &options.speaker {
            command.arg("--speaker_idx").arg(speaker);
        }
        if let Some(language) = &options.language {
            command.arg("--language_idx").arg(language);
        }
        if let Some(reference) = &options.reference_audio {
            command.arg("--speaker_wav").arg(reference.path());
        }
        command.stdin(Stdio::null());
        command
    }
}

impl SynthesisEngine for CommandEngine {
    fn capabilities(&self) -> EngineCapabilities {
        self.capabilities.clone()
    }

    fn synthesize(&mut self, text: &str, options: &SynthesisOptions) -> Result<Vec<u8>> {
        let out_path = self.work_dir.join(format!("murmur-{}.wav", Uuid::new_v4()));
        debug!(model = %self.key, path = ?out_path, "Running synthesis command");

        let output = self
            .build_command(text, options, &out_path)
            .output()
            .with_context(|| format!("Failed to run {}", self.program.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            let _ = std::fs::remove_file(&out_path);
            bail!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
            );
        }

        let audio = std::fs::read(&out_path)
            .with_context(|| format!("Synthesis produced no output at {}", out_path.display()))?;
        if let Err(e) = std::fs::remove_file(&out_path) {
            warn!("Failed to remove temporary output {:?}: {}", out_path, e);
        }
        Ok(audio)
    }
}
