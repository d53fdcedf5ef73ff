//! Shared fakes for integration tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use murmur_core::client::HostResolver;
use murmur_core::{EngineBackend, EngineCapabilities, ModelKey, SynthesisEngine, SynthesisOptions};
use parking_lot::Mutex;

/// Text that makes [`FakeEngine`] fail
pub const FAILING_TEXT: &str = "please fail";

/// Mono 16-bit WAV of `frames` samples at 22.05 kHz
pub fn wav_bytes(frames: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 22_050,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut buffer = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut buffer), spec).unwrap();
        for i in 0..frames {
            writer.write_sample(((i % 64) as i16 - 32) * 200).unwrap();
        }
        writer.finalize().unwrap();
    }
    buffer
}

/// Write a short WAV file to `path`
pub fn write_wav(path: &Path) {
    std::fs::write(path, wav_bytes(2_205)).unwrap();
}

/// One call made to a fake engine
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: ModelKey,
    pub text: String,
    pub options: SynthesisOptions,
}

/// Capabilities of the multilingual fake: languages and cloning, no named speakers
pub fn multilingual_caps() -> EngineCapabilities {
    EngineCapabilities {
        multi_speaker: true,
        speakers: Vec::new(),
        multi_lingual: true,
        languages: vec!["en".to_string(), "zh-cn".to_string()],
        voice_cloning: true,
    }
}

/// Backend that counts loads per key and records every synthesis call
#[derive(Default)]
pub struct FakeBackend {
    loads: Mutex<HashMap<ModelKey, usize>>,
    delays: Mutex<HashMap<ModelKey, Duration>>,
    failing: Mutex<HashSet<ModelKey>>,
    catalog: HashMap<ModelKey, EngineCapabilities>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl FakeBackend {
    /// Default key plain, multilingual key with languages and cloning
    pub fn new() -> Self {
        let mut catalog = HashMap::new();
        catalog.insert(ModelKey::default_engine(), EngineCapabilities::single());
        catalog.insert(ModelKey::multilingual(), multilingual_caps());
        Self {
            catalog,
            ..Self::default()
        }
    }

    /// Make every load of `key` take `delay`
    pub fn with_delay(self, key: &str, delay: Duration) -> Self {
        self.delays.lock().insert(ModelKey::from(key), delay);
        self
    }

    /// Make loads of `key` fail until [`FakeBackend::heal`]
    pub fn with_failure(self, key: &str) -> Self {
        self.failing.lock().insert(ModelKey::from(key));
        self
    }

    /// Let `key` load again
    pub fn heal(&self, key: &str) {
        self.failing.lock().remove(&ModelKey::from(key));
    }

    /// Load attempts for `key`, successful or not
    pub fn loads(&self, key: &str) -> usize {
        self.loads.lock().get(&ModelKey::from(key)).copied().unwrap_or(0)
    }

    /// Every synthesis call so far
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }
}

impl EngineBackend for FakeBackend {
    fn load(&self, key: &ModelKey) -> anyhow::Result<Box<dyn SynthesisEngine>> {
        *self.loads.lock().entry(key.clone()).or_insert(0) += 1;
        let delay = self.delays.lock().get(key).copied();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        if self.failing.lock().contains(key) {
            anyhow::bail!("weights for {key} are missing");
        }
        Ok(Box::new(FakeEngine {
            model: key.clone(),
            capabilities: self.catalog.get(key).cloned().unwrap_or_default(),
            calls: Arc::clone(&self.calls),
        }))
    }
}

/// Engine that returns a short WAV and records its inputs
pub struct FakeEngine {
    model: ModelKey,
    capabilities: EngineCapabilities,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl SynthesisEngine for FakeEngine {
    fn capabilities(&self) -> EngineCapabilities {
        self.capabilities.clone()
    }

    fn synthesize(&mut self, text: &str, options: &SynthesisOptions) -> anyhow::Result<Vec<u8>> {
        self.calls.lock().push(RecordedCall {
            model: self.model.clone(),
            text: text.to_string(),
            options: options.clone(),
        });
        if text == FAILING_TEXT {
            anyhow::bail!("vocoder diverged");
        }
        Ok(wav_bytes(2_205))
    }
}

/// Resolver with no host name, so only loopback and bridge candidates exist
pub struct LoopbackOnly;

#[async_trait]
impl HostResolver for LoopbackOnly {
    fn hostname(&self) -> Option<String> {
        None
    }

    async fn resolve(&self, _host: &str) -> Vec<IpAddr> {
        Vec::new()
    }
}

/// A local port nothing is listening on
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
