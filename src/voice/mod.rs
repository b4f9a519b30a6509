//! Voice descriptors, audio handles, and pluggable voice sources.
//!
//! A [`Voice`] describes one unit of speakable audio: where it comes from
//! (preloaded table, web download, or speech synthesis), the silence gaps
//! around it, and its deterministic cache key. Resolution and caching live
//! in [`resolver`].

pub mod resolver;

use crate::error::{PerformError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Decoded audio ready for playback.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    /// Mono f32 samples.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl AudioClip {
    /// Playback duration of the clip.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

/// Shared handle to a decoded clip. Cheap to clone; cached by the resolver.
pub type AudioHandle = Arc<AudioClip>;

/// Where a voice's audio comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceSource {
    /// Preloaded name → handle table.
    Local,
    /// Downloaded from a URL.
    Web,
    /// Synthesized from text.
    Tts,
}

/// Engine-specific synthesis parameters, passed through opaquely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TtsRequest {
    /// Synthesizer voice/preset name, when the engine distinguishes them.
    pub voice_name: Option<String>,
    /// Free-form engine parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// One unit of speakable audio within a frame.
///
/// The cache key is derived deterministically from the identifying content
/// (local name, URL, or synthesis text), so identical keys always resolve to
/// identical audio. Construct through [`Voice::local`], [`Voice::web`], or
/// [`Voice::tts`]; the key is never set by hand.
#[derive(Debug, Clone)]
pub struct Voice {
    cache_key: String,
    /// Silence before playback starts.
    pub pre_gap: Duration,
    /// Silence after playback drains.
    pub post_gap: Duration,
    /// Synthesis text (`Tts` only).
    pub text: Option<String>,
    /// Download URL (`Web` only).
    pub url: Option<String>,
    /// Synthesis parameters (`Tts` only).
    pub tts_request: Option<TtsRequest>,
    /// Which resolver handles this voice.
    pub source: VoiceSource,
    /// When false, the cache entry is evicted after a single read.
    pub use_cache: bool,
}

impl Voice {
    /// A voice played from the preloaded local table.
    pub fn local(name: &str) -> Self {
        Self {
            cache_key: name.to_owned(),
            pre_gap: Duration::ZERO,
            post_gap: Duration::ZERO,
            text: None,
            url: None,
            tts_request: None,
            source: VoiceSource::Local,
            use_cache: true,
        }
    }

    /// A voice downloaded from `url`.
    pub fn web(url: &str) -> Self {
        Self {
            cache_key: content_key(url),
            pre_gap: Duration::ZERO,
            post_gap: Duration::ZERO,
            text: None,
            url: Some(url.to_owned()),
            tts_request: None,
            source: VoiceSource::Web,
            use_cache: true,
        }
    }

    /// A voice synthesized from `text`.
    pub fn tts(text: &str) -> Self {
        Self {
            cache_key: content_key(text),
            pre_gap: Duration::ZERO,
            post_gap: Duration::ZERO,
            text: Some(text.to_owned()),
            url: None,
            tts_request: None,
            source: VoiceSource::Tts,
            use_cache: true,
        }
    }

    /// Set the silence gaps around playback.
    pub fn with_gaps(mut self, pre_gap: Duration, post_gap: Duration) -> Self {
        self.pre_gap = pre_gap;
        self.post_gap = post_gap;
        self
    }

    /// Attach synthesizer parameters.
    pub fn with_tts_request(mut self, request: TtsRequest) -> Self {
        self.tts_request = Some(request);
        self
    }

    /// Mark the resolved audio single-use: the cache entry is removed after
    /// one read.
    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    /// The deterministic cache/dedup key for this voice.
    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }
}

/// Derive a cache key from identifying content.
fn content_key(seed: &str) -> String {
    blake3::hash(seed.as_bytes()).to_hex().to_string()
}

/// Preloaded name → handle table for [`VoiceSource::Local`] voices.
#[derive(Debug, Default)]
pub struct LocalVoiceTable {
    clips: RwLock<HashMap<String, AudioHandle>>,
}

impl LocalVoiceTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a preloaded clip under `name`, replacing any previous one.
    pub fn insert(&self, name: &str, clip: AudioHandle) {
        if let Ok(mut clips) = self.clips.write() {
            clips.insert(name.to_owned(), clip);
        }
    }

    /// Look up a preloaded clip.
    pub fn get(&self, name: &str) -> Option<AudioHandle> {
        self.clips.read().ok()?.get(name).cloned()
    }

    /// Whether `name` is preloaded.
    pub fn contains(&self, name: &str) -> bool {
        self.clips.read().map(|c| c.contains_key(name)).unwrap_or(false)
    }
}

/// Resolves a URL into playable audio.
#[async_trait::async_trait]
pub trait WebVoiceLoader: Send + Sync {
    /// Download and decode the clip at `url`.
    async fn fetch(&self, url: &str) -> Result<AudioHandle>;
}

/// Resolves text plus engine parameters into playable audio.
#[async_trait::async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` into a clip.
    async fn synthesize(&self, text: &str, request: &TtsRequest) -> Result<AudioHandle>;
}

/// [`WebVoiceLoader`] downloading WAV payloads over HTTP.
#[derive(Debug, Clone, Default)]
pub struct HttpVoiceLoader {
    client: reqwest::Client,
}

impl HttpVoiceLoader {
    /// Create a loader with a default client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a loader reusing an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl WebVoiceLoader for HttpVoiceLoader {
    async fn fetch(&self, url: &str) -> Result<AudioHandle> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let payload = response.bytes().await?;
        decode_wav(&payload)
    }
}

/// Decode a WAV payload into a mono clip.
///
/// Integer formats are scaled to \[-1, 1\]; multi-channel audio is averaged
/// down to mono.
pub fn decode_wav(payload: &[u8]) -> Result<AudioHandle> {
    let reader = hound::WavReader::new(std::io::Cursor::new(payload))
        .map_err(|e| PerformError::Audio(format!("invalid WAV payload: {e}")))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| PerformError::Audio(format!("WAV decode failed: {e}")))?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| PerformError::Audio(format!("WAV decode failed: {e}")))?
        }
    };

    let samples = downmix(samples, spec.channels);
    if samples.is_empty() {
        return Err(PerformError::Audio("WAV payload contains no samples".into()));
    }

    Ok(Arc::new(AudioClip {
        samples,
        sample_rate: spec.sample_rate,
    }))
}

fn downmix(samples: Vec<f32>, channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples;
    }
    samples
        .chunks(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}
