//! Configuration types for the presentation pipeline.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration for the presentation pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Text segmentation settings.
    pub segmenter: SegmenterConfig,
    /// Voice resolution (cache/dedup) settings.
    pub resolver: ResolverConfig,
    /// Content pipeline settings.
    pub pipeline: PipelineConfig,
    /// Presentation sequencer settings.
    pub sequencer: SequencerConfig,
    /// Idle animation and blink settings.
    pub idle: IdleConfig,
}

/// Text segmentation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Characters that always close a segment. Newline is treated as a
    /// mandatory break regardless of this set.
    pub mandatory_breaks: Vec<char>,
    /// Characters that close a segment only once the accumulated text is at
    /// least [`min_optional_len`](Self::min_optional_len) characters long.
    pub optional_breaks: Vec<char>,
    /// Minimum accumulated length (chars) before an optional break splits.
    /// Zero means optional breaks always split.
    pub min_optional_len: usize,
    /// Opening marker of a reasoning-suppression region.
    pub suppress_open: String,
    /// Closing marker of a reasoning-suppression region.
    pub suppress_close: String,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            mandatory_breaks: vec!['。', '．', '！', '？', '.', '!', '?'],
            optional_breaks: vec!['、', ',', ';', ':'],
            min_optional_len: 20,
            suppress_open: "<think>".to_owned(),
            suppress_close: "</think>".to_owned(),
        }
    }
}

/// Voice resolver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Bounded wait on an in-flight resolution, in ms.
    ///
    /// Elapsing stops the *waiting caller* only; the underlying download or
    /// synthesis keeps running and still populates the cache.
    pub wait_timeout_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: 10_000,
        }
    }
}

impl ResolverConfig {
    /// Bounded wait as a [`Duration`].
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

/// Content pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Interval between polls of the upstream text buffer, in ms.
    pub poll_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
        }
    }
}

impl PipelineConfig {
    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Presentation sequencer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Cross-fade length used when an animation directive leaves its fade
    /// length unspecified, in ms.
    pub default_fade_ms: u64,
    /// Interval between polls of the audio device's busy flag, in ms.
    pub device_poll_interval_ms: u64,
    /// Face clip restored when a performance ends and idling resumes.
    pub default_face: String,
    /// Clip that layered animations cross-fade back to when a frame stops
    /// layers it does not use.
    pub default_animation_clip: String,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            default_fade_ms: 200,
            device_poll_interval_ms: 50,
            default_face: "neutral".to_owned(),
            default_animation_clip: "default".to_owned(),
        }
    }
}

impl SequencerConfig {
    /// Default cross-fade as a [`Duration`].
    pub fn default_fade(&self) -> Duration {
        Duration::from_millis(self.default_fade_ms)
    }

    /// Device poll interval as a [`Duration`].
    pub fn device_poll_interval(&self) -> Duration {
        Duration::from_millis(self.device_poll_interval_ms)
    }
}

/// Idle animation and blink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleConfig {
    /// Animation clips cycled while the character is idle.
    pub clips: Vec<String>,
    /// Time each idle clip runs before advancing to the next, in ms.
    pub interval_ms: u64,
    /// Animation layer the idle loop (and un-layered playback) runs on.
    pub base_layer: String,
    /// Face clip played for a blink.
    pub blink_clip: String,
    /// Interval between blinks, in ms.
    pub blink_interval_ms: u64,
    /// Duration of one blink, in ms.
    pub blink_duration_ms: u64,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            clips: vec!["idle_01".to_owned()],
            interval_ms: 10_000,
            base_layer: "Base".to_owned(),
            blink_clip: "blink".to_owned(),
            blink_interval_ms: 4_000,
            blink_duration_ms: 150,
        }
    }
}

impl IdleConfig {
    /// Idle clip interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Blink interval as a [`Duration`].
    pub fn blink_interval(&self) -> Duration {
        Duration::from_millis(self.blink_interval_ms)
    }

    /// Blink duration as a [`Duration`].
    pub fn blink_duration(&self) -> Duration {
        Duration::from_millis(self.blink_duration_ms)
    }
}
