//! Executor traits implemented by the host engine.
//!
//! The pipeline drives animation, facial expression, and audio output
//! through these seams; it owns none of the rendering or device plumbing.
//! Implementations should no-op gracefully on unknown layers or clips —
//! returning an error is also fine, the sequencer logs and continues.

use crate::error::Result;
use crate::voice::AudioHandle;
use std::time::Duration;

/// Body-animation playback on a layered animator.
pub trait AnimationExecutor: Send + Sync {
    /// Trigger `clip` on `layer`, cross-fading in over `fade_length` and
    /// running for `duration`.
    fn play(&self, layer: &str, clip: &str, fade_length: Duration, duration: Duration)
    -> Result<()>;

    /// Set the blend weight of `layer`. Must be idempotent; the sequencer
    /// calls this to restore full weight after every directive.
    fn set_layer_weight(&self, layer: &str, weight: f32);

    /// Names of all animation layers the rig exposes.
    fn layers(&self) -> Vec<String>;
}

/// Facial-expression playback.
pub trait FaceExecutor: Send + Sync {
    /// Show `clip` for `duration`.
    fn play(&self, clip: &str, duration: Duration) -> Result<()>;
}

/// The exclusive audio output device.
///
/// One instance exists; starting a clip stops whatever was playing before.
pub trait AudioDevice: Send + Sync {
    /// Start playing `clip`, displacing any current playback.
    fn start(&self, clip: AudioHandle) -> Result<()>;

    /// Stop playback immediately.
    fn stop(&self);

    /// Whether the device is still draining a clip.
    fn is_playing(&self) -> bool;
}
