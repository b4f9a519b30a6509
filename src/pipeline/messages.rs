//! Request and item types passed between pipeline stages.

use crate::segmenter::Segment;
use crate::voice::Voice;
use std::collections::HashMap;
use std::time::Duration;

/// One body-animation directive within a frame.
#[derive(Debug, Clone)]
pub struct AnimationDirective {
    /// Animator layer the clip runs on.
    pub layer: String,
    /// Clip name.
    pub clip: String,
    /// How long the clip runs.
    pub duration: Duration,
    /// Cross-fade length; `None` uses the configured default.
    pub fade_length: Option<Duration>,
    /// Layer blend weight while the clip runs.
    pub weight: f32,
    /// Silence before the clip triggers.
    pub pre_gap: Duration,
}

impl AnimationDirective {
    /// A directive with full weight, no pre-gap, and the default fade.
    pub fn new(layer: &str, clip: &str, duration: Duration) -> Self {
        Self {
            layer: layer.to_owned(),
            clip: clip.to_owned(),
            duration,
            fade_length: None,
            weight: 1.0,
            pre_gap: Duration::ZERO,
        }
    }

    /// Override the cross-fade length.
    pub fn with_fade_length(mut self, fade_length: Duration) -> Self {
        self.fade_length = Some(fade_length);
        self
    }

    /// Override the layer blend weight.
    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    /// Delay the trigger.
    pub fn with_pre_gap(mut self, pre_gap: Duration) -> Self {
        self.pre_gap = pre_gap;
        self
    }
}

/// One facial-expression directive within a frame.
#[derive(Debug, Clone)]
pub struct FaceDirective {
    /// Expression clip name.
    pub clip: String,
    /// How long the expression holds.
    pub duration: Duration,
}

impl FaceDirective {
    /// A face directive.
    pub fn new(clip: &str, duration: Duration) -> Self {
        Self {
            clip: clip.to_owned(),
            duration,
        }
    }
}

/// One synchronized bundle of voice, animation, and face directives.
///
/// Everything in a frame is conceptually simultaneous: animations and faces
/// start as the frame starts, while voice playback paces how long the frame
/// stays current.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Voices played back to back; the frame's pacing clock.
    pub voices: Vec<Voice>,
    /// Animation directives per layer, each layer's list played in order.
    pub animations: HashMap<String, Vec<AnimationDirective>>,
    /// Face directives played in order.
    pub faces: Vec<FaceDirective>,
}

impl Frame {
    /// An empty frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a voice.
    pub fn with_voice(mut self, voice: Voice) -> Self {
        self.voices.push(voice);
        self
    }

    /// Append an animation directive on its layer.
    pub fn with_animation(mut self, directive: AnimationDirective) -> Self {
        self.animations
            .entry(directive.layer.clone())
            .or_default()
            .push(directive);
        self
    }

    /// Append a face directive.
    pub fn with_face(mut self, directive: FaceDirective) -> Self {
        self.faces.push(directive);
        self
    }
}

/// An ordered list of frames plus control flags: one avatar "turn".
#[derive(Debug, Clone)]
pub struct PerformanceRequest {
    /// Frames played strictly in order.
    pub frames: Vec<Frame>,
    /// Suspend blinking for the duration of the performance.
    pub disable_blink: bool,
    /// Cancel the idle loop when the performance starts.
    pub stop_idling_on_start: bool,
    /// Restart the idle loop and restore the default face when it ends.
    pub start_idling_on_end: bool,
    /// Cross-fade layers a frame does not use back to the default clip.
    pub stop_layered_animations: bool,
    /// Layer that idle/default playback runs on; never force-stopped.
    pub base_layer: String,
}

impl Default for PerformanceRequest {
    fn default() -> Self {
        Self {
            frames: Vec::new(),
            disable_blink: false,
            stop_idling_on_start: true,
            start_idling_on_end: true,
            stop_layered_animations: false,
            base_layer: "Base".to_owned(),
        }
    }
}

impl PerformanceRequest {
    /// An empty request with default flags.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame.
    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.frames.push(frame);
        self
    }
}

/// A produced segment paired with its composed request, consumed exactly
/// once by the pipeline consumer in enqueue order.
#[derive(Debug, Clone)]
pub struct ContentItem {
    /// The segment the request was composed from.
    pub segment: Segment,
    /// Position in the enqueue order.
    pub order: usize,
    /// The performance to play for this segment.
    pub request: PerformanceRequest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_groups_animations_by_layer() {
        let frame = Frame::new()
            .with_animation(AnimationDirective::new("Arms", "wave", Duration::from_secs(1)))
            .with_animation(AnimationDirective::new("Arms", "rest", Duration::from_secs(1)))
            .with_animation(AnimationDirective::new("Head", "nod", Duration::from_secs(1)));
        assert_eq!(frame.animations.len(), 2);
        assert_eq!(frame.animations["Arms"].len(), 2);
    }

    #[test]
    fn directive_builders_apply() {
        let d = AnimationDirective::new("Base", "wave", Duration::from_secs(2))
            .with_fade_length(Duration::from_millis(300))
            .with_weight(0.5)
            .with_pre_gap(Duration::from_millis(100));
        assert_eq!(d.fade_length, Some(Duration::from_millis(300)));
        assert!((d.weight - 0.5).abs() < f32::EPSILON);
        assert_eq!(d.pre_gap, Duration::from_millis(100));
    }

    #[test]
    fn request_defaults_manage_idle_state() {
        let request = PerformanceRequest::new();
        assert!(request.stop_idling_on_start);
        assert!(request.start_idling_on_end);
        assert!(!request.disable_blink);
        assert!(!request.stop_layered_animations);
    }
}
