//! Frame-by-frame presentation playback paced on voice.
//!
//! A [`Sequencer`] plays one [`PerformanceRequest`] to completion or until
//! cancelled. Within each frame, animation and face directives run as
//! detached tasks that are deliberately not joined — voice playback is the
//! only pacing clock, so a directive whose duration outlives the frame's
//! voices may visibly overlap the next frame. Cancellation is observed at
//! every wait and returns without an error.

use crate::config::SequencerConfig;
use crate::idle::{BlinkLoop, IdleLoop};
use crate::pipeline::messages::{AnimationDirective, Frame, PerformanceRequest};
use crate::stage::{AnimationExecutor, AudioDevice, FaceExecutor};
use crate::voice::resolver::VoiceResolver;
use crate::voice::{LocalVoiceTable, Voice, VoiceSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Terminal state of one performance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceOutcome {
    /// All frames played.
    Completed,
    /// Cancellation observed; remaining frames skipped.
    Cancelled,
}

/// Plays performance requests against the host's executors.
pub struct Sequencer {
    animator: Arc<dyn AnimationExecutor>,
    face: Arc<dyn FaceExecutor>,
    device: Arc<dyn AudioDevice>,
    resolver: Arc<VoiceResolver>,
    locals: Arc<LocalVoiceTable>,
    idle: Arc<IdleLoop>,
    blink: Arc<BlinkLoop>,
    config: SequencerConfig,
}

impl Sequencer {
    /// Wire a sequencer to its executors and shared state.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        animator: Arc<dyn AnimationExecutor>,
        face: Arc<dyn FaceExecutor>,
        device: Arc<dyn AudioDevice>,
        resolver: Arc<VoiceResolver>,
        locals: Arc<LocalVoiceTable>,
        idle: Arc<IdleLoop>,
        blink: Arc<BlinkLoop>,
        config: SequencerConfig,
    ) -> Self {
        Self {
            animator,
            face,
            device,
            resolver,
            locals,
            idle,
            blink,
            config,
        }
    }

    /// Play `request` to completion or until `cancel` fires.
    ///
    /// On cancellation the sequencer returns at the next wait without
    /// touching idle or blink state; the orchestrator repairs both.
    pub async fn perform(
        &self,
        request: &PerformanceRequest,
        cancel: &CancellationToken,
    ) -> PerformanceOutcome {
        if request.disable_blink {
            self.blink.suspend();
        }
        if request.stop_idling_on_start {
            self.idle.stop();
        }
        debug!("performing {} frame(s)", request.frames.len());

        for (index, frame) in request.frames.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("performance cancelled before frame {index}");
                return PerformanceOutcome::Cancelled;
            }
            self.spawn_animation_tasks(frame, request, cancel);
            self.spawn_face_task(frame, cancel);
            self.play_voices(&frame.voices, cancel).await;
        }

        if cancel.is_cancelled() {
            info!("performance cancelled during its last frame");
            return PerformanceOutcome::Cancelled;
        }

        if request.start_idling_on_end {
            self.idle.start();
            if let Err(e) = self.face.play(&self.config.default_face, Duration::ZERO) {
                warn!("default face restore failed: {e}");
            }
        }
        if request.disable_blink {
            self.blink.resume();
        }
        PerformanceOutcome::Completed
    }

    /// Play a frame's voices back to back. This is the frame's pacing clock;
    /// it returns early (skipping gaps) once cancellation is observed.
    async fn play_voices(&self, voices: &[Voice], cancel: &CancellationToken) {
        for voice in voices {
            let resolve_started = Instant::now();
            let handle = match voice.source {
                VoiceSource::Local => self.locals.get(voice.cache_key()),
                VoiceSource::Web | VoiceSource::Tts => {
                    self.resolver.resolve(voice, cancel).await
                }
            };
            let Some(clip) = handle else {
                warn!("no audio for voice '{}'; skipping", voice.cache_key());
                continue;
            };

            // Pre-gap, minus whatever time resolution already consumed.
            let pre_gap = voice.pre_gap.saturating_sub(resolve_started.elapsed());
            if !pre_gap.is_zero() && !cancel.is_cancelled() {
                tokio::select! {
                    () = cancel.cancelled() => {}
                    () = sleep(pre_gap) => {}
                }
            }
            if cancel.is_cancelled() {
                return;
            }

            // The device is exclusive: starting displaces prior playback.
            if let Err(e) = self.device.start(clip) {
                error!("audio device error for '{}': {e}", voice.cache_key());
                continue;
            }
            loop {
                if cancel.is_cancelled() {
                    self.device.stop();
                    return;
                }
                if !self.device.is_playing() {
                    break;
                }
                sleep(self.config.device_poll_interval()).await;
            }

            if !voice.post_gap.is_zero() {
                tokio::select! {
                    () = cancel.cancelled() => return,
                    () = sleep(voice.post_gap) => {}
                }
            }
        }
    }

    /// Spawn one detached task per animation layer in the frame, plus the
    /// cross-fade-back of unused layers when the request asks for it.
    fn spawn_animation_tasks(
        &self,
        frame: &Frame,
        request: &PerformanceRequest,
        cancel: &CancellationToken,
    ) {
        for (layer, directives) in &frame.animations {
            let animator = Arc::clone(&self.animator);
            let layer = layer.clone();
            let directives = directives.clone();
            let default_fade = self.config.default_fade();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                run_layer_directives(animator, layer, directives, default_fade, cancel).await;
            });
        }

        if request.stop_layered_animations {
            let fade = self.config.default_fade();
            for layer in self.animator.layers() {
                if layer == request.base_layer || frame.animations.contains_key(&layer) {
                    continue;
                }
                let animator = Arc::clone(&self.animator);
                let clip = self.config.default_animation_clip.clone();
                tokio::spawn(async move {
                    if let Err(e) = animator.play(&layer, &clip, fade, Duration::ZERO) {
                        warn!("cross-fading layer '{layer}' back to '{clip}' failed: {e}");
                    }
                });
            }
        }
    }

    /// Spawn the frame's face directives as one detached task.
    fn spawn_face_task(&self, frame: &Frame, cancel: &CancellationToken) {
        if frame.faces.is_empty() {
            return;
        }
        let face = Arc::clone(&self.face);
        let faces = frame.faces.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            for directive in faces {
                if cancel.is_cancelled() {
                    return;
                }
                if let Err(e) = face.play(&directive.clip, directive.duration) {
                    warn!("face '{}' failed: {e}", directive.clip);
                }
                tokio::select! {
                    () = cancel.cancelled() => return,
                    () = sleep(directive.duration) => {}
                }
            }
        });
    }
}

/// Run one layer's directives in order. The layer weight is restored to
/// full after every directive — on success, trigger failure, or
/// cancellation.
async fn run_layer_directives(
    animator: Arc<dyn AnimationExecutor>,
    layer: String,
    directives: Vec<AnimationDirective>,
    default_fade: Duration,
    cancel: CancellationToken,
) {
    for directive in directives {
        if !directive.pre_gap.is_zero() {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = sleep(directive.pre_gap) => {}
            }
        }
        if cancel.is_cancelled() {
            return;
        }

        animator.set_layer_weight(&layer, directive.weight);
        let fade = directive.fade_length.unwrap_or(default_fade);
        match animator.play(&layer, &directive.clip, fade, directive.duration) {
            Ok(()) => {
                tokio::select! {
                    () = cancel.cancelled() => {}
                    () = sleep(directive.duration) => {}
                }
            }
            Err(e) => {
                warn!("animation '{}' on layer '{layer}' failed: {e}", directive.clip);
            }
        }
        // Weight restore runs on every exit from the directive.
        animator.set_layer_weight(&layer, 1.0);
        if cancel.is_cancelled() {
            return;
        }
    }
}
