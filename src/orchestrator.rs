//! Explicit lifecycle wiring segmentation, resolution, and playback.
//!
//! The [`Orchestrator`] owns the root cancellation token and the idle/blink
//! state around performances. `start()`/`stop()` replace any host-engine
//! lifecycle callbacks; everything in between is driven by awaiting or
//! polling.

use crate::config::PerformanceConfig;
use crate::error::Result;
use crate::idle::{BlinkLoop, IdleLoop};
use crate::pipeline::messages::PerformanceRequest;
use crate::pipeline::{ComposeFn, ContentPipeline, TranscriptReader};
use crate::segmenter::Segmenter;
use crate::sequencer::{PerformanceOutcome, Sequencer};
use crate::stage::{AnimationExecutor, AudioDevice, FaceExecutor};
use crate::voice::LocalVoiceTable;
use crate::voice::resolver::VoiceResolver;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Owns one character's presentation lifecycle.
pub struct Orchestrator {
    config: PerformanceConfig,
    resolver: Arc<VoiceResolver>,
    locals: Arc<LocalVoiceTable>,
    sequencer: Arc<Sequencer>,
    idle: Arc<IdleLoop>,
    blink: Arc<BlinkLoop>,
    pipeline: ContentPipeline,
    root: CancellationToken,
    /// Cancellation token of the performance currently running, if any.
    current: Mutex<Option<CancellationToken>>,
}

impl Orchestrator {
    /// Wire an orchestrator to the host's executors and voice sources.
    ///
    /// Build the resolver with its web loader / synthesizer attached before
    /// passing it in; preload `locals` with the character's canned clips.
    pub fn new(
        config: PerformanceConfig,
        animator: Arc<dyn AnimationExecutor>,
        face: Arc<dyn FaceExecutor>,
        device: Arc<dyn AudioDevice>,
        resolver: VoiceResolver,
        locals: Arc<LocalVoiceTable>,
    ) -> Self {
        let resolver = Arc::new(resolver);
        let idle = Arc::new(IdleLoop::new(
            Arc::clone(&animator),
            config.idle.clone(),
            config.sequencer.default_fade(),
        ));
        let blink = Arc::new(BlinkLoop::new(Arc::clone(&face), config.idle.clone()));
        let sequencer = Arc::new(Sequencer::new(
            animator,
            face,
            device,
            Arc::clone(&resolver),
            Arc::clone(&locals),
            Arc::clone(&idle),
            Arc::clone(&blink),
            config.sequencer.clone(),
        ));
        let pipeline = ContentPipeline::new(
            Arc::clone(&resolver),
            Arc::clone(&sequencer),
            config.pipeline.clone(),
        );
        Self {
            config,
            resolver,
            locals,
            sequencer,
            idle,
            blink,
            pipeline,
            root: CancellationToken::new(),
            current: Mutex::new(None),
        }
    }

    /// Begin the idle presentation: idle animation plus blinking.
    pub fn start(&self) {
        self.idle.start();
        self.blink.start();
        info!("orchestrator started");
    }

    /// Cancel everything and stop the background loops.
    pub fn stop(&self) {
        self.root.cancel();
        self.idle.stop();
        self.blink.stop();
        info!("orchestrator stopped");
    }

    /// Perform a streamed transcript: segment it as it grows, prefetch
    /// audio, and play each composed request in original order.
    ///
    /// Runs until the stream completes and all items have played, or until
    /// cancelled via [`cancel_current`](Self::cancel_current) or
    /// [`stop`](Self::stop).
    pub async fn perform_stream(
        &self,
        source: Arc<dyn TranscriptReader>,
        compose: ComposeFn,
    ) -> Result<()> {
        let cancel = self.begin_performance();
        let segmenter = Segmenter::new(self.config.segmenter.clone());
        let result = self.pipeline.run(source, segmenter, compose, &cancel).await;
        self.end_performance(&cancel);
        result
    }

    /// Play one request directly, outside any stream.
    pub async fn perform(&self, request: &PerformanceRequest) -> PerformanceOutcome {
        let cancel = self.begin_performance();
        let outcome = self.sequencer.perform(request, &cancel).await;
        self.end_performance(&cancel);
        outcome
    }

    /// Cancel the performance currently running, leaving the orchestrator
    /// usable for the next one.
    pub fn cancel_current(&self) {
        if let Ok(current) = self.current.lock()
            && let Some(token) = current.as_ref()
        {
            token.cancel();
        }
    }

    /// The resolver shared with prefetch and the sequencer.
    pub fn resolver(&self) -> &Arc<VoiceResolver> {
        &self.resolver
    }

    /// The preloaded local voice table.
    pub fn local_voices(&self) -> &LocalVoiceTable {
        &self.locals
    }

    /// A clone of the root cancellation token for external shutdown wiring.
    pub fn cancel_token(&self) -> CancellationToken {
        self.root.clone()
    }

    fn begin_performance(&self) -> CancellationToken {
        let token = self.root.child_token();
        if let Ok(mut current) = self.current.lock() {
            *current = Some(token.clone());
        }
        token
    }

    /// Clear the current-performance slot. The sequencer returns immediately
    /// on cancellation, so a cancelled turn repairs idle and blink here
    /// instead — the character never stays frozen.
    fn end_performance(&self, cancel: &CancellationToken) {
        if let Ok(mut current) = self.current.lock() {
            current.take();
        }
        if cancel.is_cancelled() && !self.root.is_cancelled() {
            self.blink.resume();
            self.idle.start();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PerformanceConfig;
    use crate::error::Result;
    use crate::pipeline::messages::Frame;
    use crate::voice::{AudioClip, Voice};
    use std::time::Duration;

    struct NullAnimator;

    impl AnimationExecutor for NullAnimator {
        fn play(
            &self,
            _layer: &str,
            _clip: &str,
            _fade_length: Duration,
            _duration: Duration,
        ) -> Result<()> {
            Ok(())
        }

        fn set_layer_weight(&self, _layer: &str, _weight: f32) {}

        fn layers(&self) -> Vec<String> {
            vec!["Base".to_owned()]
        }
    }

    struct NullFace;

    impl FaceExecutor for NullFace {
        fn play(&self, _clip: &str, _duration: Duration) -> Result<()> {
            Ok(())
        }
    }

    struct NullDevice;

    impl AudioDevice for NullDevice {
        fn start(&self, _clip: crate::voice::AudioHandle) -> Result<()> {
            Ok(())
        }

        fn stop(&self) {}

        fn is_playing(&self) -> bool {
            false
        }
    }

    fn orchestrator() -> Orchestrator {
        let config = PerformanceConfig::default();
        let resolver = VoiceResolver::new(&config.resolver);
        let locals = Arc::new(LocalVoiceTable::new());
        locals.insert(
            "line",
            Arc::new(AudioClip {
                samples: vec![0.0; 8],
                sample_rate: 16_000,
            }),
        );
        Orchestrator::new(
            config,
            Arc::new(NullAnimator),
            Arc::new(NullFace),
            Arc::new(NullDevice),
            resolver,
            locals,
        )
    }

    #[tokio::test]
    async fn perform_plays_a_direct_request() {
        let orch = orchestrator();
        orch.start();
        let request = PerformanceRequest::new()
            .with_frame(Frame::new().with_voice(Voice::local("line")));
        let outcome = orch.perform(&request).await;
        assert_eq!(outcome, PerformanceOutcome::Completed);
        orch.stop();
    }

    #[tokio::test]
    async fn cancelled_performance_restores_idle_state() {
        let orch = Arc::new(orchestrator());
        orch.start();

        let request = PerformanceRequest {
            disable_blink: true,
            ..PerformanceRequest::new()
        }
        .with_frame(Frame::new().with_voice(
            Voice::local("line").with_gaps(Duration::ZERO, Duration::from_secs(60)),
        ));

        let runner = Arc::clone(&orch);
        let run = tokio::spawn(async move { runner.perform(&request).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        orch.cancel_current();
        let outcome = run.await.expect("no panic");
        assert_eq!(outcome, PerformanceOutcome::Cancelled);

        // The orchestrator repaired what the aborted sequencer skipped.
        assert!(!orch.blink.is_suspended());
        assert!(orch.idle.is_idling());
        orch.stop();
    }

    #[tokio::test]
    async fn stop_cancels_a_running_performance() {
        let orch = Arc::new(orchestrator());
        orch.start();

        let request = PerformanceRequest::new().with_frame(Frame::new().with_voice(
            Voice::local("line").with_gaps(Duration::ZERO, Duration::from_secs(60)),
        ));

        let runner = Arc::clone(&orch);
        let run = tokio::spawn(async move { runner.perform(&request).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        orch.stop();
        let outcome = run.await.expect("no panic");
        assert_eq!(outcome, PerformanceOutcome::Cancelled);
        assert!(!orch.idle.is_idling());
    }
}
