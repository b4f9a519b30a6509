//! Cross-module integration tests: stream → segments → ordered playback.

use marionette::{
    AnimationExecutor, AudioClip, AudioDevice, AudioHandle, ComposeFn, FaceExecutor, Frame,
    LocalVoiceTable, Orchestrator, PerformanceConfig, PerformanceOutcome, PerformanceRequest,
    Result, Segment, SpeechSynthesizer, TranscriptBuffer, TtsRequest, Voice, VoiceResolver,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .try_init();
}

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

/// Records started clips (by sample count); each clip "plays" for a fixed
/// virtual duration.
struct TimedDevice {
    started: Mutex<Vec<usize>>,
    until: Mutex<Option<tokio::time::Instant>>,
    play_for: Duration,
}

impl TimedDevice {
    fn new(play_for: Duration) -> Self {
        Self {
            started: Mutex::new(Vec::new()),
            until: Mutex::new(None),
            play_for,
        }
    }

    fn started(&self) -> Vec<usize> {
        self.started.lock().expect("started").clone()
    }
}

impl AudioDevice for TimedDevice {
    fn start(&self, clip: AudioHandle) -> Result<()> {
        self.started.lock().expect("started").push(clip.samples.len());
        *self.until.lock().expect("until") = Some(tokio::time::Instant::now() + self.play_for);
        Ok(())
    }

    fn stop(&self) {
        *self.until.lock().expect("until") = None;
    }

    fn is_playing(&self) -> bool {
        self.until
            .lock()
            .expect("until")
            .map(|t| tokio::time::Instant::now() < t)
            .unwrap_or(false)
    }
}

/// Synthesizer with per-text delays and distinguishable clip lengths,
/// recording the order in which syntheses complete.
struct ScriptedSynth {
    /// text → (synthesis delay, clip sample count)
    script: HashMap<String, (Duration, usize)>,
    completed: Mutex<Vec<String>>,
}

impl ScriptedSynth {
    fn new(script: &[(&str, Duration, usize)]) -> Self {
        Self {
            script: script
                .iter()
                .map(|(text, delay, samples)| ((*text).to_owned(), (*delay, *samples)))
                .collect(),
            completed: Mutex::new(Vec::new()),
        }
    }

    fn completed(&self) -> Vec<String> {
        self.completed.lock().expect("completed").clone()
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for ScriptedSynth {
    async fn synthesize(&self, text: &str, _request: &TtsRequest) -> Result<AudioHandle> {
        let (delay, samples) = self.script.get(text).copied().unwrap_or((Duration::ZERO, 1));
        tokio::time::sleep(delay).await;
        self.completed.lock().expect("completed").push(text.to_owned());
        Ok(Arc::new(AudioClip {
            samples: vec![0.0; samples],
            sample_rate: 16_000,
        }))
    }
}

fn orchestrator_with(
    synth: Arc<dyn SpeechSynthesizer>,
    device: Arc<TimedDevice>,
) -> Orchestrator {
    let config = PerformanceConfig::default();
    let resolver = VoiceResolver::new(&config.resolver).with_synthesizer(synth);
    Orchestrator::new(
        config,
        Arc::new(NullAnimator),
        Arc::new(NullFace),
        device,
        resolver,
        Arc::new(LocalVoiceTable::new()),
    )
}

fn tts_compose() -> ComposeFn {
    Arc::new(|segment: &Segment| {
        PerformanceRequest::new().with_frame(Frame::new().with_voice(Voice::tts(&segment.text)))
    })
}

// ── Ordering ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn playback_follows_enqueue_order_despite_prefetch_order() {
    init_tracing();
    // The first sentence resolves slowest, the second fastest.
    let synth = Arc::new(ScriptedSynth::new(&[
        ("One。", Duration::from_millis(300), 1),
        ("Two。", Duration::from_millis(10), 2),
        ("Three。", Duration::from_millis(50), 3),
    ]));
    let device = Arc::new(TimedDevice::new(Duration::from_millis(5)));
    let orch = orchestrator_with(Arc::clone(&synth) as _, Arc::clone(&device));

    let buffer = TranscriptBuffer::new();
    buffer.push_str("One。Two。Three。");
    buffer.finish();

    orch.perform_stream(Arc::new(buffer), tts_compose())
        .await
        .expect("stream plays");

    // Prefetch finished out of order…
    assert_eq!(synth.completed(), ["Two。", "Three。", "One。"]);
    // …but playback followed enqueue order.
    assert_eq!(device.started(), [1, 2, 3]);
}

// ── Incremental streaming ────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn segments_play_while_the_stream_is_still_growing() {
    let synth = Arc::new(ScriptedSynth::new(&[
        ("Hello there。", Duration::from_millis(5), 1),
        ("Still typing。", Duration::from_millis(5), 2),
    ]));
    let device = Arc::new(TimedDevice::new(Duration::from_millis(5)));
    let orch = orchestrator_with(synth as _, Arc::clone(&device));

    let buffer = TranscriptBuffer::new();
    let writer = buffer.clone();
    tokio::spawn(async move {
        writer.push_str("Hello ");
        tokio::time::sleep(Duration::from_millis(120)).await;
        writer.push_str("there。Still ");
        tokio::time::sleep(Duration::from_millis(120)).await;
        writer.push_str("typing。");
        writer.finish();
    });

    orch.perform_stream(Arc::new(buffer), tts_compose())
        .await
        .expect("stream plays");

    assert_eq!(device.started(), [1, 2]);
}

// ── Dedup across prefetch and playback ───────────────────────

#[tokio::test(start_paused = true)]
async fn repeated_text_synthesizes_once_but_plays_twice() {
    let synth = Arc::new(ScriptedSynth::new(&[(
        "Same。",
        Duration::from_millis(20),
        7,
    )]));
    let device = Arc::new(TimedDevice::new(Duration::from_millis(5)));
    let orch = orchestrator_with(Arc::clone(&synth) as _, Arc::clone(&device));

    let buffer = TranscriptBuffer::new();
    buffer.push_str("Same。Same。");
    buffer.finish();

    orch.perform_stream(Arc::new(buffer), tts_compose())
        .await
        .expect("stream plays");

    assert_eq!(synth.completed().len(), 1);
    assert_eq!(device.started(), [7, 7]);
}

// ── Cancellation ─────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn cancelling_mid_stream_stops_after_the_current_item() {
    let synth = Arc::new(ScriptedSynth::new(&[
        ("First。", Duration::ZERO, 1),
        ("Second。", Duration::ZERO, 2),
    ]));
    // Each clip plays for a long time, so the cancel lands mid-item.
    let device = Arc::new(TimedDevice::new(Duration::from_secs(30)));
    let orch = Arc::new(orchestrator_with(synth as _, Arc::clone(&device)));

    let buffer = TranscriptBuffer::new();
    buffer.push_str("First。Second。");
    buffer.finish();

    let runner = Arc::clone(&orch);
    let run = tokio::spawn(async move {
        runner.perform_stream(Arc::new(buffer), tts_compose()).await
    });

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(device.started(), [1], "first item should be mid-playback");
    orch.cancel_current();

    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("stream returns promptly after cancel")
        .expect("no panic")
        .expect("cancellation is not an error");

    // The second item was never started.
    assert_eq!(device.started(), [1]);
}

// ── Direct request with gaps and flags ───────────────────────

#[tokio::test(start_paused = true)]
async fn direct_request_paces_voices_with_gaps() {
    let synth = Arc::new(ScriptedSynth::new(&[]));
    let device = Arc::new(TimedDevice::new(Duration::from_millis(10)));
    let orch = orchestrator_with(synth as _, Arc::clone(&device));
    orch.local_voices().insert(
        "greet",
        Arc::new(AudioClip {
            samples: vec![0.0; 4],
            sample_rate: 16_000,
        }),
    );

    let started = tokio::time::Instant::now();
    let request = PerformanceRequest::new().with_frame(
        Frame::new().with_voice(
            Voice::local("greet").with_gaps(Duration::from_millis(200), Duration::from_millis(300)),
        ),
    );
    let outcome = orch.perform(&request).await;
    assert_eq!(outcome, PerformanceOutcome::Completed);
    assert_eq!(device.started(), [4]);
    // pre-gap + playback + post-gap all elapsed.
    assert!(started.elapsed() >= Duration::from_millis(500));
}
