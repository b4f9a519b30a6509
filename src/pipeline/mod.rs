//! Producer/consumer content pipeline.
//!
//! The producer polls a growing transcript, segments it, composes a
//! [`PerformanceRequest`] per segment, fires audio prefetch, and enqueues.
//! The consumer dequeues strictly FIFO and awaits full playback of each item
//! before taking the next — the one ordering guarantee of the pipeline:
//! playback order equals enqueue order no matter which prefetch finishes
//! first.

pub mod messages;

use crate::config::PipelineConfig;
use crate::error::{PerformError, Result};
use crate::pipeline::messages::{ContentItem, PerformanceRequest};
use crate::segmenter::{Segment, Segmenter};
use crate::sequencer::{PerformanceOutcome, Sequencer};
use crate::voice::VoiceSource;
use crate::voice::resolver::VoiceResolver;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Read access to a monotonically growing text buffer.
///
/// Implementations must be prefix-stable: earlier content never changes,
/// new content only appends, and `complete` never flips back to false.
pub trait TranscriptReader: Send + Sync {
    /// Current buffer contents plus whether the stream is complete.
    fn snapshot(&self) -> (String, bool);
}

/// Shared growing text buffer fed by the upstream token stream.
#[derive(Debug, Clone, Default)]
pub struct TranscriptBuffer {
    inner: Arc<Mutex<TranscriptState>>,
}

#[derive(Debug, Default)]
struct TranscriptState {
    text: String,
    complete: bool,
}

impl TranscriptBuffer {
    /// An empty, open buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment of streamed text.
    pub fn push_str(&self, fragment: &str) {
        if let Ok(mut state) = self.inner.lock() {
            state.text.push_str(fragment);
        }
    }

    /// Mark the stream complete.
    pub fn finish(&self) {
        if let Ok(mut state) = self.inner.lock() {
            state.complete = true;
        }
    }

    /// Whether the stream has been marked complete.
    pub fn is_complete(&self) -> bool {
        self.inner.lock().map(|s| s.complete).unwrap_or(false)
    }
}

impl TranscriptReader for TranscriptBuffer {
    fn snapshot(&self) -> (String, bool) {
        self.inner
            .lock()
            .map(|s| (s.text.clone(), s.complete))
            .unwrap_or_default()
    }
}

/// Maps a segment to the performance played for it.
pub type ComposeFn = Arc<dyn Fn(&Segment) -> PerformanceRequest + Send + Sync>;

/// One producer/consumer pass over a transcript stream.
pub struct ContentPipeline {
    resolver: Arc<VoiceResolver>,
    sequencer: Arc<Sequencer>,
    config: PipelineConfig,
}

impl ContentPipeline {
    /// Wire a pipeline to its resolver and sequencer.
    pub fn new(
        resolver: Arc<VoiceResolver>,
        sequencer: Arc<Sequencer>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            resolver,
            sequencer,
            config,
        }
    }

    /// Run until the source completes and every enqueued item has played,
    /// or until `cancel` fires. On cancellation the producer stops
    /// enqueueing and the consumer lets its in-progress item return
    /// abortively before exiting.
    pub async fn run(
        &self,
        source: Arc<dyn TranscriptReader>,
        segmenter: Segmenter,
        compose: ComposeFn,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let (tx, rx) = mpsc::unbounded_channel::<ContentItem>();

        let producer = {
            let resolver = Arc::clone(&self.resolver);
            let poll_interval = self.config.poll_interval();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                run_producer_stage(source, segmenter, compose, resolver, tx, poll_interval, cancel)
                    .await;
            })
        };
        let consumer = {
            let sequencer = Arc::clone(&self.sequencer);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                run_consumer_stage(rx, sequencer, cancel).await;
            })
        };

        let (produced, consumed) = tokio::join!(producer, consumer);
        produced.map_err(|e| PerformError::Channel(format!("producer stage failed: {e}")))?;
        consumed.map_err(|e| PerformError::Channel(format!("consumer stage failed: {e}")))?;
        debug!("content pipeline drained");
        Ok(())
    }
}

/// Poll the transcript, segment it, and enqueue composed items with their
/// audio prefetch already in flight.
async fn run_producer_stage(
    source: Arc<dyn TranscriptReader>,
    mut segmenter: Segmenter,
    compose: ComposeFn,
    resolver: Arc<VoiceResolver>,
    tx: mpsc::UnboundedSender<ContentItem>,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    let mut order = 0usize;
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let (text, complete) = source.snapshot();
        for segment in segmenter.poll(&text, complete) {
            let request = (compose)(&segment);
            prefetch_voices(&resolver, &request, &cancel);
            let item = ContentItem {
                segment,
                order,
                request,
            };
            order += 1;
            if tx.send(item).is_err() {
                warn!("content queue closed; producer stopping");
                return;
            }
        }
        if complete {
            info!("transcript complete; {order} item(s) enqueued");
            break;
        }
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(poll_interval) => {}
        }
    }
}

/// Start a detached resolution for every web/synthesized voice in the
/// request. Results land in the resolver cache; nothing waits here.
fn prefetch_voices(
    resolver: &Arc<VoiceResolver>,
    request: &PerformanceRequest,
    cancel: &CancellationToken,
) {
    for frame in &request.frames {
        for voice in &frame.voices {
            if matches!(voice.source, VoiceSource::Web | VoiceSource::Tts) {
                let resolver = Arc::clone(resolver);
                let voice = voice.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    let _ = resolver.resolve(&voice, &cancel).await;
                });
            }
        }
    }
}

/// Dequeue strictly FIFO, awaiting full playback of each item.
async fn run_consumer_stage(
    mut rx: mpsc::UnboundedReceiver<ContentItem>,
    sequencer: Arc<Sequencer>,
    cancel: CancellationToken,
) {
    loop {
        let item = tokio::select! {
            () = cancel.cancelled() => break,
            item = rx.recv() => match item {
                Some(item) => item,
                None => break,
            },
        };
        let outcome = sequencer.perform(&item.request, &cancel).await;
        if outcome == PerformanceOutcome::Cancelled {
            info!("playback cancelled at item {}", item.order);
            break;
        }
    }
}
