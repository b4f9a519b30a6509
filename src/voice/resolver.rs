//! Voice resolution with caching and in-flight deduplication.
//!
//! [`VoiceResolver`] turns a [`Voice`] descriptor into a playable
//! [`AudioHandle`]. Concurrent callers asking for the same cache key share a
//! single underlying download/synthesis; waiting is bounded by a timeout
//! that stops only the waiting caller, never the underlying operation — a
//! timed-out resolution keeps running and still warms the cache.

use crate::config::ResolverConfig;
use crate::voice::{AudioHandle, SpeechSynthesizer, Voice, VoiceSource, WebVoiceLoader};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Cache and in-flight bookkeeping, guarded together so check-then-insert is
/// atomic per cache key. The lock is never held across an await.
#[derive(Default)]
struct ResolverState {
    cache: HashMap<String, AudioHandle>,
    in_flight: HashMap<String, watch::Receiver<bool>>,
}

/// What `resolve` decided to do for a key, under one lock acquisition.
enum Plan {
    /// Another caller's resolution is running; wait for its signal.
    Wait(watch::Receiver<bool>),
    /// The cache already has the clip.
    Hit(AudioHandle),
    /// This caller starts the resolution; the sender completes the signal.
    Start(watch::Sender<bool>, watch::Receiver<bool>),
}

/// Resolves voices to playable audio with caching and request dedup.
pub struct VoiceResolver {
    state: Arc<Mutex<ResolverState>>,
    web: Option<Arc<dyn WebVoiceLoader>>,
    tts: Option<Arc<dyn SpeechSynthesizer>>,
    wait_timeout: Duration,
}

impl VoiceResolver {
    /// Create a resolver with no sources attached.
    pub fn new(config: &ResolverConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(ResolverState::default())),
            web: None,
            tts: None,
            wait_timeout: config.wait_timeout(),
        }
    }

    /// Attach the loader used for [`VoiceSource::Web`] voices.
    pub fn with_web_loader(mut self, loader: Arc<dyn WebVoiceLoader>) -> Self {
        self.web = Some(loader);
        self
    }

    /// Attach the synthesizer used for [`VoiceSource::Tts`] voices.
    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        self.tts = Some(synthesizer);
        self
    }

    /// Resolve `voice` to a playable handle.
    ///
    /// Returns `None` on failure, bounded-wait expiry, or cancellation; the
    /// failure is logged, never raised. An underlying operation started here
    /// is detached: cancelling or timing out this caller does not abort it,
    /// and its result still populates the cache for later callers.
    pub async fn resolve(&self, voice: &Voice, cancel: &CancellationToken) -> Option<AudioHandle> {
        if voice.source == VoiceSource::Local {
            warn!(
                "local voice '{}' reached the resolver; local clips come from the preloaded table",
                voice.cache_key()
            );
            return None;
        }
        if cancel.is_cancelled() {
            return None;
        }

        match self.plan(voice)? {
            Plan::Hit(handle) => Some(handle),
            Plan::Wait(rx) => {
                if !self.wait_done(rx, voice.cache_key(), cancel).await {
                    return None;
                }
                self.take_cached(voice)
            }
            Plan::Start(tx, rx) => {
                self.spawn_resolution(voice.clone(), tx);
                if !self.wait_done(rx, voice.cache_key(), cancel).await {
                    return None;
                }
                self.take_cached(voice)
            }
        }
    }

    /// Whether the cache currently holds this voice's clip.
    pub fn has_cache(&self, voice: &Voice) -> bool {
        self.state
            .lock()
            .map(|st| st.cache.contains_key(voice.cache_key()))
            .unwrap_or(false)
    }

    /// Whether a resolution for this voice's key is currently running.
    pub fn is_loading(&self, voice: &Voice) -> bool {
        self.state
            .lock()
            .map(|st| st.in_flight.contains_key(voice.cache_key()))
            .unwrap_or(false)
    }

    /// One atomic look at both maps: in-flight first, then cache, otherwise
    /// register a new in-flight entry for this caller to start.
    fn plan(&self, voice: &Voice) -> Option<Plan> {
        let Ok(mut st) = self.state.lock() else {
            return None;
        };
        if let Some(rx) = st.in_flight.get(voice.cache_key()) {
            return Some(Plan::Wait(rx.clone()));
        }
        if let Some(handle) = st.cache.get(voice.cache_key()).cloned() {
            if !voice.use_cache {
                st.cache.remove(voice.cache_key());
            }
            return Some(Plan::Hit(handle));
        }
        let (tx, rx) = watch::channel(false);
        st.in_flight.insert(voice.cache_key().to_owned(), rx.clone());
        Some(Plan::Start(tx, rx))
    }

    /// Run the underlying resolution as a detached task. A successful result
    /// is cached unconditionally; the in-flight entry is cleared either way.
    fn spawn_resolution(&self, voice: Voice, tx: watch::Sender<bool>) {
        let state = Arc::clone(&self.state);
        let web = self.web.clone();
        let tts = self.tts.clone();
        tokio::spawn(async move {
            let key = voice.cache_key().to_owned();
            let result = run_resolution(&voice, web, tts).await;
            if let Ok(mut st) = state.lock() {
                if let Some(handle) = result {
                    st.cache.insert(key.clone(), handle);
                }
                st.in_flight.remove(&key);
            }
            // Wake every caller waiting on this resolution.
            let _ = tx.send(true);
        });
    }

    /// Wait for the completion signal, bounded by the configured timeout.
    /// Returns false only on cancellation; expiry falls through to the cache
    /// check like a completed wait.
    async fn wait_done(
        &self,
        mut rx: watch::Receiver<bool>,
        key: &str,
        cancel: &CancellationToken,
    ) -> bool {
        tokio::select! {
            () = cancel.cancelled() => false,
            outcome = tokio::time::timeout(self.wait_timeout, rx.wait_for(|done| *done)) => {
                if outcome.is_err() {
                    warn!(
                        "bounded wait for '{key}' elapsed after {:?}; resolution continues in the background",
                        self.wait_timeout
                    );
                }
                true
            }
        }
    }

    /// Single cache read honoring `use_cache`: a hit with `use_cache = false`
    /// evicts the entry right after this read (later resolutions may
    /// re-populate it).
    fn take_cached(&self, voice: &Voice) -> Option<AudioHandle> {
        let Ok(mut st) = self.state.lock() else {
            return None;
        };
        let found = st.cache.get(voice.cache_key()).cloned();
        if found.is_some() && !voice.use_cache {
            st.cache.remove(voice.cache_key());
        }
        found
    }
}

/// Dispatch to the source-specific loader. Any failure, including an empty
/// clip, collapses to `None` with a diagnostic.
async fn run_resolution(
    voice: &Voice,
    web: Option<Arc<dyn WebVoiceLoader>>,
    tts: Option<Arc<dyn SpeechSynthesizer>>,
) -> Option<AudioHandle> {
    let outcome = match voice.source {
        VoiceSource::Web => {
            let Some(loader) = web else {
                error!("no web loader configured; cannot resolve '{}'", voice.cache_key());
                return None;
            };
            let Some(url) = voice.url.as_deref() else {
                error!("web voice '{}' has no URL", voice.cache_key());
                return None;
            };
            loader.fetch(url).await
        }
        VoiceSource::Tts => {
            let Some(engine) = tts else {
                error!("no synthesizer configured; cannot resolve '{}'", voice.cache_key());
                return None;
            };
            let Some(text) = voice.text.as_deref() else {
                error!("tts voice '{}' has no text", voice.cache_key());
                return None;
            };
            let request = voice.tts_request.clone().unwrap_or_default();
            engine.synthesize(text, &request).await
        }
        VoiceSource::Local => return None,
    };

    match outcome {
        Ok(handle) if handle.samples.is_empty() => {
            warn!("resolved an empty clip for '{}'", voice.cache_key());
            None
        }
        Ok(handle) => Some(handle),
        Err(e) => {
            error!("voice resolution failed for '{}': {e}", voice.cache_key());
            None
        }
    }
}
