//! Idle animation and blink background loops.
//!
//! Both run as detached tasks. The idle loop is restartable — it is
//! cancelled when a performance starts and started again when one ends.
//! The blink loop keeps running for the life of the orchestrator and is
//! gated by a suspend flag while a performance asks for no blinking.

use crate::config::IdleConfig;
use crate::stage::{AnimationExecutor, FaceExecutor};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Cycles idle animation clips on the base layer while the character has
/// nothing to perform.
pub struct IdleLoop {
    animator: Arc<dyn AnimationExecutor>,
    config: IdleConfig,
    fade: Duration,
    running: Mutex<Option<CancellationToken>>,
}

impl IdleLoop {
    /// Create a stopped idle loop.
    pub fn new(animator: Arc<dyn AnimationExecutor>, config: IdleConfig, fade: Duration) -> Self {
        Self {
            animator,
            config,
            fade,
            running: Mutex::new(None),
        }
    }

    /// Start idling. No-op when already running or no clips are configured.
    pub fn start(&self) {
        let Ok(mut slot) = self.running.lock() else {
            return;
        };
        if slot.is_some() {
            return;
        }
        if self.config.clips.is_empty() {
            warn!("no idle clips configured; idle loop not started");
            return;
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        let animator = Arc::clone(&self.animator);
        let config = self.config.clone();
        let fade = self.fade;
        tokio::spawn(async move {
            run_idle_loop(animator, config, fade, token).await;
        });
        debug!("idle loop started");
    }

    /// Stop idling. No-op when not running.
    pub fn stop(&self) {
        let Ok(mut slot) = self.running.lock() else {
            return;
        };
        if let Some(token) = slot.take() {
            token.cancel();
            debug!("idle loop stopped");
        }
    }

    /// Whether the idle loop is currently running.
    pub fn is_idling(&self) -> bool {
        self.running.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }
}

async fn run_idle_loop(
    animator: Arc<dyn AnimationExecutor>,
    config: IdleConfig,
    fade: Duration,
    cancel: CancellationToken,
) {
    let mut index = 0usize;
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let clip = &config.clips[index % config.clips.len()];
        if let Err(e) = animator.play(&config.base_layer, clip, fade, config.interval()) {
            warn!("idle clip '{clip}' failed: {e}");
        }
        index += 1;
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(config.interval()) => {}
        }
    }
}

/// Plays the blink face clip periodically, unless suspended.
pub struct BlinkLoop {
    face: Arc<dyn FaceExecutor>,
    config: IdleConfig,
    suspended: Arc<AtomicBool>,
    running: Mutex<Option<CancellationToken>>,
}

impl BlinkLoop {
    /// Create a stopped blink loop.
    pub fn new(face: Arc<dyn FaceExecutor>, config: IdleConfig) -> Self {
        Self {
            face,
            config,
            suspended: Arc::new(AtomicBool::new(false)),
            running: Mutex::new(None),
        }
    }

    /// Start blinking. No-op when already running.
    pub fn start(&self) {
        let Ok(mut slot) = self.running.lock() else {
            return;
        };
        if slot.is_some() {
            return;
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        let face = Arc::clone(&self.face);
        let config = self.config.clone();
        let suspended = Arc::clone(&self.suspended);
        tokio::spawn(async move {
            run_blink_loop(face, config, suspended, token).await;
        });
        debug!("blink loop started");
    }

    /// Stop the blink task entirely.
    pub fn stop(&self) {
        let Ok(mut slot) = self.running.lock() else {
            return;
        };
        if let Some(token) = slot.take() {
            token.cancel();
            debug!("blink loop stopped");
        }
    }

    /// Hold blinks while a performance asks for a still face.
    pub fn suspend(&self) {
        self.suspended.store(true, Ordering::Relaxed);
    }

    /// Resume blinking after a suspension.
    pub fn resume(&self) {
        self.suspended.store(false, Ordering::Relaxed);
    }

    /// Whether blinks are currently suspended.
    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Relaxed)
    }
}

async fn run_blink_loop(
    face: Arc<dyn FaceExecutor>,
    config: IdleConfig,
    suspended: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(config.blink_interval()) => {}
        }
        if suspended.load(Ordering::Relaxed) {
            continue;
        }
        if let Err(e) = face.play(&config.blink_clip, config.blink_duration()) {
            warn!("blink failed: {e}");
        }
    }
}
