//! Marionette: streaming multimodal presentation pipeline for interactive
//! characters.
//!
//! Renders a character's output — cached or synthesized speech, body
//! animation, and facial expression — as one synchronized performance, even
//! while the text is still arriving token by token:
//! Text stream → Segmenter → Content pipeline → Sequencer → host executors
//!
//! # Architecture
//!
//! The pipeline is built from independent pieces wired by one cancellation
//! token:
//! - **Segmenter**: splits the growing transcript into speakable segments
//! - **Voice resolver**: caches and deduplicates audio resolution (local
//!   table, HTTP download, speech synthesis)
//! - **Content pipeline**: producer/consumer pair guaranteeing playback in
//!   original order while audio prefetch runs concurrently
//! - **Sequencer**: plays each request frame by frame, pacing on voice while
//!   animation and face run as detached tasks
//! - **Orchestrator**: explicit `start()`/`stop()` lifecycle plus the idle
//!   and blink loops around performances
//!
//! Rendering, rigging, audio devices, and synthesis engines stay outside,
//! behind the traits in [`stage`] and [`voice`].

pub mod config;
pub mod error;
pub mod idle;
pub mod orchestrator;
pub mod pipeline;
pub mod segmenter;
pub mod sequencer;
pub mod stage;
pub mod voice;

pub use config::PerformanceConfig;
pub use error::{PerformError, Result};
pub use orchestrator::Orchestrator;
pub use pipeline::messages::{
    AnimationDirective, ContentItem, FaceDirective, Frame, PerformanceRequest,
};
pub use pipeline::{ComposeFn, ContentPipeline, TranscriptBuffer, TranscriptReader};
pub use segmenter::{Segment, Segmenter};
pub use sequencer::{PerformanceOutcome, Sequencer};
pub use stage::{AnimationExecutor, AudioDevice, FaceExecutor};
pub use voice::resolver::VoiceResolver;
pub use voice::{
    AudioClip, AudioHandle, HttpVoiceLoader, LocalVoiceTable, SpeechSynthesizer, TtsRequest,
    Voice, VoiceSource, WebVoiceLoader,
};
