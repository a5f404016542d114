//! Audio section playback: backends and the turn-level scheduling engine.

mod backend;
mod engine;

pub use backend::{
    select_backend, BufferedBackend, ExternalBackend, NoAudioBackend, PlaybackBackend,
    BUFFER_LATENCY_MS, EXTERNAL_LATENCY_MS,
};
pub use engine::{EndSignal, PlayOutcome, PlaybackEngine};
