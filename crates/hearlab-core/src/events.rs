use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dispatch::ViewKind;
use crate::session::SessionState;

/// Every observable transition in the runtime produces an Event.
/// Shells poll for events; telemetry hooks subscribe to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    BlockLoaded {
        slug: String,
        session_id: i64,
        at: DateTime<Utc>,
    },
    RoundFetched {
        actions: usize,
        at: DateTime<Utc>,
    },
    ActionActivated {
        view: ViewKind,
        state: SessionState,
        at: DateTime<Utc>,
    },
    PlaybackStarted {
        index: usize,
        latency_ms: f64,
        at: DateTime<Utc>,
    },
    PlaybackStopped {
        index: usize,
        at: DateTime<Utc>,
    },
    PlaybackEnded {
        index: usize,
        at: DateTime<Utc>,
    },
    /// Autoplay was rejected; the shell should fall back to a
    /// gesture-driven control and retry from there.
    PlaybackGestureRequired {
        index: usize,
        at: DateTime<Utc>,
    },
    /// A section asset failed to decode; playback was treated as ended so
    /// the round does not stall.
    PlaybackSectionFailed {
        index: usize,
        reason: String,
        at: DateTime<Utc>,
    },
    ResultSubmitted {
        decision_time: f64,
        timed_out: bool,
        at: DateTime<Utc>,
    },
    /// A result POST failed. The round continues; this event is the
    /// explicit hook for retry or telemetry layers.
    ResultSubmissionFailed {
        reason: String,
        at: DateTime<Utc>,
    },
    /// An answer matched the break condition; remaining actions of the
    /// round were dropped.
    RoundAborted {
        at: DateTime<Utc>,
    },
    SessionFinished {
        at: DateTime<Utc>,
    },
    RedirectRequested {
        url: String,
        at: DateTime<Utc>,
    },
    ErrorRaised {
        message: String,
        at: DateTime<Utc>,
    },
}
