//! # Hearlab Core Library
//!
//! Core runtime for multi-round behavioral listening experiments: it
//! fetches rounds of actions from a server, sequences them, schedules
//! audio section playback in tight synchronization with response timing,
//! and submits results with research-grade timing precision. Shells (the
//! CLI, a future GUI) are thin layers over this library.
//!
//! ## Architecture
//!
//! - **Session Controller**: the orchestrator - loads a block, binds its
//!   session, owns the action queue, and drives round-to-round progression
//! - **Playback Engine**: schedules one audio section at a time over
//!   trait-based backends, compensating start latency
//! - **Result Pipeline**: decision-time measurement, timeout/auto-advance
//!   and break-round policy, non-blocking submission
//! - **Scheduler**: cancellable wall-clock timers, ticked by the shell
//!
//! ## Key Components
//!
//! - [`SessionController`]: round/action state machine
//! - [`PlaybackEngine`]: per-trial playback scheduling
//! - [`ResultPipeline`]: timing and submission policy
//! - [`resolve_view`]: action-to-view-contract dispatch

pub mod action;
pub mod api;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod playback;
pub mod result;
pub mod session;
pub mod timer;

pub use action::{
    Action, BreakRoundOn, FeedbackForm, PlayMethod, PlaybackSpec, PlaybackView, Question, Section,
    TrialConfig,
};
pub use api::{ApiClient, HttpApiClient};
pub use config::Config;
pub use dispatch::{resolve_view, ViewContract, ViewKind, ViewProps};
pub use error::{ConfigError, CoreError, PlaybackError, Result};
pub use events::Event;
pub use playback::{PlayOutcome, PlaybackEngine};
pub use result::{Answer, AnswerValue, ResultPipeline, ResultSubmission, TIMEOUT_VALUE};
pub use session::{Block, Participant, Playlist, Session, SessionController, SessionState};
pub use timer::{Scheduler, StubTimeSource, SystemTimeSource, TimeSource, TimerHandle, TimerTag};
