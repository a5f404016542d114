//! Playback scheduling for one trial's sections.
//!
//! The engine owns the turn-level invariants: one active section, one live
//! end-listener, toggle semantics on replay of the active index, latency
//! reporting for response-timer compensation, and the deferred finished
//! signal when `timeout_after_playback` is set. It does not touch the
//! output device directly - that is the selected backend's job.

use crate::action::{PlaybackSpec, Section};
use crate::error::PlaybackError;
use crate::playback::backend::{select_backend, PlaybackBackend};
use crate::timer::{Scheduler, TimerHandle, TimerTag};

/// What a `play` call did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayOutcome {
    /// Output began; `latency_ms` shifts the caller's response timer.
    Started { index: usize, latency_ms: f64 },
    /// The call toggled the active section off.
    Stopped { index: usize },
    /// Muted trial: output was stopped, no end-listener registered.
    Muted,
    /// Autoplay was rejected; the caller falls back to a user gesture.
    GestureRequired { index: usize },
    /// The section asset is unusable; the caller should treat the turn's
    /// playback as ended rather than stall the round.
    Failed { index: usize },
}

/// Emitted when a play invocation's turn has fully finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndSignal {
    pub index: usize,
}

/// The single live end-listener. Registering a new one always tears the
/// previous one down first.
#[derive(Debug)]
struct EndListener {
    index: usize,
    deferral: Option<TimerHandle>,
}

#[derive(Debug)]
pub struct PlaybackEngine {
    spec: PlaybackSpec,
    backend: Box<dyn PlaybackBackend>,
    active: Option<usize>,
    listener: Option<EndListener>,
    completed: Vec<bool>,
    last_latency_ms: f64,
}

impl PlaybackEngine {
    pub fn new(spec: PlaybackSpec, device_capable: bool) -> Self {
        let backend = select_backend(spec.play_method, device_capable);
        let completed = vec![false; spec.sections.len()];
        Self {
            spec,
            backend,
            active: None,
            listener: None,
            completed,
            last_latency_ms: 0.0,
        }
    }

    pub fn spec(&self) -> &PlaybackSpec {
        &self.spec
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    /// Latency reported by the most recent successful start.
    pub fn last_latency_ms(&self) -> f64 {
        self.last_latency_ms
    }

    /// End-event history: whether this index has already finished once.
    /// `play_once` enforcement lives with the caller.
    pub fn has_completed(&self, index: usize) -> bool {
        self.completed.get(index).copied().unwrap_or(false)
    }

    pub fn has_listener(&self) -> bool {
        self.listener.is_some()
    }

    /// Forward an explicit user gesture to the backend, unlocking
    /// autoplay-restricted devices.
    pub fn user_gesture(&mut self) {
        self.backend.user_gesture();
    }

    /// Fetch sections ahead of the first play. A failed preload is a
    /// warning, not an error: playback for the bad asset will report
    /// `Failed` and the turn still ends.
    pub fn preload(&mut self) {
        if let Err(err) = self.backend.preload(&self.spec.sections) {
            log::warn!("Section preload failed: {err}");
        }
    }

    /// Start playback of `sections[index]`, or stop it if that index is
    /// already active (toggle semantics).
    ///
    /// The true start offset is
    /// `offset_secs + (resume_play ? previous_decision_time : 0) + play_from`;
    /// a missing previous decision time counts as zero.
    pub fn play(
        &mut self,
        scheduler: &mut Scheduler,
        index: usize,
        offset_secs: f64,
        previous_decision_time: Option<f64>,
    ) -> PlayOutcome {
        if self.active == Some(index) {
            self.backend.stop();
            self.active = None;
            self.clear_listener(scheduler);
            return PlayOutcome::Stopped { index };
        }

        // Release the device and listener from the previous section in the
        // same logical step as acquiring them for the new one.
        self.backend.stop();
        self.active = None;
        self.clear_listener(scheduler);

        if self.spec.mute {
            return PlayOutcome::Muted;
        }

        let Some(section) = self.spec.sections.get(index).cloned() else {
            log::warn!("Play requested for out-of-range section index {index}");
            return PlayOutcome::Failed { index };
        };

        let resume = if self.spec.resume_play {
            previous_decision_time.unwrap_or(0.0)
        } else {
            0.0
        };
        let offset = offset_secs + resume + self.spec.play_from;

        match self.backend.start(&section, offset) {
            Ok(latency_ms) => {
                self.active = Some(index);
                self.listener = Some(EndListener {
                    index,
                    deferral: None,
                });
                self.last_latency_ms = latency_ms;
                PlayOutcome::Started { index, latency_ms }
            }
            Err(PlaybackError::AutoplayRejected) => PlayOutcome::GestureRequired { index },
            Err(err) => {
                log::warn!("Playback failed for section {}: {err}", section_label(&section));
                self.mark_completed(index);
                PlayOutcome::Failed { index }
            }
        }
    }

    /// The backend reports that output for `index` ran to the end.
    ///
    /// Returns the end signal if the turn finishes now; returns `None` when
    /// the signal is stale, already consumed, or deferred by
    /// `timeout_after_playback` (in which case the scheduler delivers it
    /// later via [`Self::deferral_elapsed`]).
    pub fn output_ended(&mut self, scheduler: &mut Scheduler, index: usize) -> Option<EndSignal> {
        let listener = self.listener.as_mut()?;
        if listener.index != index || listener.deferral.is_some() {
            return None;
        }
        // Output is done either way; the device is free.
        self.active = None;
        if let Some(ms) = self.spec.timeout_after_playback {
            listener.deferral = Some(scheduler.schedule(ms, TimerTag::PlaybackTimeout));
            return None;
        }
        self.finish()
    }

    /// The deferred finished signal came due.
    pub fn deferral_elapsed(&mut self) -> Option<EndSignal> {
        match &self.listener {
            Some(listener) if listener.deferral.is_some() => self.finish(),
            _ => None,
        }
    }

    /// Tear down everything this engine scheduled: active output, the live
    /// end-listener, and any pending deferral. Called on deactivation.
    pub fn stop(&mut self, scheduler: &mut Scheduler) {
        self.backend.stop();
        self.active = None;
        self.clear_listener(scheduler);
    }

    fn finish(&mut self) -> Option<EndSignal> {
        let listener = self.listener.take()?;
        self.active = None;
        self.mark_completed(listener.index);
        Some(EndSignal {
            index: listener.index,
        })
    }

    fn clear_listener(&mut self, scheduler: &mut Scheduler) {
        if let Some(listener) = self.listener.take() {
            if let Some(handle) = listener.deferral {
                scheduler.cancel(handle);
            }
        }
    }

    fn mark_completed(&mut self, index: usize) {
        if let Some(slot) = self.completed.get_mut(index) {
            *slot = true;
        }
    }
}

fn section_label(section: &Section) -> String {
    format!("{} ({})", section.id, section.url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{PlayMethod, PlaybackSpec, Section};
    use crate::timer::{StubTimeSource, TimeSource};
    use std::sync::Arc;

    fn spec(n: usize) -> PlaybackSpec {
        PlaybackSpec {
            sections: (0..n as i64)
                .map(|id| Section {
                    id,
                    url: format!("https://assets/{id}.mp3"),
                })
                .collect(),
            play_method: PlayMethod::Buffer,
            play_from: 0.0,
            mute: false,
            play_once: false,
            resume_play: false,
            timeout_after_playback: None,
            view: Default::default(),
            instruction: None,
            labels: Vec::new(),
        }
    }

    fn setup(spec: PlaybackSpec) -> (Arc<StubTimeSource>, Scheduler, PlaybackEngine) {
        let clock = Arc::new(StubTimeSource::new());
        let scheduler = Scheduler::new(clock.clone() as Arc<dyn TimeSource>);
        let engine = PlaybackEngine::new(spec, true);
        (clock, scheduler, engine)
    }

    #[test]
    fn play_reports_latency_and_registers_listener() {
        let (_clock, mut scheduler, mut engine) = setup(spec(2));
        let outcome = engine.play(&mut scheduler, 0, 0.0, None);
        match outcome {
            PlayOutcome::Started { index, latency_ms } => {
                assert_eq!(index, 0);
                assert!(latency_ms > 0.0);
            }
            other => panic!("Expected start, got {:?}", other),
        }
        assert_eq!(engine.active_index(), Some(0));
        assert!(engine.has_listener());
    }

    #[test]
    fn replaying_active_index_toggles_off() {
        let (_clock, mut scheduler, mut engine) = setup(spec(2));
        engine.play(&mut scheduler, 1, 0.0, None);
        let outcome = engine.play(&mut scheduler, 1, 0.0, None);
        assert_eq!(outcome, PlayOutcome::Stopped { index: 1 });
        assert_eq!(engine.active_index(), None);
        assert!(!engine.has_listener());
    }

    #[test]
    fn switching_sections_keeps_one_listener() {
        let (_clock, mut scheduler, mut engine) = setup(spec(3));
        engine.play(&mut scheduler, 0, 0.0, None);
        engine.play(&mut scheduler, 1, 0.0, None);
        engine.play(&mut scheduler, 2, 0.0, None);
        assert_eq!(engine.active_index(), Some(2));
        // The old listeners are gone: an ended signal for a stale index is
        // ignored.
        assert!(engine.output_ended(&mut scheduler, 0).is_none());
        assert!(engine.output_ended(&mut scheduler, 1).is_none());
        assert_eq!(
            engine.output_ended(&mut scheduler, 2),
            Some(EndSignal { index: 2 })
        );
    }

    #[test]
    fn ended_fires_exactly_once_per_play() {
        let (_clock, mut scheduler, mut engine) = setup(spec(1));
        engine.play(&mut scheduler, 0, 0.0, None);
        assert!(engine.output_ended(&mut scheduler, 0).is_some());
        assert!(engine.output_ended(&mut scheduler, 0).is_none());
        assert!(engine.has_completed(0));
    }

    #[test]
    fn timeout_after_playback_defers_end_signal() {
        let mut s = spec(1);
        s.timeout_after_playback = Some(500);
        let (clock, mut scheduler, mut engine) = setup(s);
        engine.play(&mut scheduler, 0, 0.0, None);
        assert!(engine.output_ended(&mut scheduler, 0).is_none());
        assert_eq!(scheduler.pending_count(), 1);

        clock.advance(500);
        assert_eq!(scheduler.tick(), vec![TimerTag::PlaybackTimeout]);
        assert_eq!(engine.deferral_elapsed(), Some(EndSignal { index: 0 }));
        assert!(!engine.has_listener());
    }

    #[test]
    fn muted_play_stops_output_and_registers_no_listener() {
        let mut s = spec(2);
        s.mute = true;
        let (_clock, mut scheduler, mut engine) = setup(s);
        let outcome = engine.play(&mut scheduler, 0, 0.0, None);
        assert_eq!(outcome, PlayOutcome::Muted);
        assert_eq!(engine.active_index(), None);
        assert!(!engine.has_listener());
        assert!(engine.output_ended(&mut scheduler, 0).is_none());
    }

    #[test]
    fn autoplay_rejection_is_swallowed() {
        // A locked device models the browser autoplay policy.
        let clock = Arc::new(StubTimeSource::new());
        let mut scheduler = Scheduler::new(clock as Arc<dyn TimeSource>);
        let mut engine = PlaybackEngine::new(spec(1), true);
        engine.backend = Box::new(crate::playback::backend::BufferedBackend::locked());
        let outcome = engine.play(&mut scheduler, 0, 0.0, None);
        assert_eq!(outcome, PlayOutcome::GestureRequired { index: 0 });
        assert!(!engine.has_listener());

        // After an explicit gesture the same call goes through.
        engine.user_gesture();
        assert!(matches!(
            engine.play(&mut scheduler, 0, 0.0, None),
            PlayOutcome::Started { .. }
        ));
    }

    #[test]
    fn bad_asset_reports_failed_and_marks_completed() {
        let mut s = spec(1);
        s.sections[0].url = String::new();
        let (_clock, mut scheduler, mut engine) = setup(s);
        let outcome = engine.play(&mut scheduler, 0, 0.0, None);
        assert_eq!(outcome, PlayOutcome::Failed { index: 0 });
        assert!(engine.has_completed(0));
        assert_eq!(engine.active_index(), None);
    }

    #[test]
    fn stop_cancels_pending_deferral() {
        let mut s = spec(1);
        s.timeout_after_playback = Some(1000);
        let (_clock, mut scheduler, mut engine) = setup(s);
        engine.play(&mut scheduler, 0, 0.0, None);
        engine.output_ended(&mut scheduler, 0);
        assert_eq!(scheduler.pending_count(), 1);
        engine.stop(&mut scheduler);
        assert_eq!(scheduler.pending_count(), 0);
        assert!(!engine.has_listener());
    }
}
