//! The session controller drives round-to-round progression.
//!
//! It owns the action queue, the scheduler, the playback engine for the
//! active trial, and the result pipeline. Shells interact with it through a
//! small command surface (`advance`, `play`, `submit_result`, `tick`) and
//! poll [`Event`]s back out, the same command/query split the timer engine
//! uses.
//!
//! ## State transitions
//!
//! ```text
//! Loading -> Active(view) -> ... -> Loading -> ... -> Final
//!                                             `-> Errored | Redirected
//! ```
//!
//! Queue pop and "queue empty -> fetch next round" are one logical step:
//! an in-flight fetch suppresses any re-entrant fetch for the same emptied
//! queue, and a generation counter keeps a batch of timer callbacks from
//! spilling into the action they did not belong to.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;

use crate::action::{Action, TrialConfig};
use crate::api::ApiClient;
use crate::dispatch::{resolve_view, ViewContract};
use crate::error::{CoreError, Result};
use crate::events::Event;
use crate::playback::{PlayOutcome, PlaybackEngine};
use crate::result::{Answer, AutoAdvancePlan, ResultPipeline};
use crate::session::{Block, Participant, Session, SessionState};
use crate::timer::{Scheduler, TimeSource, TimerTag};

#[derive(Debug)]
pub struct SessionController<A: ApiClient> {
    api: A,
    participant: Participant,
    block: Block,
    session: Session,
    state: SessionState,
    queue: VecDeque<Action>,
    current: Option<Action>,
    fetch_in_flight: bool,
    /// Incremented on every activation; timer batches check it so a
    /// callback scheduled for one action never fires into the next.
    generation: u64,
    turn_submitted: bool,
    timer_armed: bool,
    playback: Option<PlaybackEngine>,
    pipeline: ResultPipeline,
    scheduler: Scheduler,
    device_capable: bool,
    events: Vec<Event>,
}

impl<A: ApiClient> SessionController<A> {
    /// Load the block for `slug`, bind its session, and fetch the first
    /// round.
    ///
    /// Fails with [`CoreError::ConsentMissing`] before touching the network
    /// if the participant has not consented, [`CoreError::BlockNotFound`]
    /// if the server returns no block, and
    /// [`CoreError::SessionCreationFailed`] if the block carries no
    /// session id.
    pub async fn start(
        api: A,
        participant: Participant,
        slug: &str,
        clock: Arc<dyn TimeSource>,
        device_capable: bool,
    ) -> Result<Self> {
        if !participant.consent {
            return Err(CoreError::ConsentMissing);
        }
        let block = api.get_block(slug).await?;
        let session_id = block
            .session_id
            .ok_or_else(|| CoreError::SessionCreationFailed { slug: slug.into() })?;
        let session = Session { id: session_id };

        let mut controller = Self {
            api,
            participant,
            block,
            session,
            state: SessionState::Loading,
            queue: VecDeque::new(),
            current: None,
            fetch_in_flight: false,
            generation: 0,
            turn_submitted: false,
            timer_armed: false,
            playback: None,
            pipeline: ResultPipeline::new(clock.clone()),
            scheduler: Scheduler::new(clock),
            device_capable,
            events: Vec::new(),
        };
        controller.push_event(Event::BlockLoaded {
            slug: controller.block.slug.clone(),
            session_id,
            at: Utc::now(),
        });
        controller.advance(true).await;
        Ok(controller)
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The active action. `None` only before the first round arrives.
    pub fn current_action(&self) -> Option<&Action> {
        self.current.as_ref()
    }

    /// Resolve the active action to its view contract.
    pub fn current_view(&self) -> Option<ViewContract> {
        self.current
            .as_ref()
            .map(|action| resolve_view(action, &self.block))
    }

    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn session(&self) -> Session {
        self.session
    }

    pub fn participant(&self) -> &Participant {
        &self.participant
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn playback(&self) -> Option<&PlaybackEngine> {
        self.playback.as_ref()
    }

    /// Drain accumulated events. Shells poll this after every command.
    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Activate the next queued action or, when the queue is empty (or
    /// `end_round` drops it), fetch the next round and activate its head.
    pub async fn advance(&mut self, end_round: bool) {
        if self.state.is_terminal() {
            return;
        }
        if !end_round {
            if let Some(next) = self.queue.pop_front() {
                self.activate(next);
                return;
            }
        }
        if self.fetch_in_flight {
            return;
        }
        self.fetch_in_flight = true;
        self.queue.clear();
        self.state = SessionState::Loading;

        let fetched = self.api.next_round(self.session.id).await;
        self.fetch_in_flight = false;

        match fetched {
            Ok(actions) => {
                self.push_event(Event::RoundFetched {
                    actions: actions.len(),
                    at: Utc::now(),
                });
                self.queue = actions.into();
                match self.queue.pop_front() {
                    Some(head) => self.activate(head),
                    None => self.activate(Action::error("Server returned an empty round")),
                }
            }
            Err(err) => self.activate(Action::error(err.to_string())),
        }
    }

    /// Continue past a non-trial action (explainer, score, info, ...).
    pub async fn on_next(&mut self) {
        self.advance(false).await;
    }

    /// Start (or toggle off) playback of the given section.
    ///
    /// Returns `None` when the action has no playback, or when `play_once`
    /// forbids replaying a section that already completed.
    pub async fn play(&mut self, index: usize, offset_secs: f64) -> Option<PlayOutcome> {
        let previous = self.pipeline.previous_decision_time();
        let playback = self.playback.as_mut()?;
        if playback.spec().play_once && playback.has_completed(index) {
            return None;
        }
        let outcome = playback.play(&mut self.scheduler, index, offset_secs, previous);
        match outcome {
            PlayOutcome::Started { index, latency_ms } => {
                self.push_event(Event::PlaybackStarted {
                    index,
                    latency_ms,
                    at: Utc::now(),
                });
                self.arm_timer(latency_ms);
            }
            PlayOutcome::Stopped { index } => {
                self.push_event(Event::PlaybackStopped {
                    index,
                    at: Utc::now(),
                });
            }
            PlayOutcome::Muted => {
                // No end signal will ever come from a muted call; the
                // response timer runs from here.
                self.arm_timer(0.0);
            }
            PlayOutcome::GestureRequired { index } => {
                self.push_event(Event::PlaybackGestureRequired {
                    index,
                    at: Utc::now(),
                });
            }
            PlayOutcome::Failed { index } => {
                self.push_event(Event::PlaybackSectionFailed {
                    index,
                    reason: "asset unusable".into(),
                    at: Utc::now(),
                });
                self.arm_timer(0.0);
                // Treat as ended so the round does not stall on a bad
                // asset.
                self.playback_finished(index).await;
            }
        }
        Some(outcome)
    }

    /// Forward an explicit user gesture to the playback backend.
    pub fn user_gesture(&mut self) {
        if let Some(playback) = self.playback.as_mut() {
            playback.user_gesture();
        }
    }

    /// The shell reports that audio output for `index` ran to its end.
    pub async fn playback_output_ended(&mut self, index: usize) {
        let signal = match self.playback.as_mut() {
            Some(playback) => playback.output_ended(&mut self.scheduler, index),
            None => None,
        };
        if let Some(signal) = signal {
            self.playback_finished(signal.index).await;
        }
    }

    /// Fire due timers. Call periodically from the shell's loop.
    pub async fn tick(&mut self) {
        let generation = self.generation;
        for tag in self.scheduler.tick() {
            if self.generation != generation {
                // A previous callback advanced the action; the rest of
                // this batch belonged to the old one.
                break;
            }
            match tag {
                TimerTag::PlaybackTimeout => {
                    let signal = self
                        .playback
                        .as_mut()
                        .and_then(|playback| playback.deferral_elapsed());
                    if let Some(signal) = signal {
                        self.playback_finished(signal.index).await;
                    }
                }
                TimerTag::AutoAdvance | TimerTag::ResponseDeadline => {
                    self.submit_timed_out().await;
                }
            }
        }
    }

    /// Submit the participant's answers for the active trial and advance.
    ///
    /// A non-trial action simply advances. Repeated submissions for the
    /// same action are coalesced: only the first one counts.
    pub async fn submit_result(&mut self, answers: Vec<Answer>, has_timed_out: bool) {
        if self.turn_submitted {
            return;
        }
        let config = match &self.current {
            Some(Action::Trial { config, .. }) => config.clone(),
            Some(_) => {
                self.advance(false).await;
                return;
            }
            None => return,
        };
        self.turn_submitted = true;
        self.scheduler.cancel_tag(TimerTag::AutoAdvance);
        self.scheduler.cancel_tag(TimerTag::ResponseDeadline);

        let latency_ms = self
            .playback
            .as_ref()
            .map(|p| p.last_latency_ms())
            .unwrap_or(0.0);
        let submission =
            self.pipeline
                .build(self.session.id, has_timed_out, &answers, latency_ms, &config);
        let posted = self.pipeline.submit(&self.api, &submission).await;
        if posted {
            self.push_event(Event::ResultSubmitted {
                decision_time: submission.decision_time,
                timed_out: has_timed_out,
                at: Utc::now(),
            });
        } else {
            self.push_event(Event::ResultSubmissionFailed {
                reason: "result POST failed".into(),
                at: Utc::now(),
            });
        }

        let values: Vec<String> = submission.form.iter().map(|a| a.value.clone()).collect();
        let break_round =
            ResultPipeline::evaluate_break(&values, config.break_round_on.as_ref());
        if break_round {
            self.push_event(Event::RoundAborted { at: Utc::now() });
        }
        self.advance(break_round).await;
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Answers for a timed-out submission: the trial's survey questions
    /// with whatever values they carry (all overwritten with TIMEOUT by
    /// the pipeline).
    fn answer_template(&self) -> Vec<Answer> {
        match &self.current {
            Some(Action::Trial {
                feedback_form: Some(form),
                ..
            }) => form
                .form
                .iter()
                .map(|q| Answer {
                    key: q.key.clone(),
                    value: q.value.clone(),
                    is_skippable: q.is_skippable,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    async fn submit_timed_out(&mut self) {
        let answers = self.answer_template();
        self.submit_result(answers, true).await;
    }

    /// Playback for the active trial has fully finished (including any
    /// `timeout_after_playback` deferral). Apply the auto-advance policy.
    async fn playback_finished(&mut self, index: usize) {
        self.push_event(Event::PlaybackEnded {
            index,
            at: Utc::now(),
        });
        let config: TrialConfig = match &self.current {
            Some(Action::Trial { config, .. }) => config.clone(),
            _ => return,
        };
        match ResultPipeline::auto_advance_plan(&config) {
            AutoAdvancePlan::Immediate => self.submit_timed_out().await,
            AutoAdvancePlan::After(ms) => {
                self.scheduler.schedule(ms, TimerTag::AutoAdvance);
            }
            AutoAdvancePlan::Manual => {}
        }
    }

    /// Make `action` the active one, tearing down everything the previous
    /// action scheduled in the same logical step.
    fn activate(&mut self, action: Action) {
        self.scheduler.clear();
        if let Some(playback) = self.playback.as_mut() {
            playback.stop(&mut self.scheduler);
        }
        self.playback = None;
        self.turn_submitted = false;
        self.timer_armed = false;
        self.generation += 1;

        let kind = resolve_view(&action, &self.block).kind;
        self.state = match &action {
            Action::Final { .. } => SessionState::Final,
            Action::Redirect { .. } => SessionState::Redirected,
            Action::Error { .. } => SessionState::Errored,
            _ => SessionState::Active(kind),
        };
        self.push_event(Event::ActionActivated {
            view: kind,
            state: self.state,
            at: Utc::now(),
        });

        match &action {
            Action::Redirect { url } => {
                // Side-exit: control passes to external navigation.
                self.push_event(Event::RedirectRequested {
                    url: url.clone(),
                    at: Utc::now(),
                });
            }
            Action::Final { .. } => {
                self.push_event(Event::SessionFinished { at: Utc::now() });
            }
            Action::Error { error_text } => {
                self.push_event(Event::ErrorRaised {
                    message: error_text.clone(),
                    at: Utc::now(),
                });
            }
            _ => {}
        }

        if let Action::Trial {
            playback: Some(spec),
            config,
            ..
        } = &action
        {
            let mut engine = PlaybackEngine::new(spec.clone(), self.device_capable);
            engine.preload();
            self.playback = Some(engine);
            if !config.listen_first {
                self.arm_timer(0.0);
            }
        } else {
            self.arm_timer(0.0);
        }

        if let Action::Trial { config, .. } = &action {
            if let Some(ms) = config.response_time {
                self.scheduler.schedule(ms, TimerTag::ResponseDeadline);
            }
        }
        if let Action::Explainer {
            timer: Some(ms), ..
        } = &action
        {
            self.scheduler.schedule(*ms, TimerTag::AutoAdvance);
        }

        self.current = Some(action);
    }

    /// Start the response timer once per action. For playback trials with
    /// `listen_first` this happens at audible playback start, shifted by
    /// the reported latency.
    fn arm_timer(&mut self, latency_ms: f64) {
        if !self.timer_armed {
            self.pipeline.start_timer(latency_ms);
            self.timer_armed = true;
        }
    }

    fn push_event(&mut self, event: Event) {
        self.events.push(event);
    }
}
