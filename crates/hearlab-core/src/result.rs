//! Result pipeline: decision timing, timeout/auto-advance policy,
//! break-round evaluation, and non-blocking submission.
//!
//! Decision time is the wall-clock interval between the moment an action
//! became interactive and the submission, with the response-timer origin
//! shifted by the measured audio start latency so stopwatch drift does not
//! bias the measurement.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::action::{BreakRoundOn, TrialConfig};
use crate::api::ApiClient;
use crate::timer::TimeSource;

/// Marker written over every answer value of a timed-out submission.
pub const TIMEOUT_VALUE: &str = "TIMEOUT";

/// One answer as collected from a view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub key: String,
    pub value: Option<String>,
    #[serde(default)]
    pub is_skippable: bool,
}

impl Answer {
    pub fn new(key: impl Into<String>, value: Option<String>) -> Self {
        Self {
            key: key.into(),
            value,
            is_skippable: false,
        }
    }
}

/// One normalized answer value as posted to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerValue {
    pub key: String,
    pub value: String,
}

/// The payload posted once per completed action. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSubmission {
    pub session: i64,
    /// Seconds spent actively responding.
    pub decision_time: f64,
    pub audio_latency_ms: f64,
    pub form: Vec<AnswerValue>,
    pub config: serde_json::Value,
}

/// When the timed submission for an action should happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoAdvancePlan {
    /// Only an explicit user submission advances.
    Manual,
    /// Submit immediately when playback finishes.
    Immediate,
    /// Submit this many milliseconds after playback finishes.
    After(u64),
}

#[derive(Debug)]
pub struct ResultPipeline {
    clock: Arc<dyn TimeSource>,
    started_at_ms: Option<u64>,
    previous_decision_time: Option<f64>,
}

impl ResultPipeline {
    pub fn new(clock: Arc<dyn TimeSource>) -> Self {
        Self {
            clock,
            started_at_ms: None,
            previous_decision_time: None,
        }
    }

    /// Record the response-timer origin, shifted forward by the audio start
    /// latency reported by the playback engine.
    pub fn start_timer(&mut self, latency_ms: f64) {
        let shift = latency_ms.max(0.0) as u64;
        self.started_at_ms = Some(self.clock.now_ms().saturating_add(shift));
    }

    pub fn timer_started(&self) -> bool {
        self.started_at_ms.is_some()
    }

    /// Decision time of the previous action in seconds, reused as the
    /// `resume_play` offset of the next one.
    pub fn previous_decision_time(&self) -> Option<f64> {
        self.previous_decision_time
    }

    /// Seconds elapsed since `start_timer`, never negative.
    pub fn elapsed_secs(&self) -> f64 {
        match self.started_at_ms {
            Some(start) => self.clock.now_ms().saturating_sub(start) as f64 / 1000.0,
            None => 0.0,
        }
    }

    /// Build the submission payload for the current action.
    ///
    /// A timed-out submission overwrites every answer value with
    /// [`TIMEOUT_VALUE`]; answers without a value normalize to an empty
    /// string. The computed decision time is retained for the next
    /// action's `resume_play` offset.
    pub fn build(
        &mut self,
        session: i64,
        has_timed_out: bool,
        answers: &[Answer],
        audio_latency_ms: f64,
        config: &TrialConfig,
    ) -> ResultSubmission {
        let decision_time = self.elapsed_secs();
        self.previous_decision_time = Some(decision_time);

        let form = answers
            .iter()
            .map(|answer| AnswerValue {
                key: answer.key.clone(),
                value: if has_timed_out {
                    TIMEOUT_VALUE.to_string()
                } else {
                    answer.value.clone().unwrap_or_default()
                },
            })
            .collect();

        ResultSubmission {
            session,
            decision_time,
            audio_latency_ms,
            form,
            config: serde_json::to_value(config).unwrap_or_default(),
        }
    }

    /// Evaluate the break-round condition against the submitted values.
    ///
    /// `Equals` breaks if any value is in the list; `Not` breaks only when
    /// none of the values are. No condition never breaks.
    pub fn evaluate_break(values: &[String], condition: Option<&BreakRoundOn>) -> bool {
        match condition {
            Some(BreakRoundOn::Equals(list)) => values.iter().any(|v| list.contains(v)),
            Some(BreakRoundOn::Not(list)) => !values.iter().any(|v| list.contains(v)),
            None => false,
        }
    }

    /// Derive the auto-advance plan from a trial's config.
    pub fn auto_advance_plan(config: &TrialConfig) -> AutoAdvancePlan {
        if !config.auto_advance {
            return AutoAdvancePlan::Manual;
        }
        match config.auto_advance_timer {
            Some(ms) => AutoAdvancePlan::After(ms),
            None => AutoAdvancePlan::Immediate,
        }
    }

    /// POST the submission. Failure is logged and reported back as `false`
    /// but never blocks round advancement.
    pub async fn submit<A: ApiClient>(&self, api: &A, submission: &ResultSubmission) -> bool {
        match api.post_result(submission).await {
            Ok(_) => true,
            Err(err) => {
                log::warn!("Result submission failed: {err}");
                false
            }
        }
    }
}
