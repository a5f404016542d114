//! Actions: the units of experiment content delivered by the server.
//!
//! A round is an ordered batch of actions. Each action is tagged with a
//! `view` discriminant; the dispatcher resolves it to a view contract. A
//! payload whose discriminant (or shape) cannot be resolved is replaced by a
//! synthesized `Error` action at the deserialization boundary, so a bad
//! server response can never throw past the dispatcher.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// One audio asset within a playback spec. URLs are opaque to the core; the
/// selected backend resolves them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub id: i64,
    pub url: String,
}

/// Requested playback backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlayMethod {
    /// Preloaded and decoded up front; lowest start latency.
    #[default]
    Buffer,
    /// Streamed by an external player; higher, device-dependent latency.
    External,
    /// No audio output at all.
    Noaudio,
}

/// How the playback controls present themselves to the participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlaybackView {
    #[default]
    Autoplay,
    Button,
    Multiplayer,
    Image,
    #[serde(rename = "MATCHINGPAIRS")]
    MatchingPairs,
}

/// Audio playback specification carried by a trial action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackSpec {
    pub sections: Vec<Section>,
    #[serde(default)]
    pub play_method: PlayMethod,
    /// Seconds into each section to start from.
    #[serde(default)]
    pub play_from: f64,
    #[serde(default)]
    pub mute: bool,
    /// Each section may be played at most once; enforced by the caller.
    #[serde(default)]
    pub play_once: bool,
    /// Shift the start offset by the previous action's decision time.
    #[serde(default)]
    pub resume_play: bool,
    /// Milliseconds to defer the finished signal after output ends.
    #[serde(default)]
    pub timeout_after_playback: Option<u64>,
    #[serde(default)]
    pub view: PlaybackView,
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Condition for aborting the rest of the round based on submitted answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BreakRoundOn {
    /// Break if any submitted value is a member of the list.
    Equals(Vec<String>),
    /// Break unless at least one submitted value is a member of the list.
    Not(Vec<String>),
}

/// Timing and auto-advance options for a trial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialConfig {
    /// Submit automatically when playback finishes.
    #[serde(default)]
    pub auto_advance: bool,
    /// If set with `auto_advance`, delay the timed submission by this many
    /// milliseconds after playback ends.
    #[serde(default)]
    pub auto_advance_timer: Option<u64>,
    /// Hard response deadline in milliseconds, counted from interactivity.
    #[serde(default)]
    pub response_time: Option<u64>,
    /// The participant must hear the stimulus before responding; the
    /// decision-time stopwatch starts at audible playback start.
    #[serde(default)]
    pub listen_first: bool,
    #[serde(default = "default_true")]
    pub show_continue_button: bool,
    #[serde(default)]
    pub continue_label: Option<String>,
    #[serde(default)]
    pub break_round_on: Option<BreakRoundOn>,
}

fn default_true() -> bool {
    true
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            auto_advance: false,
            auto_advance_timer: None,
            response_time: None,
            listen_first: false,
            show_continue_button: default_true(),
            continue_label: None,
            break_round_on: None,
        }
    }
}

/// One survey question attached to a trial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub key: String,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default)]
    pub is_skippable: bool,
}

/// Survey form attached to a trial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackForm {
    pub form: Vec<Question>,
    #[serde(default)]
    pub submit_label: Option<String>,
    #[serde(default)]
    pub skip_label: Option<String>,
    #[serde(default)]
    pub is_skippable: bool,
}

/// One step of an explainer screen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainerStep {
    #[serde(default)]
    pub number: Option<u32>,
    pub description: String,
}

/// A tagged unit of experiment content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "view", rename_all = "UPPERCASE")]
pub enum Action {
    Trial {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        playback: Option<PlaybackSpec>,
        #[serde(default)]
        html: Option<String>,
        #[serde(default)]
        feedback_form: Option<FeedbackForm>,
        #[serde(default)]
        config: TrialConfig,
    },
    Explainer {
        instruction: String,
        #[serde(default)]
        button_label: Option<String>,
        #[serde(default)]
        steps: Vec<ExplainerStep>,
        /// Auto-continue after this many milliseconds.
        #[serde(default)]
        timer: Option<u64>,
    },
    Score {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        score: Option<f64>,
        #[serde(default)]
        score_message: Option<String>,
        #[serde(default)]
        total_score: Option<f64>,
    },
    Final {
        #[serde(default)]
        final_text: Option<String>,
        #[serde(default)]
        rank: Option<String>,
        #[serde(default)]
        total_score: Option<f64>,
    },
    Playlist {
        #[serde(default)]
        instruction: Option<String>,
    },
    Loading {
        #[serde(default)]
        loading_text: Option<String>,
    },
    Info {
        #[serde(default)]
        heading: Option<String>,
        #[serde(default)]
        body: Option<String>,
        #[serde(default)]
        button_label: Option<String>,
    },
    Error {
        #[serde(default)]
        error_text: String,
    },
    Redirect {
        url: String,
    },
}

const KNOWN_VIEWS: [&str; 9] = [
    "TRIAL", "EXPLAINER", "SCORE", "FINAL", "PLAYLIST", "LOADING", "INFO", "ERROR", "REDIRECT",
];

impl Action {
    /// Synthesize a terminal error action.
    pub fn error(message: impl Into<String>) -> Self {
        Action::Error {
            error_text: message.into(),
        }
    }

    /// Parse a raw action payload, absorbing unrecognized discriminants and
    /// malformed payloads into a synthesized `Error` action.
    pub fn from_value(value: Value) -> Self {
        let view = value
            .get("view")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        serde_json::from_value(value).unwrap_or_else(|err| {
            let message = if KNOWN_VIEWS.contains(&view.as_str()) {
                format!("Malformed '{}' action: {}", view, err)
            } else {
                CoreError::UnknownActionView { view }.to_string()
            };
            Action::error(message)
        })
    }

    /// The wire-level view discriminant.
    pub fn view_name(&self) -> &'static str {
        match self {
            Action::Trial { .. } => "TRIAL",
            Action::Explainer { .. } => "EXPLAINER",
            Action::Score { .. } => "SCORE",
            Action::Final { .. } => "FINAL",
            Action::Playlist { .. } => "PLAYLIST",
            Action::Loading { .. } => "LOADING",
            Action::Info { .. } => "INFO",
            Action::Error { .. } => "ERROR",
            Action::Redirect { .. } => "REDIRECT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn trial_round_trips_with_defaults() {
        let action = Action::from_value(json!({
            "view": "TRIAL",
            "playback": {
                "sections": [{"id": 1, "url": "https://assets/a.mp3"}],
                "play_method": "BUFFER",
            },
        }));
        match action {
            Action::Trial {
                playback: Some(spec),
                config,
                ..
            } => {
                assert_eq!(spec.sections.len(), 1);
                assert_eq!(spec.play_method, PlayMethod::Buffer);
                assert_eq!(spec.play_from, 0.0);
                assert!(!spec.mute);
                assert!(!config.auto_advance);
                assert!(config.show_continue_button);
            }
            other => panic!("Expected trial, got {:?}", other),
        }
    }

    #[test]
    fn unknown_view_becomes_error_action() {
        let action = Action::from_value(json!({"view": "HOLOGRAM", "data": 1}));
        match action {
            Action::Error { error_text } => {
                assert!(error_text.contains("HOLOGRAM"), "got: {error_text}");
            }
            other => panic!("Expected error action, got {:?}", other),
        }
    }

    #[test]
    fn malformed_known_view_becomes_error_action() {
        let action = Action::from_value(json!({"view": "REDIRECT"}));
        match action {
            Action::Error { error_text } => {
                assert!(error_text.contains("REDIRECT"));
            }
            other => panic!("Expected error action, got {:?}", other),
        }
    }

    #[test]
    fn break_round_on_wire_shape() {
        let cond: BreakRoundOn = serde_json::from_value(json!({"EQUALS": ["slow"]})).unwrap();
        assert_eq!(cond, BreakRoundOn::Equals(vec!["slow".into()]));
        let cond: BreakRoundOn = serde_json::from_value(json!({"NOT": ["fast"]})).unwrap();
        assert_eq!(cond, BreakRoundOn::Not(vec!["fast".into()]));
    }

    #[test]
    fn matching_pairs_view_tag() {
        let view: PlaybackView = serde_json::from_value(json!("MATCHINGPAIRS")).unwrap();
        assert_eq!(view, PlaybackView::MatchingPairs);
    }
}
