//! Action dispatch: a pure mapping from an action to the contract a view
//! must satisfy to render it.
//!
//! This is deliberately stateless. Unknown discriminants never reach this
//! match - they are absorbed into synthesized error actions at the
//! deserialization boundary (`Action::from_value`) - so `resolve_view` is a
//! total function over the action union.

use serde::{Deserialize, Serialize};

use crate::action::{Action, FeedbackForm, PlaybackSpec};
use crate::session::Block;

/// The view family an action dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ViewKind {
    Trial,
    Explainer,
    Score,
    Final,
    Playlist,
    Loading,
    Info,
    Error,
    Redirect,
}

/// Declarative props a view needs, derived from the action and its
/// surrounding block. No callbacks live here: continue/submit intents go
/// back through the session controller.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ViewProps {
    pub title: Option<String>,
    pub instruction: Option<String>,
    pub html: Option<String>,
    pub button_label: Option<String>,
    pub loading_text: Option<String>,
    pub score: Option<f64>,
    pub total_score: Option<f64>,
    pub rank: Option<String>,
    pub url: Option<String>,
    pub error_message: Option<String>,
    pub steps: Vec<String>,
    #[serde(skip)]
    pub playback: Option<PlaybackSpec>,
    #[serde(skip)]
    pub feedback_form: Option<FeedbackForm>,
}

/// What the dispatcher hands a shell for one action.
#[derive(Debug, Clone)]
pub struct ViewContract {
    pub kind: ViewKind,
    pub props: ViewProps,
}

/// Resolve an action to its view contract.
pub fn resolve_view(action: &Action, block: &Block) -> ViewContract {
    match action {
        Action::Trial {
            title,
            playback,
            html,
            feedback_form,
            config,
        } => ViewContract {
            kind: ViewKind::Trial,
            props: ViewProps {
                title: title.clone(),
                instruction: playback.as_ref().and_then(|p| p.instruction.clone()),
                html: html.clone(),
                button_label: config.continue_label.clone(),
                playback: playback.clone(),
                feedback_form: feedback_form.clone(),
                ..ViewProps::default()
            },
        },
        Action::Explainer {
            instruction,
            button_label,
            steps,
            ..
        } => ViewContract {
            kind: ViewKind::Explainer,
            props: ViewProps {
                instruction: Some(instruction.clone()),
                button_label: button_label.clone(),
                steps: steps.iter().map(|s| s.description.clone()).collect(),
                ..ViewProps::default()
            },
        },
        Action::Score {
            title,
            score,
            score_message,
            total_score,
        } => ViewContract {
            kind: ViewKind::Score,
            props: ViewProps {
                title: title.clone(),
                instruction: score_message.clone(),
                score: *score,
                total_score: *total_score,
                ..ViewProps::default()
            },
        },
        Action::Final {
            final_text,
            rank,
            total_score,
        } => ViewContract {
            kind: ViewKind::Final,
            props: ViewProps {
                instruction: final_text.clone(),
                rank: rank.clone(),
                total_score: *total_score,
                ..ViewProps::default()
            },
        },
        Action::Playlist { instruction } => ViewContract {
            kind: ViewKind::Playlist,
            props: ViewProps {
                instruction: instruction.clone(),
                ..ViewProps::default()
            },
        },
        Action::Loading { loading_text } => ViewContract {
            kind: ViewKind::Loading,
            props: ViewProps {
                loading_text: loading_text
                    .clone()
                    .or_else(|| block.loading_text.clone()),
                ..ViewProps::default()
            },
        },
        Action::Info {
            heading,
            body,
            button_label,
        } => ViewContract {
            kind: ViewKind::Info,
            props: ViewProps {
                title: heading.clone(),
                html: body.clone(),
                button_label: button_label.clone(),
                ..ViewProps::default()
            },
        },
        Action::Error { error_text } => ViewContract {
            kind: ViewKind::Error,
            props: ViewProps {
                error_message: Some(error_text.clone()),
                ..ViewProps::default()
            },
        },
        Action::Redirect { url } => ViewContract {
            kind: ViewKind::Redirect,
            props: ViewProps {
                url: Some(url.clone()),
                ..ViewProps::default()
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn block() -> Block {
        Block {
            id: 1,
            slug: "test".into(),
            session_id: Some(42),
            playlists: Vec::new(),
            theme: None,
            loading_text: Some("Loading experiment...".into()),
        }
    }

    #[test]
    fn explainer_exposes_instruction() {
        let action = Action::from_value(json!({
            "view": "EXPLAINER",
            "instruction": "Instruction",
        }));
        let contract = resolve_view(&action, &block());
        assert_eq!(contract.kind, ViewKind::Explainer);
        assert_eq!(contract.props.instruction.as_deref(), Some("Instruction"));
    }

    #[test]
    fn loading_falls_back_to_block_text() {
        let action = Action::from_value(json!({"view": "LOADING"}));
        let contract = resolve_view(&action, &block());
        assert_eq!(contract.kind, ViewKind::Loading);
        assert_eq!(
            contract.props.loading_text.as_deref(),
            Some("Loading experiment...")
        );
    }

    #[test]
    fn unknown_view_resolves_to_error_contract() {
        let action = Action::from_value(json!({"view": "KALEIDOSCOPE"}));
        let contract = resolve_view(&action, &block());
        assert_eq!(contract.kind, ViewKind::Error);
        let message = contract.props.error_message.unwrap();
        assert!(message.contains("KALEIDOSCOPE"));
    }

    #[test]
    fn trial_carries_playback_and_form() {
        let action = Action::from_value(json!({
            "view": "TRIAL",
            "playback": {
                "sections": [{"id": 7, "url": "https://assets/x.mp3"}],
                "instruction": "Listen closely",
            },
            "feedback_form": {
                "form": [{"key": "preference"}],
            },
        }));
        let contract = resolve_view(&action, &block());
        assert_eq!(contract.kind, ViewKind::Trial);
        assert_eq!(contract.props.instruction.as_deref(), Some("Listen closely"));
        assert_eq!(contract.props.playback.unwrap().sections[0].id, 7);
        assert_eq!(contract.props.feedback_form.unwrap().form.len(), 1);
    }
}
