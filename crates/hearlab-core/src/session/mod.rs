//! Session orchestration: blocks, participants, and the controller that
//! drives a participant through rounds of actions.

mod controller;


pub use controller::SessionController;

use serde::{Deserialize, Serialize};

/// A participant's run through a block. The id is server-assigned when the
/// block is loaded and never changes for the lifetime of the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
}

/// Participant identity and consent bookkeeping. Owned by the surrounding
/// shell; the core only reads it.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Participant {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub consent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    pub id: i64,
    pub name: String,
}

/// The experiment unit being played; loaded once per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub id: i64,
    pub slug: String,
    #[serde(default)]
    pub session_id: Option<i64>,
    #[serde(default)]
    pub playlists: Vec<Playlist>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub loading_text: Option<String>,
}

/// Where the controller is in its lifecycle.
///
/// `Final`, `Redirected` and `Errored` are terminal: no further round is
/// ever fetched from them (a shell may force a full reload out of
/// `Errored`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// A round fetch is pending or in flight.
    Loading,
    /// An action of the given view kind is active.
    Active(crate::dispatch::ViewKind),
    Final,
    Redirected,
    Errored,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Final | SessionState::Redirected | SessionState::Errored
        )
    }
}
