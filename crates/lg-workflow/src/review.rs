// review.rs — ReviewSession: the open settings-diff review of one episode.
//
// A session pairs a stored diff revision with the reviewer's working state:
// the conflict ledger, the edit/delete editor and the publish
// acknowledgement. The diff itself stays in the episode's workflow record so
// edits survive the reviewer navigating away. Each episode has its own
// session, replaced only when a newer diff revision of that episode opens.

use chrono::{DateTime, Utc};
use lg_episode::{EpisodeId, WorkId};
use lg_lorebook::{ConflictLedger, ReviewEditor, SettingsDiff};
use uuid::Uuid;

/// What the publish gate allows right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Conflicts remain; only closing the review is possible.
    Conflicted { unresolved: usize },
    /// No conflicts remain; publish needs the acknowledgement.
    Clear { acknowledged: bool },
}

impl GateState {
    pub fn can_publish(&self) -> bool {
        matches!(self, GateState::Clear { acknowledged: true })
    }
}

#[derive(Debug, Clone)]
pub struct ReviewSession {
    pub session_id: Uuid,
    pub work_id: WorkId,
    pub episode_id: EpisodeId,
    /// Diff revision this session was opened for.
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub(crate) ledger: ConflictLedger,
    pub(crate) editor: ReviewEditor,
    pub(crate) publish_acknowledged: bool,
}

impl ReviewSession {
    pub fn new(work_id: WorkId, episode_id: EpisodeId, revision: u64) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            work_id,
            episode_id,
            revision,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            ledger: ConflictLedger::new(),
            editor: ReviewEditor::new(),
            publish_acknowledged: false,
        }
    }

    /// Mark the session as updated (call after any mutation).
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn is_for(&self, episode_id: EpisodeId, revision: u64) -> bool {
        self.episode_id == episode_id && self.revision == revision
    }

    pub fn ledger(&self) -> &ConflictLedger {
        &self.ledger
    }

    pub fn editor(&self) -> &ReviewEditor {
        &self.editor
    }

    pub fn is_publish_acknowledged(&self) -> bool {
        self.publish_acknowledged
    }

    pub fn gate(&self, diff: &SettingsDiff) -> GateState {
        match self.ledger.unresolved_count(diff) {
            0 => GateState::Clear {
                acknowledged: self.publish_acknowledged,
            },
            unresolved => GateState::Conflicted { unresolved },
        }
    }
}
