// error.rs — Error types for the publish workflow.
//
// Three families, each recoverable by retry or abandonment:
//   Validation    — a local precondition failed; nothing was sent
//   StateConflict — the action is not allowed in the episode's current stage
//   Transport     — a collaborator call failed; the workflow rolled back

use std::fmt;

use lg_episode::{BackendError, EpisodeError, EpisodeId};
use lg_lorebook::LorebookError;
use thiserror::Error;

use crate::status::WorkflowStage;

/// Which collaborator call an error or ticket belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Extraction,
    Analysis,
    Publish,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Extraction => write!(f, "keyword extraction"),
            Operation::Analysis => write!(f, "settings analysis"),
            Operation::Publish => write!(f, "publish"),
        }
    }
}

/// A local precondition that failed before any network call.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("no episode is loaded")]
    NoEpisodeLoaded,

    #[error("episode {episode_id} is read-only")]
    ReadOnly { episode_id: EpisodeId },

    #[error("episode {episode_id} has unsaved changes; save before extracting keywords")]
    UnsavedChanges { episode_id: EpisodeId },

    #[error("confirmation required: {0}")]
    ConfirmationRequired(&'static str),

    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },
}

/// Category of a [`WorkflowError`], for routing it to the right notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    StateConflict,
    Transport,
}

/// Errors that can occur while driving the publish workflow.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// The action is rejected in the episode's current stage.
    #[error("cannot {action} for episode {episode_id} while it is {stage}")]
    StateConflict {
        episode_id: EpisodeId,
        stage: WorkflowStage,
        action: &'static str,
    },

    /// No review is open for the episode.
    #[error("no review is open for episode {episode_id}")]
    NoActiveReview { episode_id: EpisodeId },

    /// A collaborator call failed.
    #[error("{operation} failed for episode {episode_id}: {source}")]
    Transport {
        operation: Operation,
        episode_id: EpisodeId,
        #[source]
        source: BackendError,
    },

    /// Saving the episode before extraction failed.
    #[error("episode error: {0}")]
    Episode(#[from] EpisodeError),

    /// A review edit or selection was rejected.
    #[error("review error: {0}")]
    Review(#[from] LorebookError),
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::Validation(_) => ErrorKind::Validation,
            WorkflowError::StateConflict { .. } | WorkflowError::NoActiveReview { .. } => {
                ErrorKind::StateConflict
            }
            WorkflowError::Transport { .. } => ErrorKind::Transport,
            WorkflowError::Episode(e) => match e {
                EpisodeError::Backend(_) => ErrorKind::Transport,
                EpisodeError::SaveInProgress { .. } => ErrorKind::StateConflict,
                EpisodeError::NoEpisodeLoaded | EpisodeError::ReadOnly { .. } => {
                    ErrorKind::Validation
                }
            },
            WorkflowError::Review(_) => ErrorKind::Validation,
        }
    }

    /// True when the rejection means "a request is already in progress".
    pub fn is_in_progress(&self) -> bool {
        matches!(self, WorkflowError::StateConflict { stage, .. } if stage.is_in_flight())
    }

    pub(crate) fn transport(
        operation: Operation,
        episode_id: EpisodeId,
        source: BackendError,
    ) -> Self {
        WorkflowError::Transport {
            operation,
            episode_id,
            source,
        }
    }
}

/// Confirmation prompts surface as validation errors rather than review errors.
pub(crate) fn from_lorebook(error: LorebookError) -> WorkflowError {
    match error {
        LorebookError::ConfirmationRequired(what) => ValidationError::ConfirmationRequired(what).into(),
        other => WorkflowError::Review(other),
    }
}
