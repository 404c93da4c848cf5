// status.rs — Per-episode processing status and the workflow stage machine.
//
// `ProcessingStatus` is what the status map stores per episode; an episode
// with no entry is idle (or already published). `WorkflowStage` is the
// finer-grained view derived from a record plus the conflict ledger:
//
//   Idle → Extracting → KeywordsReady → Analyzing → {Conflicted | Clear}
//     → Publishing → Published
//   (any unpublished stage → Idle on abort or failure)

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status recorded in the per-episode status map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
    /// Keyword extraction request is in flight.
    Extracting,
    /// Keyword candidates are held, awaiting the reviewer's selection.
    KeywordsReady,
    /// Settings-diff analysis request is in flight.
    Analyzing,
    /// A settings diff is stored and can be reviewed.
    ReviewReady,
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingStatus::Extracting => write!(f, "EXTRACTING"),
            ProcessingStatus::KeywordsReady => write!(f, "KEYWORDS_READY"),
            ProcessingStatus::Analyzing => write!(f, "ANALYZING"),
            ProcessingStatus::ReviewReady => write!(f, "REVIEW_READY"),
        }
    }
}

/// Where an episode is in the publish workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    Idle,
    Extracting,
    KeywordsReady,
    Analyzing,
    /// Review is open and at least one conflict is unresolved.
    Conflicted,
    /// Review is open and every conflict is resolved or deleted.
    Clear,
    /// Publish request is in flight.
    Publishing,
    Published,
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowStage::Idle => write!(f, "idle"),
            WorkflowStage::Extracting => write!(f, "extracting"),
            WorkflowStage::KeywordsReady => write!(f, "keywords_ready"),
            WorkflowStage::Analyzing => write!(f, "analyzing"),
            WorkflowStage::Conflicted => write!(f, "conflicted"),
            WorkflowStage::Clear => write!(f, "clear"),
            WorkflowStage::Publishing => write!(f, "publishing"),
            WorkflowStage::Published => write!(f, "published"),
        }
    }
}

impl WorkflowStage {
    /// Check whether moving from this stage to `next` is valid.
    pub fn can_transition_to(&self, next: &WorkflowStage) -> bool {
        use WorkflowStage::*;

        // Abort or failure returns any unpublished stage to Idle.
        if *next == Idle {
            return !matches!(self, Idle | Published);
        }

        matches!(
            (self, next),
            (Idle, Extracting)
                | (Extracting, KeywordsReady)
                // Re-extraction discards the held keywords.
                | (KeywordsReady, Extracting)
                | (KeywordsReady, Analyzing)
                | (Analyzing, Conflicted)
                | (Analyzing, Clear)
                | (Conflicted, Clear)
                | (Clear, Conflicted)
                | (Clear, Publishing)
                | (Publishing, Published)
                // Publish failed: the review stays open for a retry.
                | (Publishing, Clear)
        )
    }

    /// True while a collaborator request for the episode is in flight.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            WorkflowStage::Extracting | WorkflowStage::Analyzing | WorkflowStage::Publishing
        )
    }
}
