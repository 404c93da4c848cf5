// episode.rs — Episode identity and record as reported by the backend.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a work (the serialized title an episode belongs to).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkId(pub u64);

/// Identifier of a single episode. Unique across works.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpisodeId(pub u64);

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One installment (원문/회차) of a work.
///
/// Field names follow the backend's camelCase JSON. The status flags default
/// to `false` when the backend omits them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    pub work_id: WorkId,
    pub episode_id: EpisodeId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub content: String,
    /// Position of the episode within its work (1-based on the backend).
    #[serde(default)]
    pub order: u32,
    /// Set once the episode has been published; no further edits are allowed.
    #[serde(default)]
    pub is_read_only: bool,
    #[serde(default)]
    pub is_analyzed: bool,
    #[serde(default)]
    pub is_review_pending: bool,
}

impl Episode {
    pub fn new(
        work_id: WorkId,
        episode_id: EpisodeId,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            work_id,
            episode_id,
            title: title.into(),
            subtitle: None,
            content: content.into(),
            order: 0,
            is_read_only: false,
            is_analyzed: false,
            is_review_pending: false,
        }
    }
}
