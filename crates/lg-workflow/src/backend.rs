//! Remote collaborators consumed by the workflow.
//!
//! The analysis service owns keyword extraction, diff computation and the
//! lorebook write; the workflow only sequences these calls and enforces the
//! human gates between them.

use lg_episode::{EpisodeId, WorkId};
use lg_lorebook::{KeywordSet, SettingsDiff};

pub use lg_episode::{BackendError, EpisodeBackend};

/// The remote analysis service.
///
/// Calls are blocking. `confirm_publish` is not idempotent: the workflow
/// never issues it twice for the same reviewed diff.
pub trait AnalysisBackend: Send + Sync {
    /// Extract keyword candidates from the episode's persisted content.
    fn extract_keywords(&self, episode_id: EpisodeId) -> Result<KeywordSet, BackendError>;

    /// Compare the selected keywords against the work's lorebook.
    fn analyze(&self, work_id: WorkId, selection: &KeywordSet) -> Result<SettingsDiff, BackendError>;

    /// Apply the reviewed diff to the lorebook and mark the episode published.
    fn confirm_publish(
        &self,
        work_id: WorkId,
        episode_id: EpisodeId,
        diff: &SettingsDiff,
    ) -> Result<(), BackendError>;

    /// Backend display name (for logs).
    fn name(&self) -> &str;
}
