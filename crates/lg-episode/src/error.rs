// error.rs — Error types for the episode editing subsystem.

use thiserror::Error;

use crate::backend::BackendError;
use crate::episode::EpisodeId;

/// Errors that can occur while editing or saving an episode.
#[derive(Debug, Error)]
pub enum EpisodeError {
    /// An operation needed a loaded episode but the store is empty.
    #[error("no episode is loaded")]
    NoEpisodeLoaded,

    /// The episode is published; edits and saves are refused locally.
    #[error("episode {episode_id} is read-only")]
    ReadOnly { episode_id: EpisodeId },

    /// A save for this episode has not completed yet.
    #[error("a save for episode {episode_id} is already in progress")]
    SaveInProgress { episode_id: EpisodeId },

    /// The persistence backend rejected or failed the request.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}
