//! Episode persistence contract and the transport error shared by every
//! remote collaborator.

use thiserror::Error;

use crate::episode::{Episode, EpisodeId, WorkId};

/// Failure reported by a remote collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The target episode is published and refuses writes.
    #[error("episode {episode_id} is read-only")]
    ReadOnly { episode_id: EpisodeId },

    /// The backend answered with a non-success status.
    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    /// The request never produced a response (connect, timeout, TLS).
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded.
    #[error("malformed response: {0}")]
    Decode(String),
}

/// Remote episode persistence.
///
/// Implementations are blocking; the workflow treats each call as its one
/// suspension point.
pub trait EpisodeBackend: Send + Sync {
    /// Fetch the persisted episode.
    fn get_episode(&self, work_id: WorkId, episode_id: EpisodeId)
        -> Result<Episode, BackendError>;

    /// Overwrite the episode's content. Fails with [`BackendError::ReadOnly`]
    /// when the episode has been published.
    fn update_episode(
        &self,
        work_id: WorkId,
        episode_id: EpisodeId,
        content: &str,
    ) -> Result<(), BackendError>;

    /// List every episode of a work, ordered by `order`.
    fn list_episodes(&self, work_id: WorkId) -> Result<Vec<Episode>, BackendError>;
}
