//! # lg-episode
//!
//! The episode under edit: its text buffer, dirty flag and bounded
//! undo/redo history, plus the persistence contract the buffer is saved
//! through.
//!
//! ## Key components
//!
//! - [`Episode`] — one installment of a work, as the backend reports it
//! - [`EpisodeStore`] — buffer + dirty flag + debounced [`EditHistory`]
//! - [`EpisodeBackend`] — trait for the remote episode persistence service
//! - [`EpisodeListCache`] — per-work cache of episode listings

pub mod backend;
pub mod episode;
pub mod error;
pub mod history;
pub mod list_cache;
pub mod store;

pub use backend::{BackendError, EpisodeBackend};
pub use episode::{Episode, EpisodeId, WorkId};
pub use error::EpisodeError;
pub use history::{EditHistory, HistoryConfig, Recorder};
pub use list_cache::EpisodeListCache;
pub use store::{EpisodeStore, Reconciliation, SaveRequest};
