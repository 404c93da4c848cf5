// store.rs — EpisodeStore: the buffer of the episode under edit.
//
// The store owns the text buffer, the dirty flag and the edit history of one
// episode at a time. History writes are debounced: every edit cancels and
// restarts a pending write, and the write fires once the buffer has been
// quiet for `debounce_ms`. Time is passed in by the caller so the coalescing
// is deterministic; `poll(now)` is the timer tick.
//
// Saving is split into `begin_save` / `finish_save` so the caller can run the
// network call in between; `save` does both against an `EpisodeBackend`.

use std::time::{Duration, Instant};

use crate::backend::{BackendError, EpisodeBackend};
use crate::episode::{Episode, EpisodeId, WorkId};
use crate::error::EpisodeError;
use crate::history::{EditHistory, HistoryConfig, Recorder};

/// A save that has been started and awaits the backend's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveRequest {
    pub work_id: WorkId,
    pub episode_id: EpisodeId,
    pub content: String,
}

/// Outcome of comparing the local episode against a refetched copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The server agrees with the optimistic read-only flag.
    Confirmed,
    /// The server disagrees; the local read-only flag was rolled back.
    Reverted,
    /// No optimistic change was outstanding; flags were refreshed.
    Unchanged,
    /// The refetched episode is not the one loaded.
    Unrelated,
}

/// Buffer, dirty flag and debounced history for the episode under edit.
pub struct EpisodeStore {
    episode: Option<Episode>,
    buffer: String,
    dirty: bool,
    saving: bool,
    history: EditHistory,
    recorder: Recorder,
    pending_write: Option<Instant>,
    debounce: Duration,
    max_entries: usize,
    optimistic_read_only: bool,
}

impl EpisodeStore {
    pub fn new(config: &HistoryConfig) -> Self {
        Self {
            episode: None,
            buffer: String::new(),
            dirty: false,
            saving: false,
            history: EditHistory::new(String::new(), config.max_entries),
            recorder: Recorder::Idle,
            pending_write: None,
            debounce: Duration::from_millis(config.debounce_ms),
            max_entries: config.max_entries,
            optimistic_read_only: false,
        }
    }

    /// Replace the buffer with the episode's persisted content.
    ///
    /// Clears the dirty flag, cancels any pending history write and resets
    /// the history to a single snapshot.
    pub fn load(&mut self, episode: Episode) {
        tracing::debug!(episode_id = %episode.episode_id, "loading episode into editor");
        self.buffer = episode.content.clone();
        self.history = EditHistory::new(episode.content.clone(), self.max_entries);
        self.episode = Some(episode);
        self.dirty = false;
        self.saving = false;
        self.recorder = Recorder::Idle;
        self.pending_write = None;
        self.optimistic_read_only = false;
    }

    /// Fetch the episode from the backend and load it.
    pub fn open(
        &mut self,
        backend: &dyn EpisodeBackend,
        work_id: WorkId,
        episode_id: EpisodeId,
    ) -> Result<(), EpisodeError> {
        let episode = backend.get_episode(work_id, episode_id)?;
        self.load(episode);
        Ok(())
    }

    pub fn episode(&self) -> Option<&Episode> {
        self.episode.as_ref()
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    pub fn is_read_only(&self) -> bool {
        self.episode.as_ref().is_some_and(|e| e.is_read_only)
    }

    pub fn history(&self) -> &EditHistory {
        &self.history
    }

    pub fn recorder(&self) -> Recorder {
        self.recorder
    }

    pub fn has_pending_write(&self) -> bool {
        self.pending_write.is_some()
    }

    /// Apply an edit from the editor.
    ///
    /// A history write that is already due is flushed first, then the
    /// pending write is restarted for this edit. The edit that echoes an
    /// undo/redo back from the editor is absorbed without touching history.
    pub fn edit(&mut self, new_text: impl Into<String>, now: Instant) -> Result<(), EpisodeError> {
        let episode_id = self.writable_episode_id()?;
        let new_text = new_text.into();

        self.poll(now);

        if self.recorder != Recorder::Idle {
            let echo = new_text == self.buffer;
            self.recorder = Recorder::Idle;
            if echo {
                return Ok(());
            }
        }

        if new_text == self.buffer {
            return Ok(());
        }

        self.buffer = new_text;
        self.dirty = true;
        self.pending_write = Some(now + self.debounce);
        tracing::trace!(episode_id = %episode_id, "history write scheduled");
        Ok(())
    }

    /// Timer tick: record the buffer if the debounce window has elapsed.
    /// Returns true when a snapshot was written.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.pending_write {
            Some(deadline) if deadline <= now => self.flush_pending(),
            _ => false,
        }
    }

    fn flush_pending(&mut self) -> bool {
        if self.pending_write.take().is_none() {
            return false;
        }
        let recorded = self.history.record(&self.buffer);
        if recorded {
            tracing::debug!(entries = self.history.len(), "history snapshot recorded");
        }
        recorded
    }

    /// Step the buffer back one snapshot. A pending write is flushed first
    /// so the latest keystrokes can be redone.
    pub fn undo(&mut self) -> bool {
        if self.is_read_only() {
            return false;
        }
        self.flush_pending();
        let Some(snapshot) = self.history.undo().map(str::to_string) else {
            return false;
        };
        self.apply_snapshot(snapshot, Recorder::ApplyingUndo);
        true
    }

    /// Step the buffer forward one snapshot.
    pub fn redo(&mut self) -> bool {
        if self.is_read_only() {
            return false;
        }
        self.flush_pending();
        let Some(snapshot) = self.history.redo().map(str::to_string) else {
            return false;
        };
        self.apply_snapshot(snapshot, Recorder::ApplyingRedo);
        true
    }

    fn apply_snapshot(&mut self, snapshot: String, recorder: Recorder) {
        self.buffer = snapshot;
        self.dirty = self
            .episode
            .as_ref()
            .map_or(true, |episode| episode.content != self.buffer);
        self.recorder = recorder;
    }

    /// Start a save of the current buffer.
    pub fn begin_save(&mut self) -> Result<SaveRequest, EpisodeError> {
        let episode = self.episode.as_ref().ok_or(EpisodeError::NoEpisodeLoaded)?;
        if episode.is_read_only {
            return Err(EpisodeError::ReadOnly {
                episode_id: episode.episode_id,
            });
        }
        if self.saving {
            return Err(EpisodeError::SaveInProgress {
                episode_id: episode.episode_id,
            });
        }
        let request = SaveRequest {
            work_id: episode.work_id,
            episode_id: episode.episode_id,
            content: self.buffer.clone(),
        };
        self.saving = true;
        Ok(request)
    }

    /// Apply the backend's answer to a save started with [`begin_save`].
    ///
    /// The buffer stays dirty if it was edited while the save was in flight.
    ///
    /// [`begin_save`]: EpisodeStore::begin_save
    pub fn finish_save(
        &mut self,
        request: &SaveRequest,
        result: Result<(), BackendError>,
    ) -> Result<(), EpisodeError> {
        self.saving = false;
        let Some(episode) = self
            .episode
            .as_mut()
            .filter(|e| e.episode_id == request.episode_id)
        else {
            tracing::warn!(episode_id = %request.episode_id, "save finished for an episode no longer loaded");
            return result.map_err(EpisodeError::from);
        };

        match result {
            Ok(()) => {
                episode.content = request.content.clone();
                if self.buffer == request.content {
                    self.dirty = false;
                }
                tracing::info!(episode_id = %request.episode_id, "episode saved");
                Ok(())
            }
            Err(BackendError::ReadOnly { episode_id }) => {
                episode.is_read_only = true;
                Err(EpisodeError::ReadOnly { episode_id })
            }
            Err(e) => {
                tracing::warn!(episode_id = %request.episode_id, error = %e, "episode save failed");
                Err(e.into())
            }
        }
    }

    /// Persist the buffer through `backend`.
    pub fn save(&mut self, backend: &dyn EpisodeBackend) -> Result<(), EpisodeError> {
        let request = self.begin_save()?;
        let result = backend.update_episode(request.work_id, request.episode_id, &request.content);
        self.finish_save(&request, result)
    }

    /// Handler for the save key combo. Returns whether a save was issued.
    ///
    /// A read-only episode reports the error without any network call; a clean
    /// buffer or an in-flight save makes the shortcut a no-op.
    pub fn on_save_shortcut(&mut self, backend: &dyn EpisodeBackend) -> Result<bool, EpisodeError> {
        if let Some(episode) = self.episode.as_ref().filter(|e| e.is_read_only) {
            return Err(EpisodeError::ReadOnly {
                episode_id: episode.episode_id,
            });
        }
        if !self.dirty || self.saving {
            return Ok(false);
        }
        self.save(backend)?;
        Ok(true)
    }

    /// Optimistically flag the loaded episode as published.
    ///
    /// The flag is provisional until [`reconcile`] sees a refetched copy.
    ///
    /// [`reconcile`]: EpisodeStore::reconcile
    pub fn mark_published(&mut self) {
        if let Some(episode) = self.episode.as_mut() {
            episode.is_read_only = true;
            episode.is_analyzed = true;
            episode.is_review_pending = false;
            self.optimistic_read_only = true;
            self.pending_write = None;
            self.recorder = Recorder::Idle;
        }
    }

    pub fn has_unconfirmed_publish(&self) -> bool {
        self.optimistic_read_only
    }

    /// Compare the local episode with a freshly fetched one.
    pub fn reconcile(&mut self, persisted: &Episode) -> Reconciliation {
        let Some(episode) = self
            .episode
            .as_mut()
            .filter(|e| e.episode_id == persisted.episode_id)
        else {
            return Reconciliation::Unrelated;
        };

        episode.is_analyzed = persisted.is_analyzed;
        episode.is_review_pending = persisted.is_review_pending;

        if !self.optimistic_read_only {
            episode.is_read_only = persisted.is_read_only;
            return Reconciliation::Unchanged;
        }

        self.optimistic_read_only = false;
        if persisted.is_read_only {
            Reconciliation::Confirmed
        } else {
            tracing::warn!(
                episode_id = %persisted.episode_id,
                "server reports episode editable after publish; reverting local read-only flag"
            );
            episode.is_read_only = false;
            Reconciliation::Reverted
        }
    }

    fn writable_episode_id(&self) -> Result<EpisodeId, EpisodeError> {
        let episode = self.episode.as_ref().ok_or(EpisodeError::NoEpisodeLoaded)?;
        if episode.is_read_only {
            return Err(EpisodeError::ReadOnly {
                episode_id: episode.episode_id,
            });
        }
        Ok(episode.episode_id)
    }
}
