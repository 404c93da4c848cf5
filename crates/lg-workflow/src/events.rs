// events.rs — Workflow event model and notification dispatch.
//
// The controller emits an event at every lifecycle point of the publish
// workflow. Sinks (the always-on JSONL log, an in-memory buffer for the
// dashboard's notice area) subscribe to these events. Dispatch is
// synchronous; a failing sink is logged and skipped.
//
// Deleting a conflict item is evented separately from other deletions: it
// lowers the unresolved count without anyone resolving the conflict.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use lg_episode::{EpisodeId, WorkId};
use lg_lorebook::{DiffBucket, ItemId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::error::Operation;
use crate::status::WorkflowStage;

/// Events emitted at key points of the publish workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// An episode moved between workflow stages.
    StageChanged {
        episode_id: EpisodeId,
        from_stage: String,
        to_stage: String,
        timestamp: DateTime<Utc>,
    },

    /// Keyword candidates arrived and were preselected.
    KeywordsExtracted {
        episode_id: EpisodeId,
        keyword_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// A settings diff was stored for review.
    DiffLoaded {
        episode_id: EpisodeId,
        revision: u64,
        conflicts: usize,
        merges: usize,
        new_entries: usize,
        timestamp: DateTime<Utc>,
    },

    /// The review dialog was opened or reopened.
    ReviewOpened {
        episode_id: EpisodeId,
        session_id: Uuid,
        revision: u64,
        ledger_reset: bool,
        timestamp: DateTime<Utc>,
    },

    /// A conflict's resolved mark was flipped.
    ConflictToggled {
        episode_id: EpisodeId,
        conflict_id: ItemId,
        resolved: bool,
        unresolved: usize,
        timestamp: DateTime<Utc>,
    },

    /// A diff item was deleted before publish.
    ItemDeleted {
        episode_id: EpisodeId,
        bucket: DiffBucket,
        item_id: ItemId,
        timestamp: DateTime<Utc>,
    },

    /// The lorebook was updated and the episode is now read-only.
    Published {
        episode_id: EpisodeId,
        work_id: WorkId,
        fingerprint: String,
        timestamp: DateTime<Utc>,
    },

    /// A collaborator call failed and the workflow rolled back.
    RequestFailed {
        episode_id: EpisodeId,
        operation: Operation,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// A response arrived for a superseded or abandoned request.
    CompletionDiscarded {
        episode_id: EpisodeId,
        operation: Operation,
        timestamp: DateTime<Utc>,
    },

    /// The reviewer abandoned the workflow for an episode.
    Aborted {
        episode_id: EpisodeId,
        stage: String,
        timestamp: DateTime<Utc>,
    },
}

impl WorkflowEvent {
    /// Get the event type name as a string.
    pub fn event_type(&self) -> &str {
        match self {
            WorkflowEvent::StageChanged { .. } => "stage_changed",
            WorkflowEvent::KeywordsExtracted { .. } => "keywords_extracted",
            WorkflowEvent::DiffLoaded { .. } => "diff_loaded",
            WorkflowEvent::ReviewOpened { .. } => "review_opened",
            WorkflowEvent::ConflictToggled { .. } => "conflict_toggled",
            WorkflowEvent::ItemDeleted { .. } => "item_deleted",
            WorkflowEvent::Published { .. } => "published",
            WorkflowEvent::RequestFailed { .. } => "request_failed",
            WorkflowEvent::CompletionDiscarded { .. } => "completion_discarded",
            WorkflowEvent::Aborted { .. } => "aborted",
        }
    }

    pub fn episode_id(&self) -> EpisodeId {
        match self {
            WorkflowEvent::StageChanged { episode_id, .. }
            | WorkflowEvent::KeywordsExtracted { episode_id, .. }
            | WorkflowEvent::DiffLoaded { episode_id, .. }
            | WorkflowEvent::ReviewOpened { episode_id, .. }
            | WorkflowEvent::ConflictToggled { episode_id, .. }
            | WorkflowEvent::ItemDeleted { episode_id, .. }
            | WorkflowEvent::Published { episode_id, .. }
            | WorkflowEvent::RequestFailed { episode_id, .. }
            | WorkflowEvent::CompletionDiscarded { episode_id, .. }
            | WorkflowEvent::Aborted { episode_id, .. } => *episode_id,
        }
    }

    pub fn stage_changed(episode_id: EpisodeId, from: WorkflowStage, to: WorkflowStage) -> Self {
        WorkflowEvent::StageChanged {
            episode_id,
            from_stage: from.to_string(),
            to_stage: to.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn request_failed(episode_id: EpisodeId, operation: Operation, error: &str) -> Self {
        WorkflowEvent::RequestFailed {
            episode_id,
            operation,
            error: error.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn completion_discarded(episode_id: EpisodeId, operation: Operation) -> Self {
        WorkflowEvent::CompletionDiscarded {
            episode_id,
            operation,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

/// Receives workflow events.
pub trait NotificationSink: Send {
    /// Handle an event. Errors are logged but don't stop the workflow.
    fn send(&self, event: &WorkflowEvent) -> Result<(), SinkError>;
}

/// Logs events as JSONL to a file.
pub struct LogSink {
    path: PathBuf,
}

impl LogSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn io_error(path: &Path, source: io::Error) -> SinkError {
        SinkError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

impl NotificationSink for LogSink {
    fn send(&self, event: &WorkflowEvent) -> Result<(), SinkError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| Self::io_error(parent, e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Self::io_error(&self.path, e))?;

        let json = serde_json::to_string(event)?;
        writeln!(file, "{}", json).map_err(|e| Self::io_error(&self.path, e))?;
        Ok(())
    }
}

/// Buffers events in memory; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<WorkflowEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every buffered event, oldest first.
    pub fn drain(&self) -> Vec<WorkflowEvent> {
        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(_) => Vec::new(),
        }
    }

    pub fn event_types(&self) -> Vec<String> {
        match self.events.lock() {
            Ok(events) => events.iter().map(|e| e.event_type().to_string()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl NotificationSink for MemorySink {
    fn send(&self, event: &WorkflowEvent) -> Result<(), SinkError> {
        self.events
            .lock()
            .map_err(|e| SinkError::Unavailable(e.to_string()))?
            .push(event.clone());
        Ok(())
    }
}

/// Dispatches events to multiple sinks.
///
/// Errors from individual sinks are logged (via tracing) but don't
/// prevent other sinks from receiving the event.
pub struct EventDispatcher {
    sinks: Vec<Box<dyn NotificationSink>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add_sink(&mut self, sink: Box<dyn NotificationSink>) {
        self.sinks.push(sink);
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn dispatch(&self, event: &WorkflowEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.send(event) {
                tracing::warn!(event = event.event_type(), "notification sink error: {}", e);
            }
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
