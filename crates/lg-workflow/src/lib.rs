//! # lg-workflow
//!
//! The episode-publish reconciliation workflow.
//!
//! Freshly written episode text goes through keyword extraction, a human
//! keyword selection, settings-diff analysis and a conflict review before the
//! lorebook is permanently updated and the episode becomes read-only. The
//! [`WorkflowController`] owns the per-episode status map and enforces every
//! gate along the way:
//!
//! ```text
//! Idle → Extracting → KeywordsReady → Analyzing → {Conflicted | Clear}
//!      → Publishing → Published
//! ```
//!
//! ## Key components
//!
//! - [`WorkflowController`] — per-episode records and reviews, gates
//! - [`WorkflowStage`] / [`ProcessingStatus`] — the lifecycle state machine
//! - [`AnalysisBackend`] — trait for the remote analysis service
//! - [`WorkflowEvent`] / [`EventDispatcher`] — lifecycle notifications
//! - [`WorkflowConfig`] — `lorebook.toml` configuration

pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod review;
pub mod status;

pub use backend::{AnalysisBackend, BackendError, EpisodeBackend};
pub use config::{BackendConfig, ConfigError, EventsConfig, WorkflowConfig};
pub use controller::{
    AnalysisRequest, Completion, PublishRequest, RequestTicket, UnsavedPolicy, WorkflowController,
};
pub use error::{ErrorKind, Operation, ValidationError, WorkflowError};
pub use events::{EventDispatcher, LogSink, MemorySink, NotificationSink, SinkError, WorkflowEvent};
pub use review::{GateState, ReviewSession};
pub use status::{ProcessingStatus, WorkflowStage};
