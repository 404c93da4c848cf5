// controller.rs — WorkflowController: per-episode records and the publish gates.
//
// The controller owns one record per episode that has entered the workflow,
// keyed by episode id, and at most one review session per episode. An episode
// with no record is idle, or published if its id is in the published set.
//
// Every network-bound gate is split in two:
//   begin_*    — validates the stage, moves the record, returns a ticket
//   complete_* — applies the collaborator's answer for that ticket
// A completion whose ticket is no longer the record's in-flight ticket (the
// review was closed, or a newer request superseded it) is discarded. The
// one-shot helpers `extract_keywords`, `analyze` and `publish` run
// begin → call → complete against a backend.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use lg_episode::{
    BackendError, Episode, EpisodeBackend, EpisodeId, EpisodeListCache, EpisodeStore,
    Reconciliation, WorkId,
};
use lg_lorebook::{
    DiffBucket, Draft, ItemId, KeywordSet, LorebookError, SelectionSet, SettingsDiff,
};

use crate::backend::AnalysisBackend;
use crate::config::WorkflowConfig;
use crate::error::{from_lorebook, Operation, ValidationError, WorkflowError};
use crate::events::{EventDispatcher, LogSink, NotificationSink, WorkflowEvent};
use crate::review::{GateState, ReviewSession};
use crate::status::{ProcessingStatus, WorkflowStage};

/// Ties a collaborator response to the request that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestTicket {
    episode_id: EpisodeId,
    operation: Operation,
    serial: u64,
}

impl RequestTicket {
    pub fn episode_id(&self) -> EpisodeId {
        self.episode_id
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }
}

/// Whether a completion changed the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied,
    /// The ticket was stale; the response was dropped.
    Discarded,
}

/// What extraction does when the editor buffer has unsaved changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsavedPolicy {
    /// Persist the buffer, then extract from the saved content.
    SaveFirst,
    /// Reject the extraction.
    Abort,
}

/// An analysis request that has been started.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub ticket: RequestTicket,
    pub work_id: WorkId,
    pub selection: KeywordSet,
}

/// A publish request that has been started.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub ticket: RequestTicket,
    pub work_id: WorkId,
    /// The reviewed diff, edits and deletions applied.
    pub diff: SettingsDiff,
    /// Fingerprint of `diff`.
    pub fingerprint: String,
}

#[derive(Debug)]
struct WorkflowRecord {
    work_id: WorkId,
    status: ProcessingStatus,
    in_flight: Option<RequestTicket>,
    selection: Option<SelectionSet>,
    diff: Option<SettingsDiff>,
    /// Revision of `diff`; 0 until a diff is stored.
    revision: u64,
    /// Set while a publish of `diff` is in flight.
    fingerprint: Option<String>,
}

impl WorkflowRecord {
    fn extracting(work_id: WorkId, ticket: RequestTicket) -> Self {
        Self {
            work_id,
            status: ProcessingStatus::Extracting,
            in_flight: Some(ticket),
            selection: None,
            diff: None,
            revision: 0,
            fingerprint: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct WorkflowController {
    records: HashMap<EpisodeId, WorkflowRecord>,
    published: HashSet<EpisodeId>,
    reviews: HashMap<EpisodeId, ReviewSession>,
    next_serial: u64,
    next_revision: u64,
    episode_lists: EpisodeListCache,
    dispatcher: EventDispatcher,
}

impl WorkflowController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dispatcher(dispatcher: EventDispatcher) -> Self {
        Self {
            dispatcher,
            ..Self::default()
        }
    }

    /// Build a controller whose events go to the configured log file, if any.
    pub fn from_config(config: &WorkflowConfig) -> Self {
        let mut dispatcher = EventDispatcher::new();
        if let Some(path) = &config.events.log_path {
            dispatcher.add_sink(Box::new(LogSink::new(path)));
        }
        Self::with_dispatcher(dispatcher)
    }

    pub fn add_sink(&mut self, sink: Box<dyn NotificationSink>) {
        self.dispatcher.add_sink(sink);
    }

    // ── Status map ──────────────────────────────────────────────

    pub fn status(&self, episode_id: EpisodeId) -> Option<ProcessingStatus> {
        self.records.get(&episode_id).map(|r| r.status)
    }

    /// Snapshot of every episode currently in the workflow.
    pub fn statuses(&self) -> BTreeMap<EpisodeId, ProcessingStatus> {
        self.records.iter().map(|(id, r)| (*id, r.status)).collect()
    }

    pub fn is_published(&self, episode_id: EpisodeId) -> bool {
        self.published.contains(&episode_id)
    }

    pub fn stage(&self, episode_id: EpisodeId) -> WorkflowStage {
        let Some(record) = self.records.get(&episode_id) else {
            return if self.published.contains(&episode_id) {
                WorkflowStage::Published
            } else {
                WorkflowStage::Idle
            };
        };
        match record.status {
            ProcessingStatus::Extracting => WorkflowStage::Extracting,
            ProcessingStatus::KeywordsReady => WorkflowStage::KeywordsReady,
            ProcessingStatus::Analyzing => WorkflowStage::Analyzing,
            ProcessingStatus::ReviewReady if record.in_flight.is_some() => WorkflowStage::Publishing,
            ProcessingStatus::ReviewReady => {
                if self.unresolved_in(episode_id, record) > 0 {
                    WorkflowStage::Conflicted
                } else {
                    WorkflowStage::Clear
                }
            }
        }
    }

    /// Unresolved conflicts of a stored diff. Without a session for its
    /// revision the ledger is empty, so every conflict counts.
    fn unresolved_in(&self, episode_id: EpisodeId, record: &WorkflowRecord) -> usize {
        let Some(diff) = record.diff.as_ref() else {
            return 0;
        };
        match self.reviews.get(&episode_id) {
            Some(session) if session.is_for(episode_id, record.revision) => {
                session.ledger.unresolved_count(diff)
            }
            _ => diff.conflicts.len(),
        }
    }

    // ── Keyword extraction ──────────────────────────────────────

    fn check_extraction(&self, episode: &Episode) -> Result<WorkflowStage, WorkflowError> {
        let episode_id = episode.episode_id;
        if episode.is_read_only || self.published.contains(&episode_id) {
            return Err(ValidationError::ReadOnly { episode_id }.into());
        }
        let stage = self.stage(episode_id);
        if !stage.can_transition_to(&WorkflowStage::Extracting) {
            return Err(WorkflowError::StateConflict {
                episode_id,
                stage,
                action: "extract keywords",
            });
        }
        Ok(stage)
    }

    /// Start keyword extraction for `episode`.
    ///
    /// `dirty` is whether the editor holds unsaved changes; extraction reads
    /// the persisted content, so a dirty buffer is rejected.
    pub fn begin_extraction(
        &mut self,
        episode: &Episode,
        dirty: bool,
    ) -> Result<RequestTicket, WorkflowError> {
        let from = self.check_extraction(episode)?;
        let episode_id = episode.episode_id;
        if dirty {
            return Err(ValidationError::UnsavedChanges { episode_id }.into());
        }

        let ticket = self.issue(episode_id, Operation::Extraction);
        self.records
            .insert(episode_id, WorkflowRecord::extracting(episode.work_id, ticket));
        self.note_stage(episode_id, from);
        Ok(ticket)
    }

    /// Apply the extraction result. All candidates start selected.
    pub fn complete_extraction(
        &mut self,
        ticket: RequestTicket,
        result: Result<KeywordSet, BackendError>,
    ) -> Result<Completion, WorkflowError> {
        let episode_id = ticket.episode_id;
        let from = self.stage(episode_id);
        let Some(record) = self.current_record(ticket) else {
            self.discard(ticket);
            return Ok(Completion::Discarded);
        };

        match result {
            Ok(candidates) => {
                let keyword_count = candidates.total();
                record.status = ProcessingStatus::KeywordsReady;
                record.in_flight = None;
                record.selection = Some(SelectionSet::select_all(candidates));
                tracing::info!(episode_id = %episode_id, keyword_count, "keywords extracted");
                self.emit(WorkflowEvent::KeywordsExtracted {
                    episode_id,
                    keyword_count,
                    timestamp: Utc::now(),
                });
                self.note_stage(episode_id, from);
                Ok(Completion::Applied)
            }
            Err(source) => {
                self.records.remove(&episode_id);
                Err(self.fail(ticket, from, source))
            }
        }
    }

    /// Save if needed, then run extraction against `analysis`.
    pub fn extract_keywords(
        &mut self,
        analysis: &dyn AnalysisBackend,
        episodes: &dyn EpisodeBackend,
        store: &mut EpisodeStore,
        policy: UnsavedPolicy,
    ) -> Result<Completion, WorkflowError> {
        let episode = store.episode().ok_or(ValidationError::NoEpisodeLoaded)?;
        self.check_extraction(episode)?;
        if store.is_dirty() && policy == UnsavedPolicy::SaveFirst {
            tracing::info!(episode_id = %episode.episode_id, "saving episode before extraction");
            store.save(episodes)?;
        }

        let ticket = {
            let episode = store.episode().ok_or(ValidationError::NoEpisodeLoaded)?;
            self.begin_extraction(episode, store.is_dirty())?
        };
        tracing::debug!(backend = analysis.name(), episode_id = %ticket.episode_id, "requesting keywords");
        let result = analysis.extract_keywords(ticket.episode_id);
        self.complete_extraction(ticket, result)
    }

    // ── Keyword selection ───────────────────────────────────────

    pub fn selection(&self, episode_id: EpisodeId) -> Option<&SelectionSet> {
        self.records
            .get(&episode_id)
            .filter(|r| r.status == ProcessingStatus::KeywordsReady)
            .and_then(|r| r.selection.as_ref())
    }

    /// The selection to toggle while the episode's keywords are ready.
    pub fn selection_mut(&mut self, episode_id: EpisodeId) -> Result<&mut SelectionSet, WorkflowError> {
        let stage = self.stage(episode_id);
        self.records
            .get_mut(&episode_id)
            .filter(|r| r.status == ProcessingStatus::KeywordsReady)
            .and_then(|r| r.selection.as_mut())
            .ok_or(WorkflowError::StateConflict {
                episode_id,
                stage,
                action: "select keywords",
            })
    }

    // ── Settings-diff analysis ──────────────────────────────────

    /// Start analysis with the acknowledged keyword selection.
    pub fn begin_analysis(&mut self, episode_id: EpisodeId) -> Result<AnalysisRequest, WorkflowError> {
        let from = self.stage(episode_id);
        let conflict = WorkflowError::StateConflict {
            episode_id,
            stage: from,
            action: "analyze settings",
        };
        if !from.can_transition_to(&WorkflowStage::Analyzing) {
            return Err(conflict);
        }
        let Some(record) = self.records.get(&episode_id) else {
            return Err(conflict);
        };
        let Some(selection) = record.selection.as_ref() else {
            return Err(conflict);
        };
        let selection = selection.submission().map_err(from_lorebook)?;
        let work_id = record.work_id;

        let ticket = self.issue(episode_id, Operation::Analysis);
        if let Some(record) = self.records.get_mut(&episode_id) {
            record.status = ProcessingStatus::Analyzing;
            record.in_flight = Some(ticket);
        }
        self.note_stage(episode_id, from);
        Ok(AnalysisRequest {
            ticket,
            work_id,
            selection,
        })
    }

    /// Store the diff and open its review with an empty ledger.
    ///
    /// A failure drops the record: keywords and selection are discarded and
    /// the episode is idle again.
    pub fn complete_analysis(
        &mut self,
        ticket: RequestTicket,
        result: Result<SettingsDiff, BackendError>,
    ) -> Result<Completion, WorkflowError> {
        let episode_id = ticket.episode_id;
        let from = self.stage(episode_id);
        self.next_revision += 1;
        let revision = self.next_revision;
        let Some(record) = self.current_record(ticket) else {
            self.discard(ticket);
            return Ok(Completion::Discarded);
        };

        match result {
            Ok(diff) => {
                let counts = diff.counts();
                record.status = ProcessingStatus::ReviewReady;
                record.in_flight = None;
                record.selection = None;
                record.diff = Some(diff);
                record.revision = revision;
                tracing::info!(
                    episode_id = %episode_id,
                    revision,
                    conflicts = counts.conflicts,
                    merges = counts.merges,
                    new_entries = counts.new_entries,
                    "settings diff ready for review"
                );
                self.emit(WorkflowEvent::DiffLoaded {
                    episode_id,
                    revision,
                    conflicts: counts.conflicts,
                    merges: counts.merges,
                    new_entries: counts.new_entries,
                    timestamp: Utc::now(),
                });
                self.open_review(episode_id)?;
                self.note_stage(episode_id, from);
                Ok(Completion::Applied)
            }
            Err(source) => {
                self.records.remove(&episode_id);
                Err(self.fail(ticket, from, source))
            }
        }
    }

    /// Run analysis for an episode whose keywords are ready.
    pub fn analyze(
        &mut self,
        analysis: &dyn AnalysisBackend,
        episode_id: EpisodeId,
    ) -> Result<Completion, WorkflowError> {
        let request = self.begin_analysis(episode_id)?;
        tracing::debug!(backend = analysis.name(), episode_id = %episode_id, "requesting settings diff");
        let result = analysis.analyze(request.work_id, &request.selection);
        self.complete_analysis(request.ticket, result)
    }

    // ── Review ──────────────────────────────────────────────────

    /// Open (or reopen) the review of an episode's stored diff.
    ///
    /// Reopening the session for the same diff revision keeps its ledger and
    /// drafts; a newer revision starts a fresh session with an empty ledger.
    /// Other episodes' sessions are untouched.
    pub fn open_review(&mut self, episode_id: EpisodeId) -> Result<&ReviewSession, WorkflowError> {
        let stage = self.stage(episode_id);
        let Some(record) = self
            .records
            .get(&episode_id)
            .filter(|r| r.status == ProcessingStatus::ReviewReady && r.diff.is_some())
        else {
            return Err(WorkflowError::StateConflict {
                episode_id,
                stage,
                action: "open the review",
            });
        };
        let (work_id, revision) = (record.work_id, record.revision);

        let (session, ledger_reset) = match self.reviews.remove(&episode_id) {
            Some(session) if session.is_for(episode_id, revision) => (session, false),
            _ => (ReviewSession::new(work_id, episode_id, revision), true),
        };
        tracing::debug!(episode_id = %episode_id, revision, ledger_reset, "review opened");
        self.emit(WorkflowEvent::ReviewOpened {
            episode_id,
            session_id: session.session_id,
            revision,
            ledger_reset,
            timestamp: Utc::now(),
        });
        Ok(&*self.reviews.entry(episode_id).or_insert(session))
    }

    pub fn review(&self, episode_id: EpisodeId) -> Option<&ReviewSession> {
        self.reviews.get(&episode_id)
    }

    /// The stored diff of an episode under review, edits included.
    pub fn diff(&self, episode_id: EpisodeId) -> Option<&SettingsDiff> {
        self.records
            .get(&episode_id)
            .and_then(|r| r.diff.as_ref())
    }

    fn review_view(
        &self,
        episode_id: EpisodeId,
    ) -> Result<(&ReviewSession, &SettingsDiff), WorkflowError> {
        let session = self
            .reviews
            .get(&episode_id)
            .ok_or(WorkflowError::NoActiveReview { episode_id })?;
        let diff = self
            .records
            .get(&episode_id)
            .filter(|r| r.revision == session.revision)
            .and_then(|r| r.diff.as_ref())
            .ok_or(WorkflowError::NoActiveReview { episode_id })?;
        Ok((session, diff))
    }

    /// Session and diff for a review mutation; rejected while publishing.
    fn review_parts(
        &mut self,
        episode_id: EpisodeId,
        action: &'static str,
    ) -> Result<(&mut ReviewSession, &mut SettingsDiff), WorkflowError> {
        let stage = self.stage(episode_id);
        if stage == WorkflowStage::Publishing {
            return Err(WorkflowError::StateConflict {
                episode_id,
                stage,
                action,
            });
        }
        let session = self
            .reviews
            .get_mut(&episode_id)
            .ok_or(WorkflowError::NoActiveReview { episode_id })?;
        let revision = session.revision;
        let diff = self
            .records
            .get_mut(&episode_id)
            .filter(|r| r.revision == revision)
            .and_then(|r| r.diff.as_mut())
            .ok_or(WorkflowError::NoActiveReview { episode_id })?;
        session.touch();
        Ok((session, diff))
    }

    /// Flip a conflict's resolved mark. Returns the new state.
    pub fn toggle_resolved(
        &mut self,
        episode_id: EpisodeId,
        conflict_id: &ItemId,
    ) -> Result<bool, WorkflowError> {
        let from = self.stage(episode_id);
        let (session, diff) = self.review_parts(episode_id, "resolve conflicts")?;
        if diff.conflict(conflict_id).is_none() {
            return Err(LorebookError::NotFound {
                bucket: DiffBucket::Conflicts,
                id: conflict_id.clone(),
            }
            .into());
        }
        let resolved = session.ledger.toggle_resolved(conflict_id);
        let unresolved = session.ledger.unresolved_count(diff);

        self.emit(WorkflowEvent::ConflictToggled {
            episode_id,
            conflict_id: conflict_id.clone(),
            resolved,
            unresolved,
            timestamp: Utc::now(),
        });
        self.note_stage(episode_id, from);
        Ok(resolved)
    }

    pub fn unresolved_count(&self, episode_id: EpisodeId) -> Result<usize, WorkflowError> {
        let (session, diff) = self.review_view(episode_id)?;
        Ok(session.ledger.unresolved_count(diff))
    }

    pub fn gate(&self, episode_id: EpisodeId) -> Result<GateState, WorkflowError> {
        let (session, diff) = self.review_view(episode_id)?;
        Ok(session.gate(diff))
    }

    pub fn start_edit(
        &mut self,
        episode_id: EpisodeId,
        bucket: DiffBucket,
        item_id: &ItemId,
    ) -> Result<&mut Draft, WorkflowError> {
        let (session, diff) = self.review_parts(episode_id, "edit review items")?;
        session
            .editor
            .start_edit(diff, bucket, item_id)
            .map_err(from_lorebook)
    }

    pub fn draft_mut(&mut self, episode_id: EpisodeId) -> Option<&mut Draft> {
        self.reviews
            .get_mut(&episode_id)
            .and_then(|s| s.editor.draft_mut())
    }

    /// Write the open draft into the stored diff.
    ///
    /// A merge needs a non-empty description, a new entry a non-empty name.
    pub fn save_edit(
        &mut self,
        episode_id: EpisodeId,
        bucket: DiffBucket,
        item_id: &ItemId,
    ) -> Result<(), WorkflowError> {
        let (session, diff) = self.review_parts(episode_id, "edit review items")?;
        if session.editor.is_editing(bucket, item_id) {
            if let Some(draft) = session.editor.draft() {
                validate_draft(draft)?;
            }
        }
        session
            .editor
            .save_edit(diff, bucket, item_id)
            .map_err(from_lorebook)
    }

    /// Drop the open draft. Returns whether a review was open to cancel in.
    pub fn cancel_edit(&mut self, episode_id: EpisodeId) -> bool {
        match self.reviews.get_mut(&episode_id) {
            Some(session) => {
                session.editor.cancel_edit();
                true
            }
            None => false,
        }
    }

    pub fn request_delete(
        &mut self,
        episode_id: EpisodeId,
        bucket: DiffBucket,
        item_id: &ItemId,
    ) -> Result<(), WorkflowError> {
        let (session, diff) = self.review_parts(episode_id, "delete review items")?;
        session
            .editor
            .request_delete(diff, bucket, item_id)
            .map_err(from_lorebook)
    }

    pub fn cancel_delete(&mut self, episode_id: EpisodeId) -> bool {
        match self.reviews.get_mut(&episode_id) {
            Some(session) => {
                session.editor.cancel_delete();
                true
            }
            None => false,
        }
    }

    /// Remove the item named by `request_delete` from the stored diff.
    pub fn confirm_delete(
        &mut self,
        episode_id: EpisodeId,
    ) -> Result<(DiffBucket, ItemId), WorkflowError> {
        let from = self.stage(episode_id);
        let (session, diff) = self.review_parts(episode_id, "delete review items")?;
        let unresolved_conflict = session
            .editor
            .pending_delete()
            .is_some_and(|(bucket, id)| {
                bucket == DiffBucket::Conflicts && !session.ledger.is_resolved(id)
            });
        let (bucket, item_id) = session
            .editor
            .confirm_delete(diff, &mut session.ledger)
            .map_err(from_lorebook)?;

        if unresolved_conflict {
            tracing::warn!(
                episode_id = %episode_id,
                conflict_id = %item_id,
                "unresolved conflict deleted; it no longer gates publish"
            );
        } else {
            tracing::info!(episode_id = %episode_id, %bucket, item_id = %item_id, "review item deleted");
        }
        self.emit(WorkflowEvent::ItemDeleted {
            episode_id,
            bucket,
            item_id: item_id.clone(),
            timestamp: Utc::now(),
        });
        self.note_stage(episode_id, from);
        Ok((bucket, item_id))
    }

    /// Tick or untick the "apply these changes" acknowledgement.
    pub fn set_publish_acknowledged(
        &mut self,
        episode_id: EpisodeId,
        acknowledged: bool,
    ) -> Result<(), WorkflowError> {
        let (session, _) = self.review_parts(episode_id, "acknowledge publish")?;
        session.publish_acknowledged = acknowledged;
        Ok(())
    }

    // ── Publish ─────────────────────────────────────────────────

    /// Start publishing the reviewed diff.
    ///
    /// Requires the gate to be clear and acknowledged. A publish already in
    /// flight for the episode is a state conflict.
    pub fn begin_publish(&mut self, episode_id: EpisodeId) -> Result<PublishRequest, WorkflowError> {
        let from = self.stage(episode_id);
        if !from.can_transition_to(&WorkflowStage::Publishing) {
            return Err(WorkflowError::StateConflict {
                episode_id,
                stage: from,
                action: "publish",
            });
        }
        let (session, diff) = self.review_view(episode_id)?;
        if !session.gate(diff).can_publish() {
            return Err(ValidationError::ConfirmationRequired(
                "acknowledge the reviewed changes before publishing",
            )
            .into());
        }
        let work_id = session.work_id;
        let fingerprint = diff.fingerprint().map_err(from_lorebook)?;
        let diff = diff.clone();

        let ticket = self.issue(episode_id, Operation::Publish);
        if let Some(record) = self.records.get_mut(&episode_id) {
            record.in_flight = Some(ticket);
            record.fingerprint = Some(fingerprint.clone());
        }
        tracing::info!(episode_id = %episode_id, work_id = %work_id, %fingerprint, "publishing reviewed diff");
        self.note_stage(episode_id, from);
        Ok(PublishRequest {
            ticket,
            work_id,
            diff,
            fingerprint,
        })
    }

    /// Apply the publish result.
    ///
    /// On success the record and review are torn down, the loaded episode is
    /// optimistically flagged read-only and the work's episode list is
    /// invalidated. On failure the diff and review stay for a retry.
    pub fn complete_publish(
        &mut self,
        ticket: RequestTicket,
        result: Result<(), BackendError>,
        store: &mut EpisodeStore,
    ) -> Result<Completion, WorkflowError> {
        let episode_id = ticket.episode_id;
        let from = self.stage(episode_id);
        let Some(record) = self.current_record(ticket) else {
            if result.is_ok() {
                tracing::warn!(
                    episode_id = %episode_id,
                    "publish confirmed after the review was closed; refetch the episode to reconcile"
                );
            }
            self.discard(ticket);
            return Ok(Completion::Discarded);
        };

        match result {
            Ok(()) => {
                let work_id = record.work_id;
                let fingerprint = record.fingerprint.take().unwrap_or_default();
                self.records.remove(&episode_id);
                self.reviews.remove(&episode_id);
                self.published.insert(episode_id);
                self.episode_lists.invalidate(work_id);
                if store.episode().is_some_and(|e| e.episode_id == episode_id) {
                    store.mark_published();
                }

                tracing::info!(episode_id = %episode_id, work_id = %work_id, "episode published");
                self.emit(WorkflowEvent::Published {
                    episode_id,
                    work_id,
                    fingerprint,
                    timestamp: Utc::now(),
                });
                self.note_stage(episode_id, from);
                Ok(Completion::Applied)
            }
            Err(source) => {
                record.in_flight = None;
                record.fingerprint = None;
                Err(self.fail(ticket, from, source))
            }
        }
    }

    /// Publish the reviewed diff through `analysis`.
    pub fn publish(
        &mut self,
        analysis: &dyn AnalysisBackend,
        store: &mut EpisodeStore,
        episode_id: EpisodeId,
    ) -> Result<Completion, WorkflowError> {
        let request = self.begin_publish(episode_id)?;
        tracing::debug!(backend = analysis.name(), episode_id = %episode_id, "confirming publish");
        let result = analysis.confirm_publish(request.work_id, episode_id, &request.diff);
        self.complete_publish(request.ticket, result, store)
    }

    /// Re-check the optimistic read-only flag against a refetched episode.
    pub fn reconcile(&mut self, store: &mut EpisodeStore, persisted: &Episode) -> Reconciliation {
        let outcome = store.reconcile(persisted);
        if persisted.is_read_only {
            self.published.insert(persisted.episode_id);
        } else if self.published.remove(&persisted.episode_id) {
            tracing::warn!(
                episode_id = %persisted.episode_id,
                "server reports episode unpublished; it may re-enter the workflow"
            );
        }
        outcome
    }

    // ── Abort ───────────────────────────────────────────────────

    /// Abandon the workflow for an episode. Returns whether it had a record.
    ///
    /// An in-flight request is not cancelled; its response will be discarded.
    pub fn abort(&mut self, episode_id: EpisodeId) -> bool {
        let from = self.stage(episode_id);
        let Some(record) = self.records.remove(&episode_id) else {
            return false;
        };
        self.reviews.remove(&episode_id);
        if let Some(ticket) = record.in_flight {
            tracing::info!(
                episode_id = %episode_id,
                operation = %ticket.operation,
                "abandoning episode with a request in flight"
            );
        }
        self.emit(WorkflowEvent::Aborted {
            episode_id,
            stage: from.to_string(),
            timestamp: Utc::now(),
        });
        self.note_stage(episode_id, from);
        true
    }

    // ── Episode listings ────────────────────────────────────────

    pub fn episode_list(
        &mut self,
        episodes: &dyn EpisodeBackend,
        work_id: WorkId,
    ) -> Result<&[Episode], BackendError> {
        self.episode_lists.get_or_fetch(episodes, work_id)
    }

    pub fn cached_episode_list(&self, work_id: WorkId) -> Option<&[Episode]> {
        self.episode_lists.get(work_id)
    }

    // ── Internals ───────────────────────────────────────────────

    fn issue(&mut self, episode_id: EpisodeId, operation: Operation) -> RequestTicket {
        self.next_serial += 1;
        RequestTicket {
            episode_id,
            operation,
            serial: self.next_serial,
        }
    }

    fn current_record(&mut self, ticket: RequestTicket) -> Option<&mut WorkflowRecord> {
        self.records
            .get_mut(&ticket.episode_id)
            .filter(|r| r.in_flight == Some(ticket))
    }

    fn discard(&self, ticket: RequestTicket) {
        tracing::warn!(
            episode_id = %ticket.episode_id,
            operation = %ticket.operation,
            "discarding response for a superseded or abandoned request"
        );
        self.emit(WorkflowEvent::completion_discarded(
            ticket.episode_id,
            ticket.operation,
        ));
    }

    fn fail(&self, ticket: RequestTicket, from: WorkflowStage, source: BackendError) -> WorkflowError {
        tracing::warn!(
            episode_id = %ticket.episode_id,
            operation = %ticket.operation,
            error = %source,
            "collaborator request failed"
        );
        self.emit(WorkflowEvent::request_failed(
            ticket.episode_id,
            ticket.operation,
            &source.to_string(),
        ));
        self.note_stage(ticket.episode_id, from);
        WorkflowError::transport(ticket.operation, ticket.episode_id, source)
    }

    fn note_stage(&self, episode_id: EpisodeId, from: WorkflowStage) {
        let to = self.stage(episode_id);
        if from == to {
            return;
        }
        debug_assert!(from.can_transition_to(&to), "unexpected transition {from} -> {to}");
        tracing::info!(episode_id = %episode_id, %from, %to, "workflow stage changed");
        self.emit(WorkflowEvent::stage_changed(episode_id, from, to));
    }

    fn emit(&self, event: WorkflowEvent) {
        self.dispatcher.dispatch(&event);
    }
}

fn validate_draft(draft: &Draft) -> Result<(), ValidationError> {
    match draft {
        Draft::Merge { new, .. } if new.trim().is_empty() => {
            Err(ValidationError::EmptyField { field: "description" })
        }
        Draft::NewEntry(entry) if entry.name.trim().is_empty() => {
            Err(ValidationError::EmptyField { field: "name" })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::events::MemorySink;
    use lg_episode::HistoryConfig;
    use lg_lorebook::{Category, ConflictItem, MergeItem};

    fn episode(id: u64) -> Episode {
        Episode::new(WorkId(1), EpisodeId(id), format!("{id}화"), "본문")
    }

    fn keywords() -> KeywordSet {
        KeywordSet::from_pairs([
            (Category::Person, vec!["Alice".to_string(), "Bob".to_string()]),
            (Category::Place, vec!["왕도".to_string()]),
        ])
    }

    fn conflict_diff() -> SettingsDiff {
        SettingsDiff {
            conflicts: vec![ConflictItem {
                id: ItemId::new("c1"),
                name: "Alice".into(),
                category: Category::Person,
                reason: "age".into(),
                original: "17".into(),
                new: "25".into(),
            }],
            merges: vec![MergeItem {
                id: ItemId::new("m1"),
                name: "왕도".into(),
                category: Category::Place,
                original: "수도".into(),
                new: "수도, 성벽".into(),
            }],
            new_entries: Vec::new(),
        }
    }

    fn controller() -> (WorkflowController, MemorySink) {
        let sink = MemorySink::new();
        let mut controller = WorkflowController::new();
        controller.add_sink(Box::new(sink.clone()));
        (controller, sink)
    }

    /// Drive an episode to review with the given diff.
    fn reviewing(controller: &mut WorkflowController, id: u64, diff: SettingsDiff) {
        let ticket = controller.begin_extraction(&episode(id), false).unwrap();
        controller.complete_extraction(ticket, Ok(keywords())).unwrap();
        controller
            .selection_mut(EpisodeId(id))
            .unwrap()
            .set_acknowledged(true);
        let request = controller.begin_analysis(EpisodeId(id)).unwrap();
        controller.complete_analysis(request.ticket, Ok(diff)).unwrap();
    }

    #[test]
    fn extraction_preselects_every_keyword() {
        let (mut controller, _) = controller();
        let ticket = controller.begin_extraction(&episode(5), false).unwrap();
        assert_eq!(controller.status(EpisodeId(5)), Some(ProcessingStatus::Extracting));

        controller.complete_extraction(ticket, Ok(keywords())).unwrap();
        let selection = controller.selection(EpisodeId(5)).unwrap();
        assert!(selection.is_fully_selected());
        assert_eq!(selection.total_selected(), 3);
        assert_eq!(controller.stage(EpisodeId(5)), WorkflowStage::KeywordsReady);
    }

    #[test]
    fn extraction_is_rejected_while_analyzing() {
        let (mut controller, _) = controller();
        let ticket = controller.begin_extraction(&episode(5), false).unwrap();
        controller.complete_extraction(ticket, Ok(keywords())).unwrap();
        controller.selection_mut(EpisodeId(5)).unwrap().set_acknowledged(true);
        controller.begin_analysis(EpisodeId(5)).unwrap();

        let err = controller.begin_extraction(&episode(5), false).unwrap_err();
        assert!(err.is_in_progress());
        assert_eq!(err.kind(), ErrorKind::StateConflict);
        assert_eq!(controller.status(EpisodeId(5)), Some(ProcessingStatus::Analyzing));
    }

    #[test]
    fn extraction_rejects_dirty_and_read_only_episodes() {
        let (mut controller, _) = controller();
        let err = controller.begin_extraction(&episode(1), true).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Validation(ValidationError::UnsavedChanges { .. })
        ));

        let mut published = episode(2);
        published.is_read_only = true;
        let err = controller.begin_extraction(&published, false).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Validation(ValidationError::ReadOnly { .. })
        ));
        assert!(controller.statuses().is_empty());
    }

    #[test]
    fn extraction_failure_returns_to_idle() {
        let (mut controller, sink) = controller();
        let ticket = controller.begin_extraction(&episode(3), false).unwrap();
        let err = controller
            .complete_extraction(ticket, Err(BackendError::Transport("timeout".into())))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(controller.status(EpisodeId(3)), None);
        assert_eq!(controller.stage(EpisodeId(3)), WorkflowStage::Idle);
        assert!(sink.event_types().contains(&"request_failed".to_string()));
    }

    #[test]
    fn analysis_requires_acknowledged_selection() {
        let (mut controller, _) = controller();
        let ticket = controller.begin_extraction(&episode(4), false).unwrap();
        controller.complete_extraction(ticket, Ok(keywords())).unwrap();

        let err = controller.begin_analysis(EpisodeId(4)).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Validation(ValidationError::ConfirmationRequired(_))
        ));
        assert_eq!(controller.status(EpisodeId(4)), Some(ProcessingStatus::KeywordsReady));
    }

    #[test]
    fn zero_keyword_submission_is_allowed_when_acknowledged() {
        let (mut controller, _) = controller();
        let ticket = controller.begin_extraction(&episode(4), false).unwrap();
        controller.complete_extraction(ticket, Ok(keywords())).unwrap();
        let selection = controller.selection_mut(EpisodeId(4)).unwrap();
        selection.toggle_all(false);
        selection.set_acknowledged(true);

        let request = controller.begin_analysis(EpisodeId(4)).unwrap();
        assert_eq!(request.selection.total(), 0);
    }

    #[test]
    fn analysis_failure_discards_keywords() {
        let (mut controller, _) = controller();
        let ticket = controller.begin_extraction(&episode(4), false).unwrap();
        controller.complete_extraction(ticket, Ok(keywords())).unwrap();
        controller.selection_mut(EpisodeId(4)).unwrap().set_acknowledged(true);
        let request = controller.begin_analysis(EpisodeId(4)).unwrap();

        let result = controller.complete_analysis(
            request.ticket,
            Err(BackendError::Status {
                status: 502,
                message: "bad gateway".into(),
            }),
        );
        assert!(result.is_err());
        assert_eq!(controller.stage(EpisodeId(4)), WorkflowStage::Idle);
        assert!(controller.selection(EpisodeId(4)).is_none());
    }

    #[test]
    fn single_conflict_gates_publish_until_resolved() {
        let (mut controller, _) = controller();
        reviewing(&mut controller, 7, conflict_diff());
        let id = EpisodeId(7);

        assert_eq!(controller.unresolved_count(id).unwrap(), 1);
        assert_eq!(controller.stage(id), WorkflowStage::Conflicted);
        controller.set_publish_acknowledged(id, true).unwrap();
        assert!(matches!(
            controller.begin_publish(id),
            Err(WorkflowError::StateConflict { .. })
        ));

        assert!(controller.toggle_resolved(id, &ItemId::new("c1")).unwrap());
        assert_eq!(controller.unresolved_count(id).unwrap(), 0);
        assert_eq!(controller.stage(id), WorkflowStage::Clear);
        assert_eq!(controller.gate(id).unwrap(), GateState::Clear { acknowledged: true });
    }

    #[test]
    fn clear_gate_still_needs_acknowledgement() {
        let (mut controller, _) = controller();
        reviewing(&mut controller, 7, SettingsDiff::default());
        let err = controller.begin_publish(EpisodeId(7)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(controller.stage(EpisodeId(7)), WorkflowStage::Clear);
    }

    #[test]
    fn toggling_unknown_conflict_fails() {
        let (mut controller, _) = controller();
        reviewing(&mut controller, 7, conflict_diff());
        let err = controller
            .toggle_resolved(EpisodeId(7), &ItemId::new("m1"))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Review(LorebookError::NotFound { .. })));
    }

    #[test]
    fn deleting_the_last_conflict_clears_the_gate() {
        let (mut controller, sink) = controller();
        reviewing(&mut controller, 7, conflict_diff());
        let id = EpisodeId(7);
        controller
            .request_delete(id, DiffBucket::Conflicts, &ItemId::new("c1"))
            .unwrap();
        controller.confirm_delete(id).unwrap();

        assert_eq!(controller.unresolved_count(id).unwrap(), 0);
        assert_eq!(controller.stage(id), WorkflowStage::Clear);
        assert!(sink.event_types().contains(&"item_deleted".to_string()));
    }

    #[test]
    fn empty_merge_description_is_rejected() {
        let (mut controller, _) = controller();
        reviewing(&mut controller, 7, conflict_diff());
        let id = EpisodeId(7);
        let m1 = ItemId::new("m1");
        if let Draft::Merge { new, .. } = controller.start_edit(id, DiffBucket::Merges, &m1).unwrap() {
            new.clear();
        }
        let err = controller.save_edit(id, DiffBucket::Merges, &m1).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Validation(ValidationError::EmptyField { field: "description" })
        ));
        assert_eq!(controller.diff(id).unwrap().merge(&m1).unwrap().new, "수도, 성벽");
        assert!(controller.draft_mut(id).is_some());
    }

    #[test]
    fn reopening_the_same_revision_keeps_the_ledger() {
        let (mut controller, _) = controller();
        reviewing(&mut controller, 7, conflict_diff());
        let id = EpisodeId(7);
        controller.toggle_resolved(id, &ItemId::new("c1")).unwrap();

        let session_id = controller.review(id).unwrap().session_id;
        let reopened = controller.open_review(id).unwrap();
        assert_eq!(reopened.session_id, session_id);
        assert!(reopened.ledger().is_resolved(&ItemId::new("c1")));
    }

    #[test]
    fn new_diff_resets_the_ledger() {
        let (mut controller, _) = controller();
        reviewing(&mut controller, 7, conflict_diff());
        let id = EpisodeId(7);
        controller.toggle_resolved(id, &ItemId::new("c1")).unwrap();
        assert!(controller.abort(id));

        reviewing(&mut controller, 7, conflict_diff());
        assert_eq!(controller.unresolved_count(id).unwrap(), 1);
        assert_eq!(controller.stage(id), WorkflowStage::Conflicted);
    }

    #[test]
    fn reviews_of_different_episodes_keep_their_own_ledgers() {
        let (mut controller, _) = controller();
        reviewing(&mut controller, 7, conflict_diff());
        controller.toggle_resolved(EpisodeId(7), &ItemId::new("c1")).unwrap();
        reviewing(&mut controller, 8, conflict_diff());

        assert_eq!(controller.stage(EpisodeId(7)), WorkflowStage::Clear);
        assert_eq!(controller.stage(EpisodeId(8)), WorkflowStage::Conflicted);
        let reopened = controller.open_review(EpisodeId(7)).unwrap();
        assert!(reopened.ledger().is_resolved(&ItemId::new("c1")));
        assert_eq!(controller.unresolved_count(EpisodeId(8)).unwrap(), 1);
    }

    #[test]
    fn failed_publish_returns_to_clear_after_another_review_opens() {
        let (mut controller, sink) = controller();
        let mut store = EpisodeStore::new(&HistoryConfig::default());
        reviewing(&mut controller, 7, conflict_diff());
        let a = EpisodeId(7);
        controller.toggle_resolved(a, &ItemId::new("c1")).unwrap();
        controller.set_publish_acknowledged(a, true).unwrap();
        let request = controller.begin_publish(a).unwrap();

        reviewing(&mut controller, 8, conflict_diff());
        assert_eq!(controller.stage(a), WorkflowStage::Publishing);

        let err = controller
            .complete_publish(request.ticket, Err(BackendError::Transport("reset".into())), &mut store)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(controller.stage(a), WorkflowStage::Clear);
        assert_eq!(controller.gate(a).unwrap(), GateState::Clear { acknowledged: true });
        assert_eq!(controller.stage(EpisodeId(8)), WorkflowStage::Conflicted);

        let last_stage = sink
            .drain()
            .into_iter()
            .filter_map(|event| match event {
                WorkflowEvent::StageChanged {
                    episode_id,
                    to_stage,
                    ..
                } if episode_id == a => Some(to_stage),
                _ => None,
            })
            .last();
        assert_eq!(last_stage.as_deref(), Some("clear"));

        let retry = controller.begin_publish(a).unwrap();
        assert_eq!(retry.diff, conflict_diff());
    }

    #[test]
    fn publishing_one_episode_leaves_another_review_open() {
        let (mut controller, _) = controller();
        let mut store = EpisodeStore::new(&HistoryConfig::default());
        reviewing(&mut controller, 7, SettingsDiff::default());
        reviewing(&mut controller, 8, conflict_diff());
        controller.toggle_resolved(EpisodeId(8), &ItemId::new("c1")).unwrap();

        controller.set_publish_acknowledged(EpisodeId(7), true).unwrap();
        let request = controller.begin_publish(EpisodeId(7)).unwrap();
        controller
            .complete_publish(request.ticket, Ok(()), &mut store)
            .unwrap();

        assert_eq!(controller.stage(EpisodeId(7)), WorkflowStage::Published);
        assert!(controller.review(EpisodeId(7)).is_none());
        assert_eq!(controller.stage(EpisodeId(8)), WorkflowStage::Clear);
        assert!(controller.review(EpisodeId(8)).unwrap().ledger().is_resolved(&ItemId::new("c1")));
    }

    #[test]
    fn analysis_response_after_abort_is_discarded() {
        let (mut controller, sink) = controller();
        let ticket = controller.begin_extraction(&episode(6), false).unwrap();
        controller.complete_extraction(ticket, Ok(keywords())).unwrap();
        controller.selection_mut(EpisodeId(6)).unwrap().set_acknowledged(true);
        let request = controller.begin_analysis(EpisodeId(6)).unwrap();
        assert!(controller.abort(EpisodeId(6)));

        let outcome = controller
            .complete_analysis(request.ticket, Ok(conflict_diff()))
            .unwrap();
        assert_eq!(outcome, Completion::Discarded);
        assert_eq!(controller.stage(EpisodeId(6)), WorkflowStage::Idle);
        assert!(controller.diff(EpisodeId(6)).is_none());
        assert!(controller.review(EpisodeId(6)).is_none());
        assert!(sink.event_types().contains(&"completion_discarded".to_string()));
    }

    #[test]
    fn publish_request_carries_the_edited_diff() {
        let (mut controller, _) = controller();
        reviewing(&mut controller, 7, conflict_diff());
        let id = EpisodeId(7);
        let m1 = ItemId::new("m1");
        if let Draft::Merge { new, .. } = controller.start_edit(id, DiffBucket::Merges, &m1).unwrap() {
            *new = "수도, 성벽과 해자".into();
        }
        controller.save_edit(id, DiffBucket::Merges, &m1).unwrap();
        controller
            .request_delete(id, DiffBucket::Conflicts, &ItemId::new("c1"))
            .unwrap();
        controller.confirm_delete(id).unwrap();
        controller.set_publish_acknowledged(id, true).unwrap();

        let request = controller.begin_publish(id).unwrap();
        assert!(request.diff.conflicts.is_empty());
        assert_eq!(request.diff.merge(&m1).unwrap().new, "수도, 성벽과 해자");
        assert_eq!(request.fingerprint, request.diff.fingerprint().unwrap());
    }

    #[test]
    fn completion_after_abort_is_discarded() {
        let (mut controller, sink) = controller();
        let ticket = controller.begin_extraction(&episode(9), false).unwrap();
        assert!(controller.abort(EpisodeId(9)));

        let outcome = controller.complete_extraction(ticket, Ok(keywords())).unwrap();
        assert_eq!(outcome, Completion::Discarded);
        assert_eq!(controller.status(EpisodeId(9)), None);
        assert!(sink.event_types().contains(&"completion_discarded".to_string()));
    }

    #[test]
    fn superseded_extraction_is_discarded() {
        let (mut controller, _) = controller();
        let first = controller.begin_extraction(&episode(9), false).unwrap();
        controller.abort(EpisodeId(9));
        let second = controller.begin_extraction(&episode(9), false).unwrap();

        let stale = controller.complete_extraction(first, Err(BackendError::Transport("late".into())));
        assert_eq!(stale.unwrap(), Completion::Discarded);
        assert_eq!(controller.status(EpisodeId(9)), Some(ProcessingStatus::Extracting));

        controller.complete_extraction(second, Ok(keywords())).unwrap();
        assert_eq!(controller.status(EpisodeId(9)), Some(ProcessingStatus::KeywordsReady));
    }

    #[test]
    fn episodes_do_not_interfere() {
        let (mut controller, _) = controller();
        let a = controller.begin_extraction(&episode(1), false).unwrap();
        let b = controller.begin_extraction(&episode(2), false).unwrap();
        controller
            .complete_extraction(b, Err(BackendError::Transport("down".into())))
            .unwrap_err();
        controller.complete_extraction(a, Ok(keywords())).unwrap();

        assert_eq!(controller.status(EpisodeId(1)), Some(ProcessingStatus::KeywordsReady));
        assert_eq!(controller.status(EpisodeId(2)), None);
    }

    #[test]
    fn publish_in_flight_blocks_a_second_publish_and_edits() {
        let (mut controller, _) = controller();
        reviewing(&mut controller, 7, SettingsDiff::default());
        let id = EpisodeId(7);
        controller.set_publish_acknowledged(id, true).unwrap();
        controller.begin_publish(id).unwrap();

        assert_eq!(controller.stage(id), WorkflowStage::Publishing);
        assert!(controller.begin_publish(id).unwrap_err().is_in_progress());
        assert!(matches!(
            controller.set_publish_acknowledged(id, false),
            Err(WorkflowError::StateConflict { .. })
        ));
    }

    #[test]
    fn publish_success_tears_down_and_marks_read_only() {
        let (mut controller, sink) = controller();
        let mut store = EpisodeStore::new(&HistoryConfig::default());
        store.load(episode(7));
        reviewing(&mut controller, 7, SettingsDiff::default());
        let id = EpisodeId(7);
        controller.set_publish_acknowledged(id, true).unwrap();
        let request = controller.begin_publish(id).unwrap();

        let outcome = controller
            .complete_publish(request.ticket, Ok(()), &mut store)
            .unwrap();
        assert_eq!(outcome, Completion::Applied);
        assert_eq!(controller.stage(id), WorkflowStage::Published);
        assert!(controller.diff(id).is_none());
        assert!(controller.review(id).is_none());
        assert!(store.is_read_only());
        assert!(store.has_unconfirmed_publish());
        assert!(sink.event_types().contains(&"published".to_string()));

        let err = controller.begin_extraction(&episode(7), false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn stage_changes_are_evented() {
        let (mut controller, sink) = controller();
        let ticket = controller.begin_extraction(&episode(1), false).unwrap();
        controller.complete_extraction(ticket, Ok(keywords())).unwrap();

        let stages: Vec<String> = sink
            .drain()
            .into_iter()
            .filter_map(|event| match event {
                WorkflowEvent::StageChanged { to_stage, .. } => Some(to_stage),
                _ => None,
            })
            .collect();
        assert_eq!(stages, vec!["extracting", "keywords_ready"]);
    }
}
