// review.rs — ReviewEditor: ad hoc edits and deletions before publish.
//
// At most one item is being edited at a time. Starting an edit seeds a draft:
// merge items from their proposed (`new`) description, new entries from the
// whole item. The draft only reaches the diff on `save_edit`; `cancel_edit`
// drops it. The write-back targets the item `start_edit` opened, whatever
// the draft's own id field says by then. Conflict items are never editable; they can only be resolved in
// the ledger or deleted.
//
// Deletion is two-step: `request_delete` names the item, `confirm_delete`
// removes it. A deleted conflict is also dropped from the ledger.

use crate::diff::{DiffBucket, ItemId, NewEntryItem, SettingsDiff};
use crate::error::LorebookError;
use crate::ledger::ConflictLedger;

/// Editable copy of a diff item.
#[derive(Debug, Clone, PartialEq)]
pub enum Draft {
    Merge { id: ItemId, new: String },
    NewEntry(NewEntryItem),
}

impl Draft {
    pub fn bucket(&self) -> DiffBucket {
        match self {
            Draft::Merge { .. } => DiffBucket::Merges,
            Draft::NewEntry(_) => DiffBucket::NewEntries,
        }
    }

    pub fn id(&self) -> &ItemId {
        match self {
            Draft::Merge { id, .. } => id,
            Draft::NewEntry(item) => &item.id,
        }
    }

}

#[derive(Debug, Clone)]
struct OpenDraft {
    bucket: DiffBucket,
    id: ItemId,
    draft: Draft,
}

impl OpenDraft {
    fn targets(&self, bucket: DiffBucket, id: &ItemId) -> bool {
        self.bucket == bucket && &self.id == id
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReviewEditor {
    draft: Option<OpenDraft>,
    pending_delete: Option<(DiffBucket, ItemId)>,
}

impl ReviewEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an item for editing, replacing any open draft.
    pub fn start_edit(
        &mut self,
        diff: &SettingsDiff,
        bucket: DiffBucket,
        id: &ItemId,
    ) -> Result<&mut Draft, LorebookError> {
        let draft = match bucket {
            DiffBucket::Conflicts => {
                return Err(LorebookError::NotEditable {
                    bucket,
                    id: id.clone(),
                })
            }
            DiffBucket::Merges => {
                let item = diff
                    .merge(id)
                    .ok_or_else(|| LorebookError::not_found(bucket, id))?;
                Draft::Merge {
                    id: item.id.clone(),
                    new: item.new.clone(),
                }
            }
            DiffBucket::NewEntries => {
                let item = diff
                    .new_entry(id)
                    .ok_or_else(|| LorebookError::not_found(bucket, id))?;
                Draft::NewEntry(item.clone())
            }
        };
        let open = self.draft.insert(OpenDraft {
            bucket,
            id: id.clone(),
            draft,
        });
        Ok(&mut open.draft)
    }

    pub fn draft(&self) -> Option<&Draft> {
        self.draft.as_ref().map(|open| &open.draft)
    }

    pub fn draft_mut(&mut self) -> Option<&mut Draft> {
        self.draft.as_mut().map(|open| &mut open.draft)
    }

    /// The item the open draft will be written back to.
    pub fn editing(&self) -> Option<(DiffBucket, &ItemId)> {
        self.draft.as_ref().map(|open| (open.bucket, &open.id))
    }

    pub fn is_editing(&self, bucket: DiffBucket, id: &ItemId) -> bool {
        self.draft.as_ref().is_some_and(|d| d.targets(bucket, id))
    }

    /// Write the open draft back into the diff and leave edit mode.
    pub fn save_edit(
        &mut self,
        diff: &mut SettingsDiff,
        bucket: DiffBucket,
        id: &ItemId,
    ) -> Result<(), LorebookError> {
        if bucket == DiffBucket::Conflicts {
            return Err(LorebookError::NotEditable {
                bucket,
                id: id.clone(),
            });
        }
        let open = match self.draft.take() {
            Some(open) if open.targets(bucket, id) => open,
            other => {
                self.draft = other;
                return Err(LorebookError::NoDraft {
                    bucket,
                    id: id.clone(),
                });
            }
        };

        let result = match (open.bucket, open.draft) {
            (DiffBucket::Merges, Draft::Merge { new, .. }) => diff.set_merge_text(&open.id, new),
            (DiffBucket::NewEntries, Draft::NewEntry(mut entry)) => {
                entry.id = open.id;
                diff.replace_new_entry(entry)
            }
            _ => {
                return Err(LorebookError::NoDraft {
                    bucket,
                    id: id.clone(),
                })
            }
        };
        if result.is_err() {
            // Item vanished from the diff; nothing left to edit.
            tracing::warn!(%bucket, %id, "draft target no longer in diff");
        }
        result
    }

    /// Drop the open draft without touching the diff.
    pub fn cancel_edit(&mut self) {
        self.draft = None;
    }

    /// First deletion step: remember which item the reviewer wants gone.
    pub fn request_delete(
        &mut self,
        diff: &SettingsDiff,
        bucket: DiffBucket,
        id: &ItemId,
    ) -> Result<(), LorebookError> {
        if !diff.contains(bucket, id) {
            return Err(LorebookError::not_found(bucket, id));
        }
        self.pending_delete = Some((bucket, id.clone()));
        Ok(())
    }

    pub fn pending_delete(&self) -> Option<(DiffBucket, &ItemId)> {
        self.pending_delete.as_ref().map(|(b, id)| (*b, id))
    }

    pub fn cancel_delete(&mut self) {
        self.pending_delete = None;
    }

    /// Second deletion step: remove the item named by `request_delete`.
    pub fn confirm_delete(
        &mut self,
        diff: &mut SettingsDiff,
        ledger: &mut ConflictLedger,
    ) -> Result<(DiffBucket, ItemId), LorebookError> {
        let (bucket, id) = self
            .pending_delete
            .take()
            .ok_or(LorebookError::NoPendingDelete)?;
        if !diff.remove(bucket, &id) {
            return Err(LorebookError::NotFound { bucket, id });
        }
        if bucket == DiffBucket::Conflicts {
            ledger.forget(&id);
        }
        if self.is_editing(bucket, &id) {
            self.draft = None;
        }
        Ok((bucket, id))
    }

    /// Forget drafts and pending deletions (new diff loaded, review closed).
    pub fn reset(&mut self) {
        self.draft = None;
        self.pending_delete = None;
    }
}
