// error.rs — Error types for the lorebook review model.

use thiserror::Error;

use crate::diff::{DiffBucket, ItemId};

/// Errors that can occur while selecting keywords or reviewing a diff.
#[derive(Debug, Error)]
pub enum LorebookError {
    /// No item with this id exists in the bucket.
    #[error("no item {id} in {bucket}")]
    NotFound { bucket: DiffBucket, id: ItemId },

    /// Conflict items can only be resolved or deleted, never edited.
    #[error("item {id} in {bucket} is not editable")]
    NotEditable { bucket: DiffBucket, id: ItemId },

    /// `save_edit` was called without a matching open draft.
    #[error("no open draft for item {id} in {bucket}")]
    NoDraft { bucket: DiffBucket, id: ItemId },

    /// `confirm_delete` was called without a preceding `request_delete`.
    #[error("no deletion is awaiting confirmation")]
    NoPendingDelete,

    /// A required human confirmation was not given.
    #[error("confirmation required: {0}")]
    ConfirmationRequired(&'static str),

    /// Serialization failure (fingerprinting).
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LorebookError {
    pub(crate) fn not_found(bucket: DiffBucket, id: &ItemId) -> Self {
        LorebookError::NotFound {
            bucket,
            id: id.clone(),
        }
    }
}
