// diff.rs — SettingsDiff: the backend's proposal for updating the lorebook.
//
// The analysis backend partitions what it inferred from an episode into three
// buckets:
//   conflicts   — an existing entry's description contradicts the new facts
//   merges      — a non-conflicting update to an existing entry (설정 결합)
//   new entries — entities not yet in the lorebook (신규 업로드)
// Item ids are unique within a bucket; buckets are independent.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

use crate::category::Category;
use crate::error::LorebookError;

/// Identifier of a diff item. The backend sends either numbers or strings;
/// both are normalised to a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for ItemId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(i64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => ItemId(s),
            RawId::Number(n) => ItemId(n.to_string()),
        })
    }
}

/// The three buckets of a settings diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffBucket {
    Conflicts,
    Merges,
    NewEntries,
}

impl fmt::Display for DiffBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffBucket::Conflicts => write!(f, "conflicts"),
            DiffBucket::Merges => write!(f, "merges"),
            DiffBucket::NewEntries => write!(f, "new_entries"),
        }
    }
}

/// An existing entity whose recorded facts contradict the new inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictItem {
    pub id: ItemId,
    pub name: String,
    pub category: Category,
    /// Why the backend considers the two descriptions incompatible.
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub original: String,
    #[serde(default)]
    pub new: String,
}

/// A non-conflicting update to an existing entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeItem {
    pub id: ItemId,
    pub name: String,
    pub category: Category,
    /// The lorebook's current description. Shown for comparison only.
    #[serde(default)]
    pub original: String,
    /// The description after the merge. Editable during review.
    #[serde(default)]
    pub new: String,
}

/// An entity that is not yet part of the lorebook.
///
/// Category-specific attributes (age, affiliation, …) travel in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEntryItem {
    pub id: ItemId,
    pub name: String,
    pub category: Category,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

/// Item counts per bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffCounts {
    pub conflicts: usize,
    pub merges: usize,
    pub new_entries: usize,
}

/// The backend's three-way partition of proposed lorebook changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsDiff {
    #[serde(default)]
    pub conflicts: Vec<ConflictItem>,
    #[serde(default)]
    pub merges: Vec<MergeItem>,
    #[serde(default, rename = "newEntries", alias = "new_entries")]
    pub new_entries: Vec<NewEntryItem>,
}

impl SettingsDiff {
    pub fn conflict(&self, id: &ItemId) -> Option<&ConflictItem> {
        self.conflicts.iter().find(|c| &c.id == id)
    }

    pub fn merge(&self, id: &ItemId) -> Option<&MergeItem> {
        self.merges.iter().find(|m| &m.id == id)
    }

    pub fn new_entry(&self, id: &ItemId) -> Option<&NewEntryItem> {
        self.new_entries.iter().find(|n| &n.id == id)
    }

    pub fn contains(&self, bucket: DiffBucket, id: &ItemId) -> bool {
        match bucket {
            DiffBucket::Conflicts => self.conflict(id).is_some(),
            DiffBucket::Merges => self.merge(id).is_some(),
            DiffBucket::NewEntries => self.new_entry(id).is_some(),
        }
    }

    pub fn conflict_ids(&self) -> impl Iterator<Item = &ItemId> + '_ {
        self.conflicts.iter().map(|c| &c.id)
    }

    /// Replace the proposed description of a merge item.
    pub fn set_merge_text(&mut self, id: &ItemId, new_text: String) -> Result<(), LorebookError> {
        let item = self
            .merges
            .iter_mut()
            .find(|m| &m.id == id)
            .ok_or_else(|| LorebookError::not_found(DiffBucket::Merges, id))?;
        item.new = new_text;
        Ok(())
    }

    /// Replace a new-entry item in place, keeping its position and id.
    pub fn replace_new_entry(&mut self, entry: NewEntryItem) -> Result<(), LorebookError> {
        let slot = self
            .new_entries
            .iter_mut()
            .find(|n| n.id == entry.id)
            .ok_or_else(|| LorebookError::not_found(DiffBucket::NewEntries, &entry.id))?;
        *slot = entry;
        Ok(())
    }

    /// Remove an item from its bucket. Returns whether anything was removed.
    pub fn remove(&mut self, bucket: DiffBucket, id: &ItemId) -> bool {
        let before = self.bucket_len(bucket);
        match bucket {
            DiffBucket::Conflicts => self.conflicts.retain(|c| &c.id != id),
            DiffBucket::Merges => self.merges.retain(|m| &m.id != id),
            DiffBucket::NewEntries => self.new_entries.retain(|n| &n.id != id),
        }
        self.bucket_len(bucket) != before
    }

    fn bucket_len(&self, bucket: DiffBucket) -> usize {
        match bucket {
            DiffBucket::Conflicts => self.conflicts.len(),
            DiffBucket::Merges => self.merges.len(),
            DiffBucket::NewEntries => self.new_entries.len(),
        }
    }

    pub fn counts(&self) -> DiffCounts {
        DiffCounts {
            conflicts: self.conflicts.len(),
            merges: self.merges.len(),
            new_entries: self.new_entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty() && self.merges.is_empty() && self.new_entries.is_empty()
    }

    /// SHA-256 of the diff's JSON form, hex encoded.
    ///
    /// Identifies exactly which version of a reviewed diff was published.
    pub fn fingerprint(&self) -> Result<String, LorebookError> {
        let bytes = serde_json::to_vec(self)?;
        Ok(format!("{:x}", Sha256::digest(&bytes)))
    }
}
