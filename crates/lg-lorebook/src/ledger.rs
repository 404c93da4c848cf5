// ledger.rs — ConflictLedger: which conflicts a human has acknowledged.
//
// The unresolved count is the single quantity gating publish. It is measured
// against the diff's current conflict bucket, so a conflict that was deleted
// from the diff no longer counts, resolved or not.

use std::collections::BTreeSet;

use crate::diff::{ConflictItem, ItemId, SettingsDiff};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictLedger {
    resolved: BTreeSet<ItemId>,
}

impl ConflictLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the resolved mark of a conflict. Returns the new state.
    pub fn toggle_resolved(&mut self, conflict_id: &ItemId) -> bool {
        if self.resolved.remove(conflict_id) {
            false
        } else {
            self.resolved.insert(conflict_id.clone());
            true
        }
    }

    pub fn is_resolved(&self, conflict_id: &ItemId) -> bool {
        self.resolved.contains(conflict_id)
    }

    /// Number of conflicts in `diff` not yet marked resolved.
    pub fn unresolved_count(&self, diff: &SettingsDiff) -> usize {
        self.unresolved(diff).count()
    }

    pub fn unresolved<'a>(
        &'a self,
        diff: &'a SettingsDiff,
    ) -> impl Iterator<Item = &'a ConflictItem> + 'a {
        diff.conflicts
            .iter()
            .filter(move |c| !self.resolved.contains(&c.id))
    }

    /// Forget a single id (its conflict was deleted from the diff).
    pub fn forget(&mut self, conflict_id: &ItemId) {
        self.resolved.remove(conflict_id);
    }

    /// Empty the ledger. Called whenever a new diff is loaded.
    pub fn reset(&mut self) {
        self.resolved.clear();
    }

    pub fn resolved_len(&self) -> usize {
        self.resolved.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Category;
    use crate::diff::DiffBucket;

    fn conflict(id: &str) -> ConflictItem {
        ConflictItem {
            id: ItemId::new(id),
            name: format!("entity {id}"),
            category: Category::Person,
            reason: "contradiction".into(),
            original: "before".into(),
            new: "after".into(),
        }
    }

    fn diff_with_conflicts(ids: &[&str]) -> SettingsDiff {
        SettingsDiff {
            conflicts: ids.iter().map(|id| conflict(id)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn single_conflict_starts_unresolved() {
        let diff = diff_with_conflicts(&["c1"]);
        let mut ledger = ConflictLedger::new();
        assert_eq!(ledger.unresolved_count(&diff), 1);

        assert!(ledger.toggle_resolved(&ItemId::new("c1")));
        assert_eq!(ledger.unresolved_count(&diff), 0);
    }

    #[test]
    fn toggle_twice_unresolves() {
        let diff = diff_with_conflicts(&["c1"]);
        let mut ledger = ConflictLedger::new();
        ledger.toggle_resolved(&ItemId::new("c1"));
        assert!(!ledger.toggle_resolved(&ItemId::new("c1")));
        assert_eq!(ledger.unresolved_count(&diff), 1);
    }

    #[test]
    fn deleted_conflict_leaves_the_denominator() {
        let mut diff = diff_with_conflicts(&["c1", "c2"]);
        let mut ledger = ConflictLedger::new();
        ledger.toggle_resolved(&ItemId::new("c1"));
        assert_eq!(ledger.unresolved_count(&diff), 1);

        diff.remove(DiffBucket::Conflicts, &ItemId::new("c2"));
        assert_eq!(ledger.unresolved_count(&diff), 0);
    }

    #[test]
    fn resolutions_for_unknown_ids_do_not_count() {
        let diff = diff_with_conflicts(&["c1"]);
        let mut ledger = ConflictLedger::new();
        ledger.toggle_resolved(&ItemId::new("stale"));
        assert_eq!(ledger.unresolved_count(&diff), 1);
    }

    #[test]
    fn reset_clears_everything() {
        let mut ledger = ConflictLedger::new();
        ledger.toggle_resolved(&ItemId::new("c1"));
        ledger.reset();
        assert_eq!(ledger.resolved_len(), 0);
    }
}
