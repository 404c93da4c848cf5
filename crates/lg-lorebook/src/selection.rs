// selection.rs — SelectionSet: which extracted keywords go to analysis.
//
// A selection is always derived from one KeywordSet and only ever holds
// keywords that set contains. It starts fully selected. Submission needs a
// separate acknowledgement from the reviewer ("proceed with AI analysis using
// this selection"); the acknowledgement is independent of how many keywords
// are selected, so an acknowledged empty selection is valid.

use std::collections::{BTreeMap, BTreeSet};

use crate::category::Category;
use crate::error::LorebookError;
use crate::keywords::KeywordSet;

/// Tri-state of the "select all" checkbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionState {
    All,
    Some,
    None,
}

#[derive(Debug, Clone)]
pub struct SelectionSet {
    candidates: KeywordSet,
    selected: BTreeMap<Category, BTreeSet<String>>,
    acknowledged: bool,
}

impl SelectionSet {
    /// Open a selection over `candidates` with everything selected.
    pub fn select_all(candidates: KeywordSet) -> Self {
        let mut selection = Self {
            candidates,
            selected: BTreeMap::new(),
            acknowledged: false,
        };
        selection.toggle_all(true);
        selection
    }

    pub fn candidates(&self) -> &KeywordSet {
        &self.candidates
    }

    /// Flip one keyword. Keywords outside the candidate list are ignored.
    pub fn toggle_keyword(&mut self, category: Category, keyword: &str) {
        if !self.candidates.contains(category, keyword) {
            tracing::debug!(%category, keyword, "ignoring toggle of unknown keyword");
            return;
        }
        let set = self.selected.entry(category).or_default();
        if !set.remove(keyword) {
            set.insert(keyword.to_string());
        }
    }

    /// Select every candidate of a category, or none of them.
    pub fn toggle_category(&mut self, category: Category, select_all: bool) {
        let set = self.selected.entry(category).or_default();
        set.clear();
        if select_all {
            set.extend(self.candidates.get(category).iter().cloned());
        }
    }

    /// Apply [`toggle_category`](Self::toggle_category) to every category.
    pub fn toggle_all(&mut self, select_all: bool) {
        let categories: Vec<Category> = self.candidates.categories().collect();
        for category in categories {
            self.toggle_category(category, select_all);
        }
    }

    pub fn is_selected(&self, category: Category, keyword: &str) -> bool {
        self.selected
            .get(&category)
            .is_some_and(|set| set.contains(keyword))
    }

    pub fn selected_count(&self, category: Category) -> usize {
        self.selected.get(&category).map_or(0, BTreeSet::len)
    }

    pub fn total_selected(&self) -> usize {
        self.selected.values().map(BTreeSet::len).sum()
    }

    /// True iff every category's selection covers its whole candidate list.
    pub fn is_fully_selected(&self) -> bool {
        self.candidates
            .iter()
            .all(|(category, keywords)| self.selected_count(category) == keywords.len())
    }

    pub fn selection_state(&self) -> SelectionState {
        if self.is_fully_selected() {
            SelectionState::All
        } else if self.total_selected() == 0 {
            SelectionState::None
        } else {
            SelectionState::Some
        }
    }

    /// Record the reviewer's "proceed with analysis" acknowledgement.
    pub fn set_acknowledged(&mut self, acknowledged: bool) {
        self.acknowledged = acknowledged;
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged
    }

    /// The selection as a keyword set, candidate order preserved.
    ///
    /// Every category of the candidate set is present, possibly empty.
    pub fn selection(&self) -> KeywordSet {
        KeywordSet::from_pairs(self.candidates.iter().map(|(category, keywords)| {
            let chosen: Vec<String> = keywords
                .iter()
                .filter(|k| self.is_selected(category, k))
                .cloned()
                .collect();
            (category, chosen)
        }))
    }

    /// The selection to send for analysis, if the reviewer acknowledged it.
    pub fn submission(&self) -> Result<KeywordSet, LorebookError> {
        if !self.acknowledged {
            return Err(LorebookError::ConfirmationRequired(
                "acknowledge the keyword selection before starting analysis",
            ));
        }
        Ok(self.selection())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice_bob() -> KeywordSet {
        KeywordSet::from_pairs([
            (Category::Person, vec!["Alice", "Bob"]),
            (Category::Place, vec![]),
        ])
    }

    #[test]
    fn default_selection_is_everything() {
        let selection = SelectionSet::select_all(alice_bob());
        assert_eq!(selection.selection(), alice_bob());
        assert!(selection.is_fully_selected());
        assert_eq!(selection.selection_state(), SelectionState::All);
    }

    #[test]
    fn toggling_bob_off_keeps_alice_and_empty_place() {
        let mut selection = SelectionSet::select_all(alice_bob());
        selection.toggle_keyword(Category::Person, "Bob");

        let expected = KeywordSet::from_pairs([
            (Category::Person, vec!["Alice"]),
            (Category::Place, vec![]),
        ]);
        assert_eq!(selection.selection(), expected);
        assert_eq!(selection.selection_state(), SelectionState::Some);
    }

    #[test]
    fn submission_without_acknowledgement_is_rejected() {
        let selection = SelectionSet::select_all(alice_bob());
        assert!(matches!(
            selection.submission(),
            Err(LorebookError::ConfirmationRequired(_))
        ));
    }

    #[test]
    fn acknowledged_empty_selection_is_allowed() {
        let mut selection = SelectionSet::select_all(alice_bob());
        selection.toggle_all(false);
        selection.set_acknowledged(true);
        let submitted = selection.submission().unwrap();
        assert!(submitted.is_empty());
    }

    #[test]
    fn toggle_all_round_trip_drives_full_selection() {
        let mut selection = SelectionSet::select_all(alice_bob());
        selection.toggle_all(false);
        assert!(!selection.is_fully_selected());
        assert_eq!(selection.selection_state(), SelectionState::None);
        selection.toggle_all(true);
        assert!(selection.is_fully_selected());
    }

    #[test]
    fn repeated_backend_keyword_is_still_fully_selected() {
        let candidates: KeywordSet = serde_json::from_str(r#"{"인물":["Alice","Alice"]}"#).unwrap();
        let mut selection = SelectionSet::select_all(candidates);
        assert!(selection.is_fully_selected());
        selection.toggle_all(false);
        selection.toggle_all(true);
        assert!(selection.is_fully_selected());
        assert_eq!(selection.total_selected(), 1);
    }

    #[test]
    fn all_empty_categories_count_as_fully_selected() {
        let mut selection =
            SelectionSet::select_all(KeywordSet::from_pairs([(Category::Event, Vec::<String>::new())]));
        selection.toggle_all(false);
        assert!(selection.is_fully_selected());
    }

    #[test]
    fn unknown_keyword_toggle_is_ignored() {
        let mut selection = SelectionSet::select_all(alice_bob());
        selection.toggle_keyword(Category::Person, "Mallory");
        selection.toggle_keyword(Category::World, "Alice");
        assert!(!selection.is_selected(Category::Person, "Mallory"));
        assert_eq!(selection.total_selected(), 2);
    }

    #[test]
    fn toggle_category_only_touches_that_category() {
        let mut selection = SelectionSet::select_all(KeywordSet::from_pairs([
            (Category::Person, vec!["Alice"]),
            (Category::Item, vec!["검"]),
        ]));
        selection.toggle_category(Category::Person, false);
        assert_eq!(selection.selected_count(Category::Person), 0);
        assert!(selection.is_selected(Category::Item, "검"));
        selection.toggle_category(Category::Person, true);
        assert!(selection.is_fully_selected());
    }
}
