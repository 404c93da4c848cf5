// keywords.rs — Extracted keyword candidates, bucketed by category.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::category::Category;

/// Keyword candidates per category, in the order the backend returned them.
///
/// A category absent from the map behaves like an empty list. The set is
/// produced once per extraction and not mutated afterwards. Deserializing
/// goes through [`KeywordSet::insert`], so repeated keywords in a payload
/// collapse to one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<Category, Vec<String>>",
    into = "BTreeMap<Category, Vec<String>>"
)]
pub struct KeywordSet {
    buckets: BTreeMap<Category, Vec<String>>,
}

impl KeywordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from `(category, keywords)` pairs. Duplicate keywords
    /// within a category are dropped, keeping the first occurrence.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (Category, Vec<K>)>,
        K: Into<String>,
    {
        let mut set = Self::new();
        for (category, keywords) in pairs {
            set.insert(category, keywords);
        }
        set
    }

    /// Replace the candidates of one category.
    pub fn insert<K: Into<String>>(&mut self, category: Category, keywords: Vec<K>) {
        let mut list: Vec<String> = Vec::with_capacity(keywords.len());
        for keyword in keywords {
            let keyword = keyword.into();
            if !list.contains(&keyword) {
                list.push(keyword);
            }
        }
        self.buckets.insert(category, list);
    }

    pub fn get(&self, category: Category) -> &[String] {
        self.buckets
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn contains(&self, category: Category, keyword: &str) -> bool {
        self.get(category).iter().any(|k| k == keyword)
    }

    /// Categories present in the set, in display order.
    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.buckets.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, &[String])> + '_ {
        self.buckets.iter().map(|(c, k)| (*c, k.as_slice()))
    }

    /// Total number of keywords across categories.
    pub fn total(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// True when no category holds any keyword.
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl From<BTreeMap<Category, Vec<String>>> for KeywordSet {
    fn from(buckets: BTreeMap<Category, Vec<String>>) -> Self {
        Self::from_pairs(buckets)
    }
}

impl From<KeywordSet> for BTreeMap<Category, Vec<String>> {
    fn from(set: KeywordSet) -> Self {
        set.buckets
    }
}
