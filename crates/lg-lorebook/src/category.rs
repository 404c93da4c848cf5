// category.rs — Lorebook entity categories.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of lorebook entity a keyword or diff item refers to.
///
/// On the wire categories use their Korean labels; the English names are
/// accepted as aliases. Ordering follows the order the dashboard shows them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "인물", alias = "person")]
    Person,
    #[serde(rename = "장소", alias = "place")]
    Place,
    #[serde(rename = "사건", alias = "event")]
    Event,
    #[serde(rename = "집단", alias = "group")]
    Group,
    #[serde(rename = "물건", alias = "item")]
    Item,
    #[serde(rename = "세계", alias = "world")]
    World,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Person,
        Category::Place,
        Category::Event,
        Category::Group,
        Category::Item,
        Category::World,
    ];

    /// Korean label used on the wire and in the dashboard.
    pub fn label(self) -> &'static str {
        match self {
            Category::Person => "인물",
            Category::Place => "장소",
            Category::Event => "사건",
            Category::Group => "집단",
            Category::Item => "물건",
            Category::World => "세계",
        }
    }

    pub fn english_name(self) -> &'static str {
        match self {
            Category::Person => "person",
            Category::Place => "place",
            Category::Event => "event",
            Category::Group => "group",
            Category::Item => "item",
            Category::World => "world",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
