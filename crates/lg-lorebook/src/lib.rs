//! # lg-lorebook
//!
//! The lorebook (설정집) side of the publish workflow: what the analysis
//! backend proposes and what the human reviewer decides about it.
//!
//! A [`KeywordSet`] holds extracted keyword candidates per [`Category`]; the
//! reviewer narrows it with a [`SelectionSet`]. The backend answers with a
//! [`SettingsDiff`] of conflicts, merges and new entries. Conflicts must be
//! acknowledged in the [`ConflictLedger`]; merges and new entries can be
//! adjusted through the [`ReviewEditor`] before publishing.

pub mod category;
pub mod diff;
pub mod error;
pub mod keywords;
pub mod ledger;
pub mod review;
pub mod selection;

pub use category::Category;
pub use diff::{ConflictItem, DiffBucket, DiffCounts, ItemId, MergeItem, NewEntryItem, SettingsDiff};
pub use error::LorebookError;
pub use keywords::KeywordSet;
pub use ledger::ConflictLedger;
pub use review::{Draft, ReviewEditor};
pub use selection::{SelectionSet, SelectionState};
