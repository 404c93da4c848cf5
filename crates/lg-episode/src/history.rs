// history.rs — Linear, bounded undo/redo history of content snapshots.
//
// The history is a sequence of full snapshots plus a cursor pointing at the
// snapshot that matches the buffer. Recording after an undo truncates the
// redo tail before appending. When the bound is exceeded the oldest snapshot
// is dropped.

use serde::{Deserialize, Serialize};

/// Tuning for the edit history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Quiet period after the last keystroke before a snapshot is recorded.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Maximum number of snapshots kept (including the initial one).
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            max_entries: default_max_entries(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_max_entries() -> usize {
    100
}

/// What the store is doing with the buffer right now.
///
/// While an undo or redo is being applied, the buffer change it produces
/// is echoed back by the editor as an ordinary edit; the recorder state
/// lets the store recognise that echo and keep it out of the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Recorder {
    #[default]
    Idle,
    ApplyingUndo,
    ApplyingRedo,
}

/// Snapshot history with a cursor.
#[derive(Debug, Clone)]
pub struct EditHistory {
    entries: Vec<String>,
    cursor: usize,
    max_entries: usize,
}

impl EditHistory {
    pub fn new(initial: impl Into<String>, max_entries: usize) -> Self {
        Self {
            entries: vec![initial.into()],
            cursor: 0,
            max_entries: max_entries.max(1),
        }
    }

    /// Drop everything and start over from a single snapshot.
    pub fn reset(&mut self, initial: impl Into<String>) {
        self.entries.clear();
        self.entries.push(initial.into());
        self.cursor = 0;
    }

    /// Append a snapshot after the cursor. Returns false when the snapshot
    /// equals the current one (nothing to record).
    pub fn record(&mut self, snapshot: &str) -> bool {
        if self.current() == snapshot {
            return false;
        }
        self.entries.truncate(self.cursor + 1);
        self.entries.push(snapshot.to_string());
        if self.entries.len() > self.max_entries {
            let overflow = self.entries.len() - self.max_entries;
            self.entries.drain(..overflow);
        }
        self.cursor = self.entries.len() - 1;
        true
    }

    /// Step back one snapshot.
    pub fn undo(&mut self) -> Option<&str> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        Some(&self.entries[self.cursor])
    }

    /// Step forward one snapshot.
    pub fn redo(&mut self) -> Option<&str> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        Some(&self.entries[self.cursor])
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    pub fn current(&self) -> &str {
        &self.entries[self.cursor]
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
