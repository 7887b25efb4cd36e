use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

pub const MAX_HISTORY_SIZE: usize = 10;

/// Bounded linear undo/redo history of generated image data URLs for one
/// stage. The entry at the cursor is the active asset shown to the user and
/// handed downstream.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<String>,
    index: Option<usize>,
}

impl History {
    /// Appends a new result: the redo branch past the cursor is discarded,
    /// the oldest entry is evicted once the bound is exceeded, and the cursor
    /// moves to the new entry.
    pub fn record(&mut self, entry: String) {
        let keep = self.index.map(|i| i + 1).unwrap_or(0);
        self.entries.truncate(keep);
        self.entries.push(entry);
        if self.entries.len() > MAX_HISTORY_SIZE {
            self.entries.remove(0);
        }
        self.index = Some(self.entries.len() - 1);
    }

    /// Moves the cursor back one entry; no-op at the oldest entry.
    pub fn undo(&mut self) -> bool {
        if self.can_undo() {
            self.index = self.index.map(|i| i - 1);
            true
        } else {
            false
        }
    }

    /// Moves the cursor forward one entry; no-op at the newest entry.
    pub fn redo(&mut self) -> bool {
        if self.can_redo() {
            self.index = self.index.map(|i| i + 1);
            true
        } else {
            false
        }
    }

    pub fn active(&self) -> Option<&str> {
        self.index.map(|i| self.entries[i].as_str())
    }

    pub fn can_undo(&self) -> bool {
        matches!(self.index, Some(i) if i > 0)
    }

    pub fn can_redo(&self) -> bool {
        matches!(self.index, Some(i) if i + 1 < self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index = None;
    }
}

impl Serialize for History {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("History", 4)?;
        state.serialize_field("entries", &self.entries)?;
        state.serialize_field("index", &self.index.map(|i| i as i64).unwrap_or(-1))?;
        state.serialize_field("canUndo", &self.can_undo())?;
        state.serialize_field("canRedo", &self.can_redo())?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(n: usize) -> String {
        format!("data:image/png;base64,{n}")
    }

    #[test]
    fn stays_within_the_bound_and_evicts_oldest_first() {
        let mut history = History::default();
        for n in 0..25 {
            history.record(entry(n));
            assert!(history.len() <= MAX_HISTORY_SIZE);
        }
        assert_eq!(history.len(), MAX_HISTORY_SIZE);
        assert_eq!(history.active(), Some(entry(24).as_str()));
        // 0..=14 were evicted; the oldest survivor is 15.
        for _ in 0..MAX_HISTORY_SIZE {
            history.undo();
        }
        assert_eq!(history.active(), Some(entry(15).as_str()));
    }

    #[test]
    fn cursor_flags_match_position_at_every_step() {
        let mut history = History::default();
        assert!(!history.can_undo());
        assert!(!history.can_redo());
        assert_eq!(history.active(), None);

        for n in 0..4 {
            history.record(entry(n));
            assert!(history.can_undo() == (n > 0));
            assert!(!history.can_redo());
        }
        while history.undo() {
            assert!(history.can_redo());
        }
        assert!(!history.can_undo());
        assert_eq!(history.active(), Some(entry(0).as_str()));
    }

    #[test]
    fn undo_then_redo_restores_the_active_entry() {
        let mut history = History::default();
        history.record(entry(0));
        history.record(entry(1));
        history.record(entry(2));

        let before = history.active().unwrap().to_string();
        assert!(history.undo());
        assert_ne!(history.active().unwrap(), before);
        assert!(history.redo());
        assert_eq!(history.active().unwrap(), before);
    }

    #[test]
    fn boundary_moves_are_no_ops() {
        let mut history = History::default();
        assert!(!history.undo());
        assert!(!history.redo());

        history.record(entry(0));
        assert!(!history.undo());
        assert!(!history.redo());
        assert_eq!(history.active(), Some(entry(0).as_str()));
    }

    #[test]
    fn recording_after_undo_discards_the_redo_branch() {
        let mut history = History::default();
        for n in 0..5 {
            history.record(entry(n));
        }
        history.undo();
        history.undo();
        assert_eq!(history.active(), Some(entry(2).as_str()));

        history.record(entry(99));
        assert_eq!(history.len(), 4);
        assert_eq!(history.active(), Some(entry(99).as_str()));
        assert!(!history.can_redo());
        // The discarded branch (3, 4) is unreachable.
        history.undo();
        assert_eq!(history.active(), Some(entry(2).as_str()));
    }
}
