//! Repeating group index state

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// Pinned by an index column; does not advance with rows
    Format,
    /// Implicit; advances by one on every new row
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub kind: IndexKind,
    pub value: usize,
}

/// Current position of every repeating group path within one record
///
/// Keys are sigil-bearing path prefixes such as `#array` or `#array.#list`.
#[derive(Debug, Clone, Default)]
pub struct IndexState {
    entries: HashMap<String, IndexEntry>,
}

impl IndexState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<IndexEntry> {
        self.entries.get(path).copied()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Advance every implicit index by one row
    pub fn advance_row(&mut self) {
        for entry in self.entries.values_mut() {
            if entry.kind != IndexKind::Format {
                entry.value += 1;
            }
        }
    }

    /// Pin `path` to `value`, restarting nested groups at zero
    ///
    /// Returns false when the path already sits at `value`.
    pub fn pin(&mut self, path: &str, value: usize) -> bool {
        if self.get(path).is_some_and(|e| e.value == value) {
            return false;
        }
        self.entries.insert(
            path.to_string(),
            IndexEntry {
                kind: IndexKind::Format,
                value,
            },
        );
        for (key, entry) in self.entries.iter_mut() {
            if is_descendant(key, path) {
                entry.value = 0;
            }
        }
        true
    }

    /// Position for `path`, starting implicit tracking at the last element
    pub fn resolve(&mut self, path: &str, len: usize) -> usize {
        self.entries
            .entry(path.to_string())
            .or_insert(IndexEntry {
                kind: IndexKind::Normal,
                value: len.saturating_sub(1),
            })
            .value
    }
}

fn is_descendant(key: &str, ancestor: &str) -> bool {
    key.len() > ancestor.len() + 1
        && key.starts_with(ancestor)
        && key.as_bytes()[ancestor.len()] == b'.'
}
