//! Bounded history of dispatched command names

use regex::Regex;
use std::collections::VecDeque;
use std::sync::LazyLock;

static BY_INDEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^!-(\d+)(:p)?$").expect("recall pattern is valid"));

static BY_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^!\?([A-Za-z0-9_.\-/]+)\?$").expect("recall pattern is valid"));

/// Ring buffer; the oldest entry falls off once capacity is reached.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<String>,
    capacity: usize,
}

/// What a recall shortcut expands to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recall {
    /// Run this line in place of the shortcut
    Run(String),
    /// Print without running (`:p`)
    Echo(String),
    /// No entry matches the event
    Missing(String),
}

impl History {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: impl Into<String>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry.into());
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change capacity, keeping the newest entries.
    pub fn resize(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drop the `n` most recent entries.
    pub fn forget_recent(&mut self, n: usize) {
        let keep = self.entries.len().saturating_sub(n);
        self.entries.truncate(keep);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&str> {
        self.entries.back().map(String::as_str)
    }

    /// Oldest first
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// The `n`-th entry counting back from the newest (1 = newest).
    pub fn nth_back(&self, n: usize) -> Option<&str> {
        n.checked_sub(1)
            .and_then(|i| self.entries.iter().rev().nth(i))
            .map(String::as_str)
    }

    /// Expand a recall shortcut; `None` when `line` is not one.
    pub fn recall(&self, line: &str) -> Option<Recall> {
        let line = line.trim();
        let missing = || Recall::Missing(line.to_string());

        if line == "!!" {
            return Some(self.last().map_or_else(missing, |e| Recall::Run(e.to_string())));
        }
        if let Some(caps) = BY_INDEX.captures(line) {
            let entry = caps[1].parse().ok().and_then(|n| self.nth_back(n));
            let print_only = caps.get(2).is_some();
            return Some(entry.map_or_else(missing, |e| {
                if print_only {
                    Recall::Echo(e.to_string())
                } else {
                    Recall::Run(e.to_string())
                }
            }));
        }
        if let Some(caps) = BY_TEXT.captures(line) {
            let needle = &caps[1];
            let entry = self.iter().rev().find(|e| e.contains(needle));
            return Some(entry.map_or_else(missing, |e| Recall::Run(e.to_string())));
        }
        None
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(entries: &[&str]) -> History {
        let mut history = History::new(10);
        for e in entries {
            history.push(*e);
        }
        history
    }

    #[test]
    fn test_ring_drops_oldest() {
        let mut history = History::new(2);
        history.push("a");
        history.push("b");
        history.push("c");
        assert_eq!(history.iter().collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[test]
    fn test_resize_keeps_newest() {
        let mut history = filled(&["a", "b", "c", "d"]);
        history.resize(2);
        assert_eq!(history.capacity(), 2);
        assert_eq!(history.iter().collect::<Vec<_>>(), vec!["c", "d"]);
        history.resize(0);
        assert_eq!(history.capacity(), 1);
    }

    #[test]
    fn test_forget_recent() {
        let mut history = filled(&["a", "b", "c"]);
        history.forget_recent(2);
        assert_eq!(history.iter().collect::<Vec<_>>(), vec!["a"]);
        history.forget_recent(5);
        assert!(history.is_empty());
    }

    #[test]
    fn test_recall_shortcuts() {
        let history = filled(&["ls", "echo", "cd"]);
        assert_eq!(history.recall("!!"), Some(Recall::Run("cd".into())));
        assert_eq!(history.recall("!-2"), Some(Recall::Run("echo".into())));
        assert_eq!(history.recall("!-3:p"), Some(Recall::Echo("ls".into())));
        assert_eq!(history.recall("!?ch?"), Some(Recall::Run("echo".into())));
        assert_eq!(history.recall("!-9"), Some(Recall::Missing("!-9".into())));
        assert_eq!(history.recall("!-0"), Some(Recall::Missing("!-0".into())));
        assert_eq!(history.recall("echo !!"), None);
    }

    #[test]
    fn test_recall_on_empty_history() {
        assert_eq!(
            History::default().recall("!!"),
            Some(Recall::Missing("!!".into()))
        );
    }
}
