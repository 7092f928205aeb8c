use std::collections::VecDeque;

use tracing::trace;

/// Bounded log of executed console commands with console-style recall.
///
/// Commands containing any exclusion substring (ASCII case-insensitive) are
/// never recorded, so they never reach the save file either.
#[derive(Debug, Clone)]
pub struct CommandHistory {
    entries: VecDeque<String>,
    max_len: usize,
    exclusions: Vec<String>,
    cursor: Option<usize>,
    draft: Option<String>,
}

impl CommandHistory {
    pub fn new(max_len: usize, exclusions: Vec<String>) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_len.min(256)),
            max_len,
            exclusions,
            cursor: None,
            draft: None,
        }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn is_excluded(&self, command: &str) -> bool {
        let lowered = command.to_ascii_lowercase();
        self.exclusions
            .iter()
            .any(|needle| lowered.contains(&needle.to_ascii_lowercase()))
    }

    /// Appends a command. Returns false when it was filtered out.
    pub fn record(&mut self, command: &str) -> bool {
        if command.trim().is_empty() || self.is_excluded(command) {
            trace!(command, "command_history_skipped");
            return false;
        }
        push_bounded(&mut self.entries, command.to_string(), self.max_len);
        self.reset_recall();
        true
    }

    /// Oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replaces the whole log, e.g. from a loaded save. Order is kept; the
    /// bound still applies, keeping the newest entries.
    pub fn replace_all<I>(&mut self, commands: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.entries.clear();
        for command in commands {
            if command.trim().is_empty() {
                continue;
            }
            push_bounded(&mut self.entries, command, self.max_len);
        }
        self.reset_recall();
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.reset_recall();
    }

    /// Steps one entry back in time. The first step stashes `draft` so that
    /// stepping forward past the newest entry gives it back.
    pub fn recall_older(&mut self, draft: &str) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }

        if self.cursor.is_none() {
            self.draft = Some(draft.to_string());
        }

        let next_index = match self.cursor {
            Some(index) => index.saturating_sub(1),
            None => self.entries.len() - 1,
        };
        self.cursor = Some(next_index);
        self.entries.get(next_index).map(String::as_str)
    }

    /// Steps one entry forward. Past the newest entry, returns the stashed
    /// draft and leaves recall mode.
    pub fn recall_newer(&mut self) -> Option<String> {
        let index = self.cursor?;

        if index + 1 < self.entries.len() {
            let next_index = index + 1;
            self.cursor = Some(next_index);
            return self.entries.get(next_index).cloned();
        }

        self.cursor = None;
        Some(self.draft.take().unwrap_or_default())
    }

    pub fn is_recalling(&self) -> bool {
        self.cursor.is_some()
    }

    fn reset_recall(&mut self) {
        self.cursor = None;
        self.draft = None;
    }
}

fn push_bounded(queue: &mut VecDeque<String>, value: String, max_len: usize) {
    if max_len == 0 {
        return;
    }
    while queue.len() >= max_len {
        queue.pop_front();
    }
    queue.push_back(value);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(max_len: usize) -> CommandHistory {
        CommandHistory::new(max_len, vec!["stat ".to_string(), "Freeze".to_string()])
    }

    #[test]
    fn bounded_log_drops_oldest_entries() {
        let mut log = history(3);
        for idx in 0..5 {
            assert!(log.record(&format!("cmd{idx}")));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.to_vec(), vec!["cmd2", "cmd3", "cmd4"]);
    }

    #[test]
    fn excluded_commands_are_not_recorded() {
        let mut log = history(10);
        assert!(!log.record("stat fps"));
        assert!(!log.record("FREEZE"));
        assert!(!log.record("   "));
        assert!(log.record("god"));
        assert_eq!(log.to_vec(), vec!["god"]);
    }

    #[test]
    fn replace_all_keeps_order_and_bound() {
        let mut log = history(2);
        log.replace_all(["a", "", "b", "c"].map(str::to_string));
        assert_eq!(log.to_vec(), vec!["b", "c"]);
    }

    #[test]
    fn recall_cycles_and_restores_draft() {
        let mut log = history(10);
        log.record("alpha");
        log.record("beta");

        assert_eq!(log.recall_older("draft"), Some("beta"));
        assert_eq!(log.recall_older("ignored"), Some("alpha"));
        assert_eq!(log.recall_older("ignored"), Some("alpha"));
        assert_eq!(log.recall_newer().as_deref(), Some("beta"));
        assert_eq!(log.recall_newer().as_deref(), Some("draft"));
        assert!(!log.is_recalling());
        assert_eq!(log.recall_newer(), None);
    }

    #[test]
    fn recording_leaves_recall_mode() {
        let mut log = history(10);
        log.record("alpha");
        log.recall_older("");
        log.record("beta");
        assert!(!log.is_recalling());
        assert_eq!(log.recall_older(""), Some("beta"));
    }

    #[test]
    fn zero_bound_stores_nothing() {
        let mut log = history(0);
        log.record("god");
        assert!(log.is_empty());
        assert_eq!(log.recall_older("x"), None);
    }
}
