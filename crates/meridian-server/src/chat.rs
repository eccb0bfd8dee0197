//! Bounded chat history replayed to players as they log in.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatLine {
    pub from: String,
    pub message: String,
}

/// Circular buffer of the most recent lines; the oldest is evicted first.
#[derive(Debug, Clone)]
pub struct ChatHistory {
    lines: VecDeque<ChatLine>,
    capacity: usize,
}

impl ChatHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: ChatLine) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &ChatLine> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: usize) -> ChatLine {
        ChatLine {
            from: "ada".into(),
            message: n.to_string(),
        }
    }

    #[test]
    fn oldest_lines_are_evicted() {
        let mut history = ChatHistory::new(3);
        for n in 0..5 {
            history.push(line(n));
        }
        let kept: Vec<&str> = history.iter().map(|l| l.message.as_str()).collect();
        assert_eq!(kept, vec!["2", "3", "4"]);
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let mut history = ChatHistory::new(0);
        history.push(line(1));
        assert!(history.is_empty());
    }
}
