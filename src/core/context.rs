/// Narrative context: anti-repetition tracking over recent narrator output.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::core::text;

const DEFAULT_WINDOW: usize = 6;

/// Why a candidate output was flagged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepetitionIssue {
    /// Identical to the immediately previous output.
    ExactRepeat,
    /// Near-duplicate of something said within the window.
    NearDuplicate { turns_ago: usize },
    /// Opens with the same three words as the previous output.
    RepeatedOpening,
}

/// Maintains a sliding window of recently generated text for
/// repetition detection. Most recent first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeContext {
    recent: VecDeque<String>,
    #[serde(skip, default = "default_window")]
    window: usize,
}

fn default_window() -> usize {
    DEFAULT_WINDOW
}

impl Default for NarrativeContext {
    fn default() -> Self {
        Self {
            recent: VecDeque::new(),
            window: DEFAULT_WINDOW,
        }
    }
}

impl NarrativeContext {
    pub fn last(&self) -> Option<&str> {
        self.recent.front().map(String::as_str)
    }

    pub fn recent(&self) -> impl Iterator<Item = &str> {
        self.recent.iter().map(String::as_str)
    }

    pub fn check_repetition(&self, candidate: &str) -> Vec<RepetitionIssue> {
        let mut issues = Vec::new();
        let previous = match self.recent.front() {
            Some(previous) => previous,
            None => return issues,
        };
        if previous == candidate {
            issues.push(RepetitionIssue::ExactRepeat);
        } else if let Some(turns_ago) = self
            .recent
            .iter()
            .position(|past| text::is_near_duplicate(past, candidate))
        {
            issues.push(RepetitionIssue::NearDuplicate { turns_ago });
        }
        if opening(previous).len() == 3 && opening(previous) == opening(candidate) {
            issues.push(RepetitionIssue::RepeatedOpening);
        }
        issues
    }

    pub fn record(&mut self, output: &str) {
        self.recent.push_front(output.to_string());
        self.recent.truncate(self.window);
    }

    pub fn clear(&mut self) {
        self.recent.clear();
    }
}

fn opening(s: &str) -> Vec<String> {
    text::tokens(s).into_iter().take(3).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_context_flags_nothing() {
        let ctx = NarrativeContext::default();
        assert!(ctx.check_repetition("anything at all").is_empty());
        assert_eq!(ctx.last(), None);
    }

    #[test]
    fn exact_repeat_of_previous() {
        let mut ctx = NarrativeContext::default();
        ctx.record("The mirror is watching.");
        let issues = ctx.check_repetition("The mirror is watching.");
        assert!(issues.contains(&RepetitionIssue::ExactRepeat));
        assert!(issues.contains(&RepetitionIssue::RepeatedOpening));
    }

    #[test]
    fn near_duplicate_in_window() {
        let mut ctx = NarrativeContext::default();
        ctx.record("The door was open when you left.");
        ctx.record("Something else entirely.");
        let issues = ctx.check_repetition("the door was open when you left");
        assert_eq!(issues, vec![RepetitionIssue::NearDuplicate { turns_ago: 1 }]);
    }

    #[test]
    fn window_is_bounded() {
        let mut ctx = NarrativeContext::default();
        for i in 0..20 {
            ctx.record(&format!("line number {}", i));
        }
        assert_eq!(ctx.recent().count(), DEFAULT_WINDOW);
        assert_eq!(ctx.last(), Some("line number 19"));
    }
}
