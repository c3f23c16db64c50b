use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::emotion::{EmotionCategory, EmotionalState, Intensity};

/// One user input as remembered by conversation memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub input_text: String,
    pub emotion: EmotionalState,
    pub topics: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// A quotable past input kept in the echo vault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Echo {
    pub id: u64,
    pub text: String,
    /// The input reflected back through the narrator's voice.
    pub refracted: String,
    pub emotion: EmotionCategory,
    pub uses: u32,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Which archive a fragment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FragmentKind {
    Confession,
    Testament,
}

impl FragmentKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Confession => "confession",
            Self::Testament => "testament",
        }
    }
}

/// What has to be true before a fragment reveals itself.
///
/// Every condition that is set must hold. A fragment with neither set
/// only opens through an explicit reveal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockCondition {
    #[serde(default)]
    pub min_trust: Option<i32>,
    #[serde(default)]
    pub phrase: Option<String>,
}

impl UnlockCondition {
    pub fn is_manual(&self) -> bool {
        self.min_trust.is_none() && self.phrase.is_none()
    }

    /// Checks the condition against a trust score and the lowercased input.
    pub fn is_met(&self, trust: i32, lowered_text: &str) -> bool {
        if self.is_manual() {
            return false;
        }
        let trust_ok = self.min_trust.map_or(true, |min| trust >= min);
        let phrase_ok = self
            .phrase
            .as_ref()
            .map_or(true, |p| lowered_text.contains(&p.to_lowercase()));
        trust_ok && phrase_ok
    }
}

/// Where a fragment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lineage {
    Original,
    /// Spawned by revealing the fragment with this id.
    DerivedFrom(u32),
}

/// A confession or testament: an unlockable narrative record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub id: u32,
    pub kind: FragmentKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub revealed: bool,
    pub revealed_at: Option<DateTime<Utc>>,
    pub unlock: UnlockCondition,
    pub corrupted: bool,
    pub lineage: Lineage,
    /// Number of ancestors; originals are depth 0.
    #[serde(default)]
    pub depth: u8,
}

/// An offline narrative artifact synthesized from emotional state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dream {
    pub content: String,
    /// The emotional state the dream was generated from.
    pub emotion: EmotionalState,
    pub symbols: Vec<String>,
    pub intensity: Intensity,
    pub timestamp: DateTime<Utc>,
}

/// Category of a journal line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalKind {
    Turn,
    PhaseShift,
    Narrative,
    Reveal,
    Dream,
    Milestone,
}

/// The narrator's own log of notable happenings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub kind: JournalKind,
    pub text: String,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_unlock_never_met() {
        let cond = UnlockCondition::default();
        assert!(cond.is_manual());
        assert!(!cond.is_met(100, "anything at all"));
    }

    #[test]
    fn trust_only_unlock() {
        let cond = UnlockCondition {
            min_trust: Some(40),
            phrase: None,
        };
        assert!(!cond.is_met(39, ""));
        assert!(cond.is_met(40, ""));
    }

    #[test]
    fn phrase_and_trust_both_required() {
        let cond = UnlockCondition {
            min_trust: Some(30),
            phrase: Some("The Door".to_string()),
        };
        assert!(!cond.is_met(50, "nothing here"));
        assert!(!cond.is_met(10, "open the door"));
        assert!(cond.is_met(50, "open the door"));
    }
}
