use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The closed set of emotions the classifier can report.
///
/// `Watching` and `Existential` are narrative categories: being observed,
/// and questions about whether anything here is real.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EmotionCategory {
    Fear,
    Sadness,
    Anger,
    Joy,
    Confusion,
    Curiosity,
    Hope,
    Anxiety,
    Paranoia,
    Trust,
    Loneliness,
    Watching,
    Existential,
    Neutral,
}

impl EmotionCategory {
    pub const ALL: [EmotionCategory; 14] = [
        Self::Fear,
        Self::Sadness,
        Self::Anger,
        Self::Joy,
        Self::Confusion,
        Self::Curiosity,
        Self::Hope,
        Self::Anxiety,
        Self::Paranoia,
        Self::Trust,
        Self::Loneliness,
        Self::Watching,
        Self::Existential,
        Self::Neutral,
    ];

    /// Lowercase name, used in logs and persona files.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Fear => "fear",
            Self::Sadness => "sadness",
            Self::Anger => "anger",
            Self::Joy => "joy",
            Self::Confusion => "confusion",
            Self::Curiosity => "curiosity",
            Self::Hope => "hope",
            Self::Anxiety => "anxiety",
            Self::Paranoia => "paranoia",
            Self::Trust => "trust",
            Self::Loneliness => "loneliness",
            Self::Watching => "watching",
            Self::Existential => "existential",
            Self::Neutral => "neutral",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.name() == name)
    }

    /// Returns the tag string for this emotion (e.g., "emotion:fear").
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Fear => "emotion:fear",
            Self::Sadness => "emotion:sadness",
            Self::Anger => "emotion:anger",
            Self::Joy => "emotion:joy",
            Self::Confusion => "emotion:confusion",
            Self::Curiosity => "emotion:curiosity",
            Self::Hope => "emotion:hope",
            Self::Anxiety => "emotion:anxiety",
            Self::Paranoia => "emotion:paranoia",
            Self::Trust => "emotion:trust",
            Self::Loneliness => "emotion:loneliness",
            Self::Watching => "emotion:watching",
            Self::Existential => "emotion:existential",
            Self::Neutral => "emotion:neutral",
        }
    }
}

impl Default for EmotionCategory {
    fn default() -> Self {
        Self::Neutral
    }
}

/// Bucketed strength of the primary emotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Intensity {
    Low,
    Medium,
    High,
}

impl Default for Intensity {
    fn default() -> Self {
        Self::Low
    }
}

/// The classifier's verdict for one input.
///
/// Invariant: `secondary`, when present, differs from `primary`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionalState {
    pub primary: EmotionCategory,
    pub secondary: Option<EmotionCategory>,
    pub intensity: Intensity,
    pub timestamp: DateTime<Utc>,
}

impl EmotionalState {
    /// The neutral/low reading returned for empty or unmatched input.
    pub fn neutral(timestamp: DateTime<Utc>) -> Self {
        Self {
            primary: EmotionCategory::Neutral,
            secondary: None,
            intensity: Intensity::Low,
            timestamp,
        }
    }

    pub fn is_neutral(&self) -> bool {
        self.primary == EmotionCategory::Neutral
    }
}
