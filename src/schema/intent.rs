use serde::{Deserialize, Serialize};

/// Discourse intent behind an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intent {
    SeekingHelp,
    ExpressingDoubt,
    AffirmingTrust,
    Distrust,
    Questioning,
    Greeting,
    Farewell,
    Confessing,
    /// The input repeats (or nearly repeats) something said recently.
    Repetition,
    Statement,
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SeekingHelp => "seeking_help",
            Self::ExpressingDoubt => "expressing_doubt",
            Self::AffirmingTrust => "affirming_trust",
            Self::Distrust => "distrust",
            Self::Questioning => "questioning",
            Self::Greeting => "greeting",
            Self::Farewell => "farewell",
            Self::Confessing => "confessing",
            Self::Repetition => "repetition",
            Self::Statement => "statement",
        }
    }
}

impl Default for Intent {
    fn default() -> Self {
        Self::Statement
    }
}

/// How many independent signals agreed on the intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Output of the intent and symbol pass over one input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentReading {
    pub intent: Intent,
    pub confidence: Confidence,
    /// Signed adjustment the trust machine should apply.
    pub trust_delta: i32,
    /// True when the input matches one of the recent inputs.
    pub repeated: bool,
    /// Symbols found in this input, in order of appearance.
    pub symbols: Vec<String>,
    /// The subset of `symbols` already seen earlier in the session.
    pub recurring_symbols: Vec<String>,
}

impl IntentReading {
    pub fn plain() -> Self {
        Self {
            intent: Intent::Statement,
            confidence: Confidence::Low,
            trust_delta: 0,
            repeated: false,
            symbols: Vec::new(),
            recurring_symbols: Vec::new(),
        }
    }
}
