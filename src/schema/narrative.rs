use serde::{Deserialize, Serialize};

use super::trust::TrustPhase;

/// Identity of a scripted story beat.
///
/// Used as the key in the narrative flag set, so each variant (with its
/// payload) is delivered at most once per reset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NarrativeEventId {
    FirstContact,
    PhaseShift { from: TrustPhase, to: TrustPhase },
    /// The nth time trust fell through the floor after being earned.
    TrustBroken { drop: u32 },
    NeverTrusted,
    /// Keyed by the unix time of the last interaction before the absence.
    LongAbsence { left_at: i64 },
    /// Repeatable: the phrase count reached this multiple of the period.
    RepetitionLoop { count: u32 },
    SymbolRecurrence,
    IdentityQuestion,
    /// Caller-driven milestone (page visits, external achievements).
    Milestone(String),
}

impl NarrativeEventId {
    /// Short stable label for logs and the journal.
    pub fn label(&self) -> String {
        match self {
            Self::FirstContact => "first_contact".to_string(),
            Self::PhaseShift { from, to } => format!("phase_shift:{}->{}", from.name(), to.name()),
            Self::TrustBroken { drop } => format!("trust_broken:{}", drop),
            Self::NeverTrusted => "never_trusted".to_string(),
            Self::LongAbsence { .. } => "long_absence".to_string(),
            Self::RepetitionLoop { count } => format!("repetition_loop:{}", count),
            Self::SymbolRecurrence => "symbol_recurrence".to_string(),
            Self::IdentityQuestion => "identity_question".to_string(),
            Self::Milestone(name) => format!("milestone:{}", name),
        }
    }
}
