use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discrete relationship stage derived from the trust score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrustPhase {
    Cold,
    Curious,
    Confessional,
    Unstable,
}

impl TrustPhase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cold => "cold",
            Self::Curious => "curious",
            Self::Confessional => "confessional",
            Self::Unstable => "unstable",
        }
    }

    /// Coarse band used for template selection.
    pub fn band(&self) -> TrustBand {
        match self {
            Self::Cold => TrustBand::Low,
            Self::Curious => TrustBand::Medium,
            Self::Confessional | Self::Unstable => TrustBand::High,
        }
    }
}

impl Default for TrustPhase {
    fn default() -> Self {
        Self::Cold
    }
}

/// Low/medium/high bucketing of the phase, the key the template bank uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrustBand {
    Low,
    Medium,
    High,
}

/// One recorded phase change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: TrustPhase,
    pub to: TrustPhase,
    pub score: i32,
    pub at: DateTime<Utc>,
}

/// The persisted trust record. Only `TrustMachine` mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustState {
    pub score: i32,
    pub phase: TrustPhase,
    pub phase_entered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub history: Vec<PhaseTransition>,
    /// Highest score ever held since the last reset.
    #[serde(default)]
    pub peak: i32,
    /// Times trust fell through the broken-trust floor after having been earned.
    #[serde(default)]
    pub drop_count: u32,
}

impl TrustState {
    pub fn snapshot(&self) -> TrustSnapshot {
        TrustSnapshot {
            score: self.score,
            phase: self.phase,
        }
    }
}

/// Read-only status for badges and consoles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustSnapshot {
    pub score: i32,
    pub phase: TrustPhase,
}
