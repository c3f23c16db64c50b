/// Engine configuration — thresholds, capacities, cooldowns and the
/// stylistic intensity/personality pair. Loadable from RON.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::schema::trust::TrustPhase;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// The canonical trust threshold table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrustThresholds {
    pub min: i32,
    pub max: i32,
    pub curious: i32,
    pub confessional: i32,
    pub unstable: i32,
    /// Falling below this after having reached `curious` counts as a trust drop.
    pub broken_floor: i32,
}

impl Default for TrustThresholds {
    fn default() -> Self {
        Self {
            min: 0,
            max: 100,
            curious: 30,
            confessional: 60,
            unstable: 85,
            broken_floor: 15,
        }
    }
}

impl TrustThresholds {
    /// Pure, monotonic mapping from score to phase.
    pub fn phase_for(&self, score: i32) -> TrustPhase {
        if score >= self.unstable {
            TrustPhase::Unstable
        } else if score >= self.confessional {
            TrustPhase::Confessional
        } else if score >= self.curious {
            TrustPhase::Curious
        } else {
            TrustPhase::Cold
        }
    }

    pub fn clamp(&self, score: i32) -> i32 {
        score.clamp(self.min, self.max)
    }
}

/// Capacities and cooldowns of the memory subsystems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    pub conversation_capacity: usize,
    pub echo_capacity: usize,
    /// Inputs shorter than this need a question mark or loaded keyword to be kept.
    pub echo_min_len: usize,
    /// Vault-level gap between recalls: whichever of these elapses first.
    pub echo_cooldown_secs: i64,
    pub echo_cooldown_turns: u32,
    /// A single echo cannot be quoted again until this much time has passed.
    pub echo_item_cooldown_secs: i64,
    pub dream_capacity: usize,
    pub journal_capacity: usize,
    pub phrase_history_capacity: usize,
    /// Chance that revealing a fragment spawns a derived one.
    pub recursive_chance: f64,
    pub max_lineage_depth: u8,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            conversation_capacity: 8,
            echo_capacity: 15,
            echo_min_len: 20,
            echo_cooldown_secs: 30,
            echo_cooldown_turns: 3,
            echo_item_cooldown_secs: 300,
            dream_capacity: 10,
            journal_capacity: 100,
            phrase_history_capacity: 24,
            recursive_chance: 0.25,
            max_lineage_depth: 3,
        }
    }
}

/// Elapsed-time thresholds evaluated lazily on the next call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Silence after which the next turn dreams first.
    pub dream_after_secs: i64,
    /// Silence after which the long-absence beat fires.
    pub absence_after_secs: i64,
    /// Idle time before ambient lines become available.
    pub ambient_after_secs: i64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            dream_after_secs: 6 * 3600,
            absence_after_secs: 12 * 3600,
            ambient_after_secs: 90,
        }
    }
}

/// Per-pass weights describing how the narrator's text tends to break.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Personality {
    pub fragmentation: f32,
    pub punctuation_shift: f32,
    pub glitch: f32,
    pub truncation: f32,
    pub quirks: f32,
    /// Verbal tics injected by the quirk pass.
    #[serde(default)]
    pub tics: Vec<String>,
}

impl Default for Personality {
    fn default() -> Self {
        Self {
            fragmentation: 0.5,
            punctuation_shift: 0.5,
            glitch: 0.4,
            truncation: 0.3,
            quirks: 0.3,
            tics: vec![
                "...".to_string(),
                "(sorry)".to_string(),
                "i think".to_string(),
                "wait".to_string(),
            ],
        }
    }
}

/// Independent on/off switches for each text pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassToggles {
    pub fragmentation: bool,
    pub punctuation_shift: bool,
    pub glitch: bool,
    pub truncation: bool,
    pub quirks: bool,
}

impl Default for PassToggles {
    fn default() -> Self {
        Self {
            fragmentation: true,
            punctuation_shift: true,
            glitch: true,
            truncation: true,
            quirks: true,
        }
    }
}

impl PassToggles {
    pub fn none() -> Self {
        Self {
            fragmentation: false,
            punctuation_shift: false,
            glitch: false,
            truncation: false,
            quirks: false,
        }
    }
}

/// The intensity + personality pair driving the variety pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformConfig {
    /// 0.0 = clean text, 1.0 = maximum disturbance.
    pub intensity: f32,
    #[serde(default)]
    pub personality: Personality,
    #[serde(default)]
    pub passes: PassToggles,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            intensity: 0.5,
            personality: Personality::default(),
            passes: PassToggles::default(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Key prefix for every persisted record.
    pub namespace: String,
    pub initial_trust: i32,
    #[serde(default)]
    pub thresholds: TrustThresholds,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub transform: TransformConfig,
    /// Every multiple of this many repetitions re-fires the loop beat.
    pub repetition_period: u32,
    /// Turns in Cold, never having been trusted, before that branch fires.
    pub never_trusted_after_turns: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            namespace: "narrator".to_string(),
            initial_trust: 20,
            thresholds: TrustThresholds::default(),
            memory: MemoryConfig::default(),
            timing: TimingConfig::default(),
            transform: TransformConfig::default(),
            repetition_period: 3,
            never_trusted_after_turns: 12,
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<EngineConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse and validate a configuration from a RON string.
    pub fn parse_ron(input: &str) -> Result<EngineConfig, ConfigError> {
        let config: EngineConfig = ron::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.thresholds;
        if !(t.min <= t.broken_floor
            && t.broken_floor <= t.curious
            && t.curious < t.confessional
            && t.confessional < t.unstable
            && t.unstable <= t.max)
        {
            return Err(ConfigError::Invalid(
                "trust thresholds must ascend: min <= floor <= curious < confessional < unstable <= max"
                    .to_string(),
            ));
        }
        if self.memory.conversation_capacity == 0 || self.memory.echo_capacity == 0 {
            return Err(ConfigError::Invalid(
                "memory capacities must be non-zero".to_string(),
            ));
        }
        if self.repetition_period == 0 {
            return Err(ConfigError::Invalid(
                "repetition_period must be at least 1".to_string(),
            ));
        }
        if self.namespace.is_empty() {
            return Err(ConfigError::Invalid("namespace must not be empty".to_string()));
        }
        Ok(())
    }
}
