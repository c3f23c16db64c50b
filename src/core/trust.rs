/// Trust and phase state machine.
///
/// The phase is a pure function of the score, but phase *changes* are
/// edge-triggered: recomputing an unchanged phase records nothing.

use chrono::{DateTime, Utc};

use crate::core::config::TrustThresholds;
use crate::schema::trust::{PhaseTransition, TrustState};

const HISTORY_CAPACITY: usize = 64;

/// What one score mutation did.
#[derive(Debug, Clone, PartialEq)]
pub struct TrustChange {
    pub previous: i32,
    pub score: i32,
    pub transition: Option<PhaseTransition>,
    /// Trust fell through the broken-trust floor on this mutation.
    pub dropped: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct TrustMachine {
    thresholds: TrustThresholds,
}

impl TrustMachine {
    pub fn new(thresholds: TrustThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &TrustThresholds {
        &self.thresholds
    }

    /// A fresh record at `score` (clamped), with no history.
    pub fn initial_state(&self, score: i32) -> TrustState {
        let score = self.thresholds.clamp(score);
        TrustState {
            score,
            phase: self.thresholds.phase_for(score),
            phase_entered_at: None,
            history: Vec::new(),
            peak: score,
            drop_count: 0,
        }
    }

    /// Apply a signed delta, clamp, and re-derive the phase.
    pub fn apply(&self, state: &mut TrustState, delta: i32, now: DateTime<Utc>) -> TrustChange {
        let previous = state.score;
        state.score = self.thresholds.clamp(previous.saturating_add(delta));

        let floor = self.thresholds.broken_floor;
        let dropped =
            previous >= floor && state.score < floor && state.peak >= self.thresholds.curious;
        if dropped {
            state.drop_count += 1;
            tracing::info!(drop_count = state.drop_count, score = state.score, "trust broken");
        }
        state.peak = state.peak.max(state.score);

        let transition = self.recompute(state, now);
        TrustChange {
            previous,
            score: state.score,
            transition,
            dropped,
        }
    }

    /// Re-derive the phase from the score; records and returns a transition
    /// only when the phase actually changes.
    pub fn recompute(&self, state: &mut TrustState, now: DateTime<Utc>) -> Option<PhaseTransition> {
        // Repair records loaded with an out-of-range score
        state.score = self.thresholds.clamp(state.score);
        let derived = self.thresholds.phase_for(state.score);
        if derived == state.phase {
            return None;
        }

        let transition = PhaseTransition {
            from: state.phase,
            to: derived,
            score: state.score,
            at: now,
        };
        tracing::info!(
            from = transition.from.name(),
            to = transition.to.name(),
            score = state.score,
            "phase transition"
        );
        state.history.push(transition.clone());
        if state.history.len() > HISTORY_CAPACITY {
            let excess = state.history.len() - HISTORY_CAPACITY;
            state.history.drain(..excess);
        }
        state.phase = derived;
        state.phase_entered_at = Some(now);
        Some(transition)
    }

    /// Trust was earned at some point and has since been lost.
    pub fn is_broken(&self, state: &TrustState) -> bool {
        state.drop_count > 0
    }

    /// Trust has never reached the first threshold.
    pub fn never_trusted(&self, state: &TrustState) -> bool {
        state.peak < self.thresholds.curious
    }
}
