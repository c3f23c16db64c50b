/// Simulated typing cadence for hosts that animate the narrator's output.
///
/// A plan is a list of keystrokes with the delay before each one. Nervous
/// phases mistype more and correct themselves with backspaces; replaying
/// a plan always yields the original text.

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::schema::trust::TrustPhase;

const BASE_DELAY_MS: u32 = 35;
const JITTER_MS: u32 = 25;
const SENTENCE_PAUSE_MS: u32 = 260;
const CLAUSE_PAUSE_MS: u32 = 120;
const NOTICE_TYPO_MS: u32 = 160;
const HESITATION_MS: u32 = 450;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Keystroke {
    Char(char),
    Backspace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key: Keystroke,
    /// Milliseconds to wait before this keystroke.
    pub delay_ms: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingPlan {
    pub events: Vec<KeyEvent>,
}

impl TypingPlan {
    pub fn total_ms(&self) -> u64 {
        self.events.iter().map(|e| u64::from(e.delay_ms)).sum()
    }

    pub fn typo_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| e.key == Keystroke::Backspace)
            .count()
    }

    /// The text left on screen after every keystroke.
    pub fn replay(&self) -> String {
        let mut out = String::new();
        for event in &self.events {
            match event.key {
                Keystroke::Char(c) => out.push(c),
                Keystroke::Backspace => {
                    out.pop();
                }
            }
        }
        out
    }
}

fn typo_rate(phase: TrustPhase) -> f64 {
    match phase {
        TrustPhase::Cold => 0.01,
        TrustPhase::Curious => 0.02,
        TrustPhase::Confessional => 0.03,
        TrustPhase::Unstable => 0.07,
    }
}

// A neighbouring key on a qwerty row, or the letter doubled.
fn neighbour(c: char) -> char {
    const ROWS: [&str; 3] = ["qwertyuiop", "asdfghjkl", "zxcvbnm"];
    let lower = c.to_ascii_lowercase();
    for row in ROWS {
        if let Some(pos) = row.find(lower) {
            let bytes = row.as_bytes();
            let next = if pos + 1 < bytes.len() { bytes[pos + 1] } else { bytes[pos - 1] };
            return next as char;
        }
    }
    c
}

pub fn typing_plan(text: &str, phase: TrustPhase, rng: &mut StdRng) -> TypingPlan {
    let mut events = Vec::with_capacity(text.len() + 8);
    let typo = typo_rate(phase);
    let mut pending_pause = 0;

    for c in text.chars() {
        let mut delay = BASE_DELAY_MS + rng.gen_range(0..=JITTER_MS) + pending_pause;

        if phase == TrustPhase::Unstable && rng.gen_bool(0.02) {
            delay += HESITATION_MS;
        }

        if c.is_ascii_alphabetic() && rng.gen_bool(typo) {
            events.push(KeyEvent {
                key: Keystroke::Char(neighbour(c)),
                delay_ms: delay,
            });
            events.push(KeyEvent {
                key: Keystroke::Backspace,
                delay_ms: NOTICE_TYPO_MS + rng.gen_range(0..=JITTER_MS * 2),
            });
            delay = BASE_DELAY_MS;
        }

        events.push(KeyEvent {
            key: Keystroke::Char(c),
            delay_ms: delay,
        });

        pending_pause = match c {
            '.' | '!' | '?' => SENTENCE_PAUSE_MS,
            ',' | ';' | ':' => CLAUSE_PAUSE_MS,
            _ => 0,
        };
    }

    TypingPlan { events }
}
