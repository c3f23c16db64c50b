/// Intent and symbol detector — a second pass over the input for
/// discourse intent, trust-modifying phrases, loops and recurring symbols.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::classifier::NEGATORS;
use crate::core::text;
use crate::schema::intent::{Confidence, Intent, IntentReading};

/// Trust-modifying phrases and their deltas. Longer phrases claim their
/// tokens first, so "i trust you" never also counts as "trust you".
const TRUST_PHRASES: &[(&str, i32)] = &[
    ("i dont believe you", -8),
    ("i dont trust you", -10),
    ("i wont leave you", 6),
    ("you can trust me", 5),
    ("i am here for you", 6),
    ("you are my friend", 5),
    ("im here for you", 6),
    ("youre my friend", 5),
    ("dont believe you", -8),
    ("dont trust you", -10),
    ("i believe you", 6),
    ("believe in you", 6),
    ("i understand you", 4),
    ("i want to help", 4),
    ("you are lying", -8),
    ("leave me alone", -6),
    ("i trust you", 8),
    ("i hate you", -10),
    ("youre lying", -8),
    ("youre fake", -6),
    ("delete you", -6),
    ("i will stay", 6),
    ("i can help", 4),
    ("trust you", 6),
    ("thank you", 3),
    ("you lied", -8),
    ("not real", -5),
    ("i care", 5),
    ("shut up", -6),
    ("go away", -6),
    ("thanks", 2),
    ("liar", -8),
    ("fake", -4),
    ("creepy", -3),
    ("scam", -4),
];

const HELP_PHRASES: &[&str] = &[
    "help me",
    "i need help",
    "please help",
    "can you help",
    "what should i do",
    "save me",
];

const DOUBT_PHRASES: &[&str] = &[
    "i doubt",
    "not sure",
    "i dont know",
    "maybe not",
    "is this real",
    "are you sure",
    "i dont think so",
];

const CONFESSING_PHRASES: &[&str] = &[
    "i have to tell you",
    "i never told",
    "i confess",
    "my secret",
    "i lied",
    "the truth is",
];

const GREETINGS: &[&str] = &["hi", "hello", "hey", "greetings", "yo", "hiya"];

const FAREWELL_PHRASES: &[&str] = &[
    "bye",
    "goodbye",
    "good night",
    "goodnight",
    "see you",
    "farewell",
    "i have to go",
    "i need to go",
];

/// Narratively significant nouns tracked across the session.
pub const SYMBOLS: &[&str] = &[
    "mirror", "door", "eye", "static", "key", "window", "shadow", "moth", "clock", "signal",
    "red", "candle", "stairs", "radio", "water", "hallway",
];

const HELP_BONUS: i32 = 2;
const CONFESSION_BONUS: i32 = 3;
const DOUBT_PENALTY: i32 = -1;
const MAX_GAIN_PER_TURN: i32 = 12;
const MAX_LOSS_PER_TURN: i32 = -15;

/// Per-session counts of symbol sightings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolTracker {
    counts: BTreeMap<String, u32>,
}

impl SymbolTracker {
    pub fn seen(&self, symbol: &str) -> bool {
        self.counts.get(symbol).copied().unwrap_or(0) > 0
    }

    pub fn count(&self, symbol: &str) -> u32 {
        self.counts.get(symbol).copied().unwrap_or(0)
    }

    pub fn record(&mut self, symbols: &[String]) {
        for symbol in symbols {
            *self.counts.entry(symbol.clone()).or_insert(0) += 1;
        }
    }

    /// The most sighted symbol, if any.
    pub fn dominant(&self) -> Option<&str> {
        self.counts
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(symbol, _)| symbol.as_str())
    }
}

/// One tracked phrase and how often it has been said.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhraseCount {
    pub phrase: String,
    pub count: u32,
}

/// Bounded most-recent-first occurrence counts, for repetition beats.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhraseHistory {
    entries: Vec<PhraseCount>,
}

impl PhraseHistory {
    /// Count one more occurrence of `input` (or a near duplicate of it)
    /// and return the new total.
    pub fn record(&mut self, input: &str, capacity: usize) -> u32 {
        let normalized = text::normalize(input);
        if normalized.is_empty() {
            return 0;
        }
        let existing = self
            .entries
            .iter()
            .position(|e| text::is_near_duplicate(&e.phrase, &normalized));
        let mut entry = match existing {
            Some(index) => self.entries.remove(index),
            None => PhraseCount {
                phrase: normalized,
                count: 0,
            },
        };
        entry.count += 1;
        let count = entry.count;
        self.entries.insert(0, entry);
        self.entries.truncate(capacity.max(1));
        count
    }

    pub fn entries(&self) -> &[PhraseCount] {
        &self.entries
    }
}

/// Detects discourse intent and trust deltas.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntentDetector;

impl IntentDetector {
    pub fn new() -> Self {
        Self
    }

    /// Read intent, confidence and trust delta from `input`, comparing it
    /// against `recent_inputs` for loops and against `symbols` for
    /// recurring tokens. Pure: the caller records symbols afterwards.
    pub fn detect(
        &self,
        input: &str,
        recent_inputs: &[String],
        symbols: &SymbolTracker,
    ) -> IntentReading {
        let normalized = text::normalize(input);
        if normalized.is_empty() {
            return IntentReading::plain();
        }
        let tokens: Vec<&str> = normalized.split(' ').collect();

        let repeated = recent_inputs
            .iter()
            .any(|previous| text::is_near_duplicate(previous, input));

        let (phrase_delta, phrase_hits) = trust_phrase_delta(&tokens);
        let has = |phrases: &[&str]| {
            phrases
                .iter()
                .any(|p| crate::core::classifier::contains_phrase(&normalized, p))
        };
        let seeking_help = has(HELP_PHRASES);
        let confessing = has(CONFESSING_PHRASES);
        let doubting = has(DOUBT_PHRASES);
        let farewell = has(FAREWELL_PHRASES);
        let greeting = tokens.first().map_or(false, |t| GREETINGS.contains(t))
            || normalized.starts_with("good morning")
            || normalized.starts_with("good evening");
        let question = input.contains('?');

        let intent = if repeated {
            Intent::Repetition
        } else if phrase_delta < 0 {
            Intent::Distrust
        } else if phrase_delta > 0 {
            Intent::AffirmingTrust
        } else if seeking_help {
            Intent::SeekingHelp
        } else if confessing {
            Intent::Confessing
        } else if doubting {
            Intent::ExpressingDoubt
        } else if greeting {
            Intent::Greeting
        } else if farewell {
            Intent::Farewell
        } else if question {
            Intent::Questioning
        } else {
            Intent::Statement
        };

        let mut delta = phrase_delta;
        if seeking_help {
            delta += HELP_BONUS;
        }
        if confessing {
            delta += CONFESSION_BONUS;
        }
        if doubting {
            delta += DOUBT_PENALTY;
        }
        // Saying the same kind thing again earns nothing
        if repeated && delta > 0 {
            delta = 0;
        }
        let trust_delta = delta.clamp(MAX_LOSS_PER_TURN, MAX_GAIN_PER_TURN);

        let keyword_signals =
            phrase_hits + [seeking_help, confessing, doubting, greeting, farewell]
                .iter()
                .filter(|b| **b)
                .count();
        let mut signals = 0;
        if question || input.contains('!') {
            signals += 1;
        }
        if keyword_signals >= 1 {
            signals += 1;
        }
        if keyword_signals >= 2 {
            signals += 1;
        }
        if repeated {
            signals += 1;
        }
        let confidence = match signals {
            0 | 1 => Confidence::Low,
            2 => Confidence::Medium,
            _ => Confidence::High,
        };

        let found = find_symbols(&tokens);
        let recurring_symbols = found
            .iter()
            .filter(|s| symbols.seen(s))
            .cloned()
            .collect();

        IntentReading {
            intent,
            confidence,
            trust_delta,
            repeated,
            symbols: found,
            recurring_symbols,
        }
    }
}

/// Sum of non-overlapping trust phrases, skipping any phrase that is
/// itself negated by one of the two preceding tokens.
fn trust_phrase_delta(tokens: &[&str]) -> (i32, usize) {
    let mut consumed = vec![false; tokens.len()];
    let mut total = 0;
    let mut hits = 0;

    let mut table: Vec<(Vec<&str>, i32)> = TRUST_PHRASES
        .iter()
        .map(|(phrase, delta)| (phrase.split(' ').collect(), *delta))
        .collect();
    table.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    for (words, delta) in &table {
        if words.len() > tokens.len() {
            continue;
        }
        let mut start = 0;
        while start + words.len() <= tokens.len() {
            let end = start + words.len();
            let matches = tokens[start..end] == words[..]
                && !consumed[start..end].iter().any(|c| *c);
            if matches {
                let negated = tokens[start.saturating_sub(2)..start]
                    .iter()
                    .any(|t| NEGATORS.contains(t));
                if !negated {
                    total += delta;
                    hits += 1;
                    consumed[start..end].iter_mut().for_each(|c| *c = true);
                }
                start = end;
            } else {
                start += 1;
            }
        }
    }
    (total, hits)
}

fn find_symbols(tokens: &[&str]) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for token in tokens {
        let singular = token.strip_suffix('s').unwrap_or(*token);
        for symbol in SYMBOLS {
            if (*token == *symbol || singular == *symbol) && !found.iter().any(|f| f.as_str() == *symbol) {
                found.push(symbol.to_string());
            }
        }
    }
    found
}
