/// Emotion classifier — weighted keyword and phrase matching with
/// negation and intensifier handling.
///
/// A pure function of its input: no state, no errors. Empty or unmatched
/// text is neutral with low intensity.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;

use crate::core::text;
use crate::schema::emotion::{EmotionCategory, EmotionalState, Intensity};

use EmotionCategory::*;

/// Keywords per category. Matching is substring on normalized tokens;
/// a leading `=` demands an exact token match instead.
const LEXICON: &[(EmotionCategory, &[(&str, f32)])] = &[
    (
        Fear,
        &[
            ("afraid", 3.0),
            ("scared", 3.0),
            ("terrif", 3.0),
            ("fear", 3.0),
            ("frighten", 3.0),
            ("horror", 2.0),
            ("dread", 2.0),
            ("nightmare", 2.0),
            ("scream", 2.0),
            ("monster", 2.0),
            ("haunt", 2.0),
            ("ghost", 2.0),
            ("blood", 2.0),
            ("death", 2.0),
            ("dying", 2.0),
            ("=die", 2.0),
            ("kill", 2.0),
            ("creep", 1.0),
            ("dark", 1.0),
        ],
    ),
    (
        Sadness,
        &[
            ("sad", 3.0),
            ("depress", 3.0),
            ("grief", 3.0),
            ("sorrow", 3.0),
            ("unhappy", 3.0),
            ("mourn", 3.0),
            ("heartbr", 3.0),
            ("hopeless", 3.0),
            ("cry", 2.0),
            ("cried", 2.0),
            ("tears", 2.0),
            ("empty", 2.0),
            ("hurt", 2.0),
            ("pain", 2.0),
            ("broken", 2.0),
            ("=miss", 1.0),
            ("missing", 1.0),
            ("lost", 1.0),
        ],
    ),
    (
        Anger,
        &[
            ("angry", 3.0),
            ("furious", 3.0),
            ("hate", 3.0),
            ("rage", 3.0),
            ("pissed", 3.0),
            ("=mad", 2.0),
            ("annoy", 2.0),
            ("irritat", 2.0),
            ("stupid", 2.0),
            ("idiot", 2.0),
            ("damn", 1.0),
        ],
    ),
    (
        Joy,
        &[
            ("happy", 3.0),
            ("joy", 3.0),
            ("glad", 2.0),
            ("love", 2.0),
            ("laugh", 2.0),
            ("smile", 2.0),
            ("wonderful", 2.0),
            ("awesome", 2.0),
            ("excit", 2.0),
            ("delight", 2.0),
            ("=yay", 2.0),
            ("great", 1.0),
            ("=fun", 1.0),
            ("beautiful", 1.0),
        ],
    ),
    (
        Confusion,
        &[
            ("confus", 3.0),
            ("puzzl", 2.0),
            ("weird", 2.0),
            ("strange", 2.0),
            ("=huh", 2.0),
            ("unclear", 2.0),
            ("=why", 1.0),
        ],
    ),
    (
        Curiosity,
        &[
            ("curious", 3.0),
            ("wonder", 2.0),
            ("interest", 2.0),
            ("explor", 2.0),
            ("discover", 2.0),
            ("secret", 2.0),
            ("learn", 1.0),
            ("=how", 1.0),
        ],
    ),
    (
        Hope,
        &[
            ("hope", 3.0),
            ("wish", 2.0),
            ("someday", 2.0),
            ("heal", 2.0),
            ("future", 2.0),
            ("pray", 2.0),
            ("better", 1.0),
            ("maybe", 1.0),
            ("=light", 1.0),
        ],
    ),
    (
        Anxiety,
        &[
            ("anxious", 3.0),
            ("anxiety", 3.0),
            ("nervous", 3.0),
            ("worr", 3.0),
            ("stress", 3.0),
            ("overwhelm", 3.0),
            ("panic", 2.0),
            ("uneasy", 2.0),
            ("tense", 2.0),
            ("restless", 2.0),
            ("=shaking", 2.0),
        ],
    ),
    (
        Paranoia,
        &[
            ("paranoi", 3.0),
            ("spying", 3.0),
            ("=spy", 3.0),
            ("conspir", 3.0),
            ("=bugged", 3.0),
            ("follow", 2.0),
            ("track", 2.0),
            ("suspicio", 2.0),
            ("listening", 2.0),
            ("hacked", 2.0),
            ("hidden", 1.0),
        ],
    ),
    (
        Trust,
        &[
            ("trust", 3.0),
            ("believe", 2.0),
            ("=safe", 2.0),
            ("friend", 2.0),
            ("honest", 2.0),
            ("rely", 2.0),
            ("promise", 2.0),
            ("=loyal", 2.0),
            ("=together", 1.0),
        ],
    ),
    (
        Loneliness,
        &[
            ("lonely", 3.0),
            ("alone", 3.0),
            ("isolat", 3.0),
            ("abandon", 3.0),
            ("forgotten", 2.0),
            ("ignored", 2.0),
            ("=nobody", 2.0),
        ],
    ),
    (
        Watching,
        &[
            ("watch", 3.0),
            ("stare", 2.0),
            ("staring", 2.0),
            ("=eyes", 2.0),
            ("observ", 2.0),
            ("camera", 2.0),
            ("=seen", 1.0),
            ("screen", 1.0),
        ],
    ),
    (
        Existential,
        &[
            ("exist", 3.0),
            ("conscious", 3.0),
            ("simulation", 3.0),
            ("=void", 3.0),
            ("=real", 2.0),
            ("reality", 2.0),
            ("unreal", 2.0),
            ("meaning", 2.0),
            ("purpose", 2.0),
            ("alive", 2.0),
            ("universe", 2.0),
            ("infinite", 2.0),
            ("=soul", 2.0),
            ("=nothing", 1.0),
        ],
    ),
];

/// Multi-word phrases matched against the whole normalized text.
const PHRASES: &[(&str, EmotionCategory, f32)] = &[
    ("dont understand", Confusion, 3.0),
    ("makes no sense", Confusion, 3.0),
    ("who are you", Curiosity, 2.0),
    ("tell me", Curiosity, 1.5),
    ("no one", Loneliness, 2.0),
    ("behind me", Watching, 3.0),
    ("looking at me", Watching, 3.0),
    ("someone is watching", Watching, 3.0),
    ("who am i", Existential, 3.0),
    ("are you real", Existential, 3.0),
    ("am i real", Existential, 3.0),
    ("sick of", Anger, 2.0),
    ("leave me alone", Anger, 2.0),
    ("i trust you", Trust, 3.0),
    ("feel safe", Trust, 2.0),
    ("cant breathe", Anxiety, 3.0),
    ("following me", Paranoia, 3.0),
    ("they know", Paranoia, 2.0),
];

/// Tokens that multiply the next emotional hit.
pub const INTENSIFIERS: &[&str] = &[
    "very",
    "so",
    "really",
    "extremely",
    "too",
    "completely",
    "totally",
    "absolutely",
    "deeply",
    "utterly",
    "truly",
    "incredibly",
    "terribly",
    "super",
];

/// Tokens that invert the effect of the next few tokens.
pub const NEGATORS: &[&str] = &[
    "not", "no", "never", "dont", "doesnt", "didnt", "isnt", "arent", "wasnt", "cant",
    "cannot", "wont", "aint", "without", "hardly",
];

const INTENSIFIER_MULTIPLIER: f32 = 1.5;
const INTENSIFIER_WINDOW: u32 = 2;
const NEGATION_WINDOW: u32 = 3;
const SECONDARY_MIN: f32 = 1.0;
const MEDIUM_CUTOFF: f32 = 3.0;
const HIGH_CUTOFF: f32 = 6.0;

const STOPWORDS: &[&str] = &[
    "that", "this", "with", "have", "what", "when", "where", "there", "their", "they", "them",
    "then", "than", "about", "would", "could", "should", "just", "like", "your", "yours",
    "from", "been", "were", "will", "into", "know", "want", "because", "some", "something",
    "anything", "here", "feel", "think", "also", "even", "only", "much", "more", "same",
    "again", "still", "these", "those", "which", "while", "yeah", "okay", "does", "doing",
    "going", "being", "over", "through", "always", "every", "other", "youre", "thats",
];

/// Per-category scores for one input, before bucketing.
#[derive(Debug, Clone, Default)]
pub struct EmotionScores {
    pub scores: FxHashMap<EmotionCategory, f32>,
    pub intensifiers: u32,
    pub words: usize,
}

impl EmotionScores {
    /// Categories by descending score; ties keep declaration order.
    pub fn ranked(&self) -> Vec<(EmotionCategory, f32)> {
        let mut ranked: Vec<(EmotionCategory, f32)> = EmotionCategory::ALL
            .iter()
            .filter_map(|c| self.scores.get(c).map(|s| (*c, *s)))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked
    }
}

/// Maps raw text to an `EmotionalState`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmotionClassifier;

impl EmotionClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify `text`, stamping the result with `at`.
    pub fn classify(&self, text: &str, at: DateTime<Utc>) -> EmotionalState {
        let scores = self.score(text);
        let ranked = scores.ranked();

        let (primary, top) = match ranked.first() {
            Some((category, score)) if *score > 0.0 => (*category, *score),
            _ => return EmotionalState::neutral(at),
        };

        let secondary = ranked
            .iter()
            .skip(1)
            .find(|(c, s)| *c != primary && *s >= SECONDARY_MIN)
            .map(|(c, _)| *c);

        let length_bonus = match scores.words {
            w if w > 25 => 2.0,
            w if w > 12 => 1.0,
            _ => 0.0,
        };
        let value = top + scores.intensifiers as f32 + length_bonus;
        let intensity = if value >= HIGH_CUTOFF {
            Intensity::High
        } else if value >= MEDIUM_CUTOFF {
            Intensity::Medium
        } else {
            Intensity::Low
        };

        EmotionalState {
            primary,
            secondary,
            intensity,
            timestamp: at,
        }
    }

    /// Raw per-category scores, exposed for diagnostics and the linter.
    pub fn score(&self, text: &str) -> EmotionScores {
        let normalized = text::normalize(text);
        let mut result = EmotionScores {
            words: text::word_count(text),
            ..EmotionScores::default()
        };
        if normalized.is_empty() {
            return result;
        }

        let mut negate_left = 0u32;
        let mut boost_left = 0u32;
        for token in normalized.split(' ') {
            if NEGATORS.contains(&token) {
                negate_left = NEGATION_WINDOW;
                continue;
            }
            if INTENSIFIERS.contains(&token) {
                result.intensifiers += 1;
                boost_left = INTENSIFIER_WINDOW;
                continue;
            }

            let hits = token_hits(token);
            if !hits.is_empty() {
                let mut multiplier = if boost_left > 0 {
                    INTENSIFIER_MULTIPLIER
                } else {
                    1.0
                };
                if negate_left > 0 {
                    multiplier = -multiplier;
                }
                for (category, weight) in hits {
                    *result.scores.entry(category).or_insert(0.0) += weight * multiplier;
                }
                boost_left = 0;
            }

            negate_left = negate_left.saturating_sub(1);
            boost_left = boost_left.saturating_sub(1);
        }

        for (phrase, category, weight) in PHRASES {
            if contains_phrase(&normalized, phrase) {
                *result.scores.entry(*category).or_insert(0.0) += weight;
            }
        }

        result
    }
}

/// Best keyword weight per category for a single token.
fn token_hits(token: &str) -> Vec<(EmotionCategory, f32)> {
    let mut hits = Vec::new();
    for (category, keywords) in LEXICON {
        let best = keywords
            .iter()
            .filter(|(kw, _)| match kw.strip_prefix('=') {
                Some(exact) => token == exact,
                None => token.contains(kw),
            })
            .map(|(_, w)| *w)
            .fold(0.0f32, f32::max);
        if best > 0.0 {
            hits.push((*category, best));
        }
    }
    hits
}

/// Phrase match on word boundaries within normalized text.
pub(crate) fn contains_phrase(normalized: &str, phrase: &str) -> bool {
    let padded = format!(" {} ", normalized);
    padded.contains(&format!(" {} ", phrase))
}

/// Content words worth remembering as topics, at most three per input.
pub fn extract_topics(text: &str) -> Vec<String> {
    let mut topics: Vec<String> = Vec::new();
    for token in text::tokens(text) {
        if token.chars().count() < 4
            || STOPWORDS.contains(&token.as_str())
            || NEGATORS.contains(&token.as_str())
            || INTENSIFIERS.contains(&token.as_str())
            || token.chars().all(|c| c.is_ascii_digit())
        {
            continue;
        }
        if !topics.contains(&token) {
            topics.push(token);
        }
        if topics.len() == 3 {
            break;
        }
    }
    topics
}

/// True when the text carries any emotional keyword at all.
pub fn is_emotionally_loaded(text: &str) -> bool {
    text::tokens(text)
        .iter()
        .any(|t| !token_hits(t).is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 31, 23, 0, 0).unwrap()
    }

    fn classify(text: &str) -> EmotionalState {
        EmotionClassifier::new().classify(text, at())
    }

    #[test]
    fn empty_and_whitespace_are_neutral_low() {
        let empty = classify("");
        let blank = classify("   \t\n ");
        assert_eq!(empty, blank);
        assert_eq!(empty.primary, Neutral);
        assert_eq!(empty.intensity, Intensity::Low);
        assert!(empty.secondary.is_none());
    }

    #[test]
    fn unmatched_is_neutral() {
        let state = classify("the train leaves at noon");
        assert_eq!(state.primary, Neutral);
        assert_eq!(state.intensity, Intensity::Low);
    }

    #[test]
    fn afraid_of_the_dark() {
        let state = classify("i am so afraid of the dark");
        assert_eq!(state.primary, Fear);
        assert!(state.intensity >= Intensity::Medium);
    }

    #[test]
    fn negation_cancels_emotion() {
        let state = classify("i am not afraid");
        assert_ne!(state.primary, Fear);
    }

    #[test]
    fn negation_window_is_limited() {
        // "afraid" sits more than three tokens after "not"
        let state = classify("not at all in the slightest afraid");
        assert_eq!(state.primary, Fear);
    }

    #[test]
    fn intensifier_raises_intensity() {
        let plain = classify("i am sad");
        let boosted = classify("i am extremely sad and so hurt");
        assert_eq!(plain.primary, Sadness);
        assert_eq!(boosted.primary, Sadness);
        assert!(boosted.intensity > plain.intensity);
    }

    #[test]
    fn secondary_is_distinct_runner_up() {
        let state = classify("i am scared and so alone here");
        assert_eq!(state.primary, Loneliness);
        assert_eq!(state.secondary, Some(Fear));
    }

    #[test]
    fn exact_tokens_do_not_match_substrings() {
        assert_eq!(classify("i made dinner").primary, Neutral);
        assert_eq!(classify("he is mad").primary, Anger);
    }

    #[test]
    fn phrases_count() {
        let state = classify("someone is watching me from behind me");
        assert_eq!(state.primary, Watching);
        assert_eq!(classify("are you real").primary, Existential);
    }

    #[test]
    fn primary_always_in_closed_set() {
        for input in ["", "?!?!", "ÆØÅ ∂∂∂", "12345", "I HATE EVERYTHING", "a b c d e f g"] {
            let state = classify(input);
            assert!(EmotionCategory::ALL.contains(&state.primary));
            assert_ne!(Some(state.primary), state.secondary);
        }
    }

    #[test]
    fn topics_skip_stopwords() {
        let topics = extract_topics("I keep thinking about the mirror in the hallway and the mirror");
        assert_eq!(topics, vec!["keep", "thinking", "mirror"]);
    }

    #[test]
    fn loaded_detection() {
        assert!(is_emotionally_loaded("i feel so alone"));
        assert!(!is_emotionally_loaded("the train leaves at noon"));
    }
}
