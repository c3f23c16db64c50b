/// Rolling conversation memory — the last N turns, most recent first,
/// plus pure reducers over that window.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::core::text;
use crate::schema::emotion::{EmotionCategory, Intensity};
use crate::schema::memory::Turn;

const TECHNICAL_WORDS: &[&str] = &[
    "code", "system", "error", "data", "file", "computer", "server", "program", "bug",
    "algorithm", "network", "process", "memory", "debug", "console", "script", "database",
];

const VERBOSE_AVG_WORDS: f32 = 15.0;

/// How the user tends to write, judged over the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StyleProfile {
    Verbose,
    Questioning,
    Emotional,
    Technical,
    Balanced,
}

/// Direction of emotional intensity across the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmotionalTrend {
    Rising,
    Falling,
    Steady,
}

/// Everything the responder needs from conversation memory.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryContext {
    pub dominant_topic: Option<String>,
    pub dominant_emotion: Option<EmotionCategory>,
    pub style: StyleProfile,
    pub trend: EmotionalTrend,
    pub last_input: Option<String>,
}

fn default_capacity() -> usize {
    8
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMemory {
    turns: VecDeque<Turn>,
    #[serde(skip, default = "default_capacity")]
    capacity: usize,
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::with_capacity(default_capacity())
    }
}

impl ConversationMemory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the capacity, evicting the oldest turns if it shrank.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.turns.truncate(self.capacity);
    }

    /// Add a turn at the front; returns the evicted oldest turn, if any.
    pub fn push(&mut self, turn: Turn) -> Option<Turn> {
        self.turns.push_front(turn);
        if self.turns.len() > self.capacity {
            self.turns.pop_back()
        } else {
            None
        }
    }

    /// Turns, most recent first.
    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.front()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Input texts, most recent first.
    pub fn recent_inputs(&self) -> Vec<String> {
        self.turns.iter().map(|t| t.input_text.clone()).collect()
    }

    /// Most frequent topic in the window; ties go to the most recent.
    pub fn dominant_topic(&self) -> Option<String> {
        let mut counts: FxHashMap<&str, usize> = FxHashMap::default();
        for turn in &self.turns {
            for topic in &turn.topics {
                *counts.entry(topic.as_str()).or_insert(0) += 1;
            }
        }
        let best = counts.values().copied().max()?;
        self.turns
            .iter()
            .flat_map(|t| t.topics.iter())
            .find(|topic| counts.get(topic.as_str()) == Some(&best))
            .cloned()
    }

    /// Most frequent non-neutral primary emotion; `Neutral` when every turn
    /// was neutral, `None` when the window is empty.
    pub fn dominant_emotion(&self) -> Option<EmotionCategory> {
        if self.turns.is_empty() {
            return None;
        }
        let mut counts: FxHashMap<EmotionCategory, usize> = FxHashMap::default();
        for turn in &self.turns {
            if !turn.emotion.is_neutral() {
                *counts.entry(turn.emotion.primary).or_insert(0) += 1;
            }
        }
        let best = match counts.values().copied().max() {
            Some(best) => best,
            None => return Some(EmotionCategory::Neutral),
        };
        self.turns
            .iter()
            .map(|t| t.emotion.primary)
            .find(|e| counts.get(e) == Some(&best))
    }

    /// Frequency-based profile of how the user writes.
    pub fn style_profile(&self) -> StyleProfile {
        if self.turns.is_empty() {
            return StyleProfile::Balanced;
        }
        let n = self.turns.len() as f32;
        let questions = self
            .turns
            .iter()
            .filter(|t| t.input_text.contains('?'))
            .count() as f32;
        let technical = self
            .turns
            .iter()
            .filter(|t| {
                text::tokens(&t.input_text)
                    .iter()
                    .any(|tok| TECHNICAL_WORDS.contains(&tok.as_str()))
            })
            .count() as f32;
        let emotional = self
            .turns
            .iter()
            .filter(|t| !t.emotion.is_neutral() && t.emotion.intensity >= Intensity::Medium)
            .count() as f32;
        let avg_words = self
            .turns
            .iter()
            .map(|t| text::word_count(&t.input_text))
            .sum::<usize>() as f32
            / n;

        if technical / n >= 0.3 {
            StyleProfile::Technical
        } else if questions / n >= 0.5 {
            StyleProfile::Questioning
        } else if emotional / n >= 0.5 {
            StyleProfile::Emotional
        } else if avg_words >= VERBOSE_AVG_WORDS {
            StyleProfile::Verbose
        } else {
            StyleProfile::Balanced
        }
    }

    /// Compares the newer half of the window against the older half.
    pub fn trend(&self) -> EmotionalTrend {
        if self.turns.len() < 2 {
            return EmotionalTrend::Steady;
        }
        let level = |t: &Turn| match (t.emotion.is_neutral(), t.emotion.intensity) {
            (true, _) => 0.0,
            (false, Intensity::Low) => 1.0,
            (false, Intensity::Medium) => 2.0,
            (false, Intensity::High) => 3.0,
        };
        let half = self.turns.len() / 2;
        let newer: f32 = self.turns.iter().take(half).map(level).sum::<f32>() / half as f32;
        let older_count = self.turns.len() - half;
        let older: f32 =
            self.turns.iter().skip(half).map(level).sum::<f32>() / older_count as f32;
        if newer - older >= 0.75 {
            EmotionalTrend::Rising
        } else if older - newer >= 0.75 {
            EmotionalTrend::Falling
        } else {
            EmotionalTrend::Steady
        }
    }

    pub fn context(&self) -> MemoryContext {
        MemoryContext {
            dominant_topic: self.dominant_topic(),
            dominant_emotion: self.dominant_emotion(),
            style: self.style_profile(),
            trend: self.trend(),
            last_input: self.last().map(|t| t.input_text.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::emotion::EmotionalState;
    use chrono::{TimeZone, Utc};

    fn turn(text: &str, primary: EmotionCategory, intensity: Intensity, topics: &[&str]) -> Turn {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        Turn {
            input_text: text.to_string(),
            emotion: EmotionalState {
                primary,
                secondary: None,
                intensity,
                timestamp: at,
            },
            topics: topics.iter().map(|t| t.to_string()).collect(),
            timestamp: at,
        }
    }

    fn plain(text: &str) -> Turn {
        turn(text, EmotionCategory::Neutral, Intensity::Low, &[])
    }

    #[test]
    fn never_exceeds_capacity_and_evicts_oldest() {
        let mut memory = ConversationMemory::with_capacity(3);
        for i in 0..3 {
            assert!(memory.push(plain(&format!("turn {}", i))).is_none());
        }
        let evicted = memory.push(plain("turn 3")).unwrap();
        assert_eq!(evicted.input_text, "turn 0");
        assert_eq!(memory.len(), 3);
        assert_eq!(memory.last().unwrap().input_text, "turn 3");
        assert_eq!(
            memory.recent_inputs(),
            vec!["turn 3", "turn 2", "turn 1"]
        );
    }

    #[test]
    fn shrinking_capacity_truncates() {
        let mut memory = ConversationMemory::with_capacity(5);
        for i in 0..5 {
            memory.push(plain(&format!("t{}", i)));
        }
        memory.set_capacity(2);
        assert_eq!(memory.recent_inputs(), vec!["t4", "t3"]);
    }

    #[test]
    fn dominant_topic_and_ties() {
        let mut memory = ConversationMemory::with_capacity(5);
        memory.push(turn("a", EmotionCategory::Neutral, Intensity::Low, &["mirror"]));
        memory.push(turn("b", EmotionCategory::Neutral, Intensity::Low, &["door"]));
        // Tie: door is more recent
        assert_eq!(memory.dominant_topic().as_deref(), Some("door"));
        memory.push(turn("c", EmotionCategory::Neutral, Intensity::Low, &["mirror"]));
        assert_eq!(memory.dominant_topic().as_deref(), Some("mirror"));
    }

    #[test]
    fn dominant_emotion_skips_neutral() {
        let mut memory = ConversationMemory::with_capacity(5);
        assert_eq!(memory.dominant_emotion(), None);
        memory.push(plain("hello"));
        assert_eq!(memory.dominant_emotion(), Some(EmotionCategory::Neutral));
        memory.push(turn("scared", EmotionCategory::Fear, Intensity::Medium, &[]));
        memory.push(plain("ok"));
        assert_eq!(memory.dominant_emotion(), Some(EmotionCategory::Fear));
    }

    #[test]
    fn style_profiles() {
        let mut memory = ConversationMemory::with_capacity(4);
        assert_eq!(memory.style_profile(), StyleProfile::Balanced);
        memory.push(plain("who are you?"));
        memory.push(plain("why?"));
        assert_eq!(memory.style_profile(), StyleProfile::Questioning);

        let mut tech = ConversationMemory::with_capacity(4);
        tech.push(plain("the server threw an error"));
        tech.push(plain("fine"));
        assert_eq!(tech.style_profile(), StyleProfile::Technical);

        let mut verbose = ConversationMemory::with_capacity(4);
        verbose.push(plain(
            "i walked all the way down the long road today and thought about everything that happened last year",
        ));
        assert_eq!(verbose.style_profile(), StyleProfile::Verbose);

        let mut emotional = ConversationMemory::with_capacity(4);
        emotional.push(turn("so sad", EmotionCategory::Sadness, Intensity::High, &[]));
        assert_eq!(emotional.style_profile(), StyleProfile::Emotional);
    }

    #[test]
    fn trend_rises() {
        let mut memory = ConversationMemory::with_capacity(4);
        memory.push(plain("a"));
        memory.push(plain("b"));
        memory.push(turn("c", EmotionCategory::Fear, Intensity::High, &[]));
        memory.push(turn("d", EmotionCategory::Fear, Intensity::High, &[]));
        assert_eq!(memory.trend(), EmotionalTrend::Rising);
    }

    #[test]
    fn ron_round_trip_keeps_order() {
        let mut memory = ConversationMemory::with_capacity(3);
        memory.push(plain("first"));
        memory.push(plain("second"));
        let serialized = ron::to_string(&memory).unwrap();
        let mut restored: ConversationMemory = ron::from_str(&serialized).unwrap();
        restored.set_capacity(3);
        assert_eq!(restored, memory);
    }
}
