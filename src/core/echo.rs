/// Echo vault — a bounded log of noteworthy past inputs, each with a
/// refracted variant, quoted back under a cooldown.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::core::classifier;
use crate::core::config::MemoryConfig;
use crate::core::text;
use crate::schema::emotion::{EmotionCategory, EmotionalState, Intensity};
use crate::schema::memory::Echo;

/// Pronoun swaps applied when refracting an input.
const REFLECTIONS: &[(&str, &str)] = &[
    ("i", "you"),
    ("im", "youre"),
    ("me", "you"),
    ("my", "your"),
    ("mine", "yours"),
    ("myself", "yourself"),
    ("am", "are"),
    ("you", "i"),
    ("your", "my"),
    ("yours", "mine"),
    ("youre", "im"),
    ("yourself", "myself"),
];

/// Preferences for choosing which echo to quote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecallQuery {
    pub emotional_match: Option<EmotionCategory>,
    pub prefer_unused: bool,
    pub prefer_recent: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EchoVault {
    echoes: Vec<Echo>,
    next_id: u64,
    last_recall_at: Option<DateTime<Utc>>,
    turns_since_recall: u32,
}

impl EchoVault {
    /// Oldest first.
    pub fn echoes(&self) -> &[Echo] {
        &self.echoes
    }

    pub fn len(&self) -> usize {
        self.echoes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.echoes.is_empty()
    }

    /// True when `text` deserves to be remembered: long enough, a question,
    /// or emotionally loaded.
    pub fn is_significant(text: &str, emotion: &EmotionalState, min_len: usize) -> bool {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return false;
        }
        trimmed.chars().count() >= min_len
            || trimmed.contains('?')
            || (!emotion.is_neutral() && emotion.intensity >= Intensity::Medium)
            || classifier::is_emotionally_loaded(trimmed)
    }

    /// Store `text` if it passes the significance filter. A repeat of an
    /// existing echo only refreshes its timestamp. Returns the stored echo.
    pub fn store(
        &mut self,
        text: &str,
        emotion: &EmotionalState,
        config: &MemoryConfig,
        now: DateTime<Utc>,
    ) -> Option<&Echo> {
        if !Self::is_significant(text, emotion, config.echo_min_len) {
            return None;
        }
        let trimmed = text.trim();

        if let Some(index) = self
            .echoes
            .iter()
            .position(|e| text::normalize(&e.text) == text::normalize(trimmed))
        {
            let mut existing = self.echoes.remove(index);
            existing.created_at = now;
            existing.emotion = emotion.primary;
            self.echoes.push(existing);
            return self.echoes.last();
        }

        let echo = Echo {
            id: self.next_id,
            text: trimmed.to_string(),
            refracted: refract(trimmed),
            emotion: emotion.primary,
            uses: 0,
            created_at: now,
            last_used_at: None,
        };
        self.next_id += 1;
        self.echoes.push(echo);
        let capacity = config.echo_capacity.max(1);
        if self.echoes.len() > capacity {
            let excess = self.echoes.len() - capacity;
            self.echoes.drain(..excess);
        }
        self.echoes.last()
    }

    /// Counts a turn toward the vault-level cooldown.
    pub fn tick(&mut self) {
        self.turns_since_recall = self.turns_since_recall.saturating_add(1);
    }

    /// The vault-level gap has passed: enough wall-clock time or enough turns.
    pub fn is_ready(&self, config: &MemoryConfig, now: DateTime<Utc>) -> bool {
        match self.last_recall_at {
            None => true,
            Some(last) => {
                now - last >= Duration::seconds(config.echo_cooldown_secs)
                    || self.turns_since_recall >= config.echo_cooldown_turns
            }
        }
    }

    /// Pick one echo per `query` without spending it.
    ///
    /// Returns `None` while the vault is cooling down, or when every echo
    /// is still inside its own per-item cooldown. Selection is
    /// deterministic: emotional match, then unused, then recency.
    pub fn select(&self, query: RecallQuery, config: &MemoryConfig, now: DateTime<Utc>) -> Option<&Echo> {
        if !self.is_ready(config, now) {
            return None;
        }
        let item_cooldown = Duration::seconds(config.echo_item_cooldown_secs);
        let count = self.echoes.len();

        self.echoes
            .iter()
            .enumerate()
            .filter(|(_, e)| e.last_used_at.map_or(true, |used| now - used >= item_cooldown))
            .filter(|(_, e)| e.created_at < now)
            .map(|(index, e)| {
                let mut score = -(e.uses as f32) * 0.5;
                if query.emotional_match == Some(e.emotion) {
                    score += 3.0;
                }
                if query.prefer_unused && e.uses == 0 {
                    score += 2.0;
                }
                if query.prefer_recent {
                    score += index as f32 / count as f32;
                }
                (e, score)
            })
            .fold(None::<(&Echo, f32)>, |best, (e, score)| match best {
                Some((_, top)) if top >= score => best,
                _ => Some((e, score)),
            })
            .map(|(e, _)| e)
    }

    /// Spend echo `id`: bump its use counter and restart both cooldowns.
    /// Returns the updated copy, or `None` if the id is unknown.
    pub fn commit(&mut self, id: u64, now: DateTime<Utc>) -> Option<Echo> {
        let echo = self.echoes.iter_mut().find(|e| e.id == id)?;
        echo.uses += 1;
        echo.last_used_at = Some(now);
        self.last_recall_at = Some(now);
        self.turns_since_recall = 0;
        tracing::debug!(echo_id = echo.id, uses = echo.uses, "echo recalled");
        Some(echo.clone())
    }

    /// `select` and `commit` in one step.
    pub fn recall(
        &mut self,
        query: RecallQuery,
        config: &MemoryConfig,
        now: DateTime<Utc>,
    ) -> Option<Echo> {
        let id = self.select(query, config, now)?.id;
        self.commit(id, now)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Reflect an input back through the narrator: swap pronouns, lowercase,
/// and trail off.
pub fn refract(input: &str) -> String {
    let words: Vec<String> = text::tokens(input)
        .into_iter()
        .map(|word| {
            REFLECTIONS
                .iter()
                .find(|(from, _)| *from == word)
                .map(|(_, to)| to.to_string())
                .unwrap_or(word)
        })
        .collect();
    if words.is_empty() {
        return String::new();
    }
    format!("{}...", words.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 3, 3, 0, 0).unwrap()
    }

    fn state(primary: EmotionCategory, intensity: Intensity) -> EmotionalState {
        EmotionalState {
            primary,
            secondary: None,
            intensity,
            timestamp: t0(),
        }
    }

    fn neutral() -> EmotionalState {
        EmotionalState::neutral(t0())
    }

    #[test]
    fn refract_swaps_pronouns() {
        assert_eq!(refract("I am afraid of my room"), "you are afraid of your room...");
        assert_eq!(refract("you scare me"), "i scare you...");
        assert_eq!(refract("   "), "");
    }

    #[test]
    fn significance_filter() {
        assert!(!EchoVault::is_significant("ok", &neutral(), 20));
        assert!(EchoVault::is_significant("why?", &neutral(), 20));
        assert!(EchoVault::is_significant("this sentence is long enough", &neutral(), 20));
        assert!(EchoVault::is_significant("alone", &neutral(), 20));
        assert!(!EchoVault::is_significant("   ", &state(EmotionCategory::Fear, Intensity::High), 20));
    }

    #[test]
    fn store_is_bounded_and_deduplicated() {
        let config = MemoryConfig {
            echo_capacity: 3,
            ..MemoryConfig::default()
        };
        let mut vault = EchoVault::default();
        for i in 0..5 {
            vault.store(&format!("question number {}?", i), &neutral(), &config, t0());
        }
        assert_eq!(vault.len(), 3);
        assert_eq!(vault.echoes()[0].text, "question number 2?");

        vault.store("Question number 2?", &neutral(), &config, t0());
        assert_eq!(vault.len(), 3);
        assert_eq!(vault.echoes()[2].text, "question number 2?");
        assert!(vault.store("ok", &neutral(), &config, t0()).is_none());
    }

    #[test]
    fn recall_respects_vault_cooldown() {
        let config = MemoryConfig::default();
        let mut vault = EchoVault::default();
        vault.store("what is behind the door?", &neutral(), &config, t0());
        vault.store("why is the mirror cold?", &neutral(), &config, t0());

        let later = t0() + Duration::seconds(5);
        assert!(vault.recall(RecallQuery::default(), &config, later).is_some());
        // Too soon, and not enough turns
        assert!(vault.recall(RecallQuery::default(), &config, later).is_none());
        for _ in 0..config.echo_cooldown_turns {
            vault.tick();
        }
        assert!(vault.recall(RecallQuery::default(), &config, later).is_some());
    }

    #[test]
    fn recall_never_returns_item_in_cooldown() {
        let config = MemoryConfig::default();
        let mut vault = EchoVault::default();
        vault.store("what is behind the door?", &neutral(), &config, t0());

        let first = t0() + Duration::seconds(1);
        assert!(vault.recall(RecallQuery::default(), &config, first).is_some());

        // Vault is ready again but the only echo is still cooling
        let second = first + Duration::seconds(config.echo_cooldown_secs);
        assert!(vault.recall(RecallQuery::default(), &config, second).is_none());

        let third = first + Duration::seconds(config.echo_item_cooldown_secs);
        assert!(vault.recall(RecallQuery::default(), &config, third).is_some());
    }

    #[test]
    fn recall_prefers_emotional_match_and_unused() {
        let config = MemoryConfig::default();
        let mut vault = EchoVault::default();
        vault.store("i cannot stop crying tonight", &state(EmotionCategory::Sadness, Intensity::High), &config, t0());
        vault.store("something is watching my window", &state(EmotionCategory::Watching, Intensity::High), &config, t0());

        let later = t0() + Duration::seconds(60);
        let query = RecallQuery {
            emotional_match: Some(EmotionCategory::Sadness),
            prefer_unused: true,
            prefer_recent: true,
        };
        let echo = vault.recall(query, &config, later).unwrap();
        assert_eq!(echo.emotion, EmotionCategory::Sadness);
        assert_eq!(echo.uses, 1);
        assert_eq!(vault.echoes()[0].uses, 1);
    }

    #[test]
    fn select_spends_nothing() {
        let config = MemoryConfig::default();
        let mut vault = EchoVault::default();
        vault.store("what is behind the door?", &neutral(), &config, t0());

        let later = t0() + Duration::seconds(5);
        let id = vault.select(RecallQuery::default(), &config, later).unwrap().id;
        assert!(vault.select(RecallQuery::default(), &config, later).is_some());
        assert_eq!(vault.echoes()[0].uses, 0);

        assert_eq!(vault.commit(id, later).unwrap().uses, 1);
        assert!(vault.select(RecallQuery::default(), &config, later).is_none());
        assert!(vault.commit(999, later).is_none());
    }

    #[test]
    fn fresh_echo_is_not_quoted_in_its_own_turn() {
        let config = MemoryConfig::default();
        let mut vault = EchoVault::default();
        vault.store("what is behind the door?", &neutral(), &config, t0());
        assert!(vault.recall(RecallQuery::default(), &config, t0()).is_none());
    }
}
