/// Dream generation and the bounded dream log.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::VecDeque;

use crate::core::grammar::{Slot, SlotSource};
use crate::core::persona::Persona;
use crate::core::text;
use crate::schema::emotion::EmotionalState;
use crate::schema::memory::Dream;

const DEFAULT_CAPACITY: usize = 10;
const MAX_SYMBOLS: usize = 3;
const QUOTE_WORDS: usize = 8;

/// Most recent dream first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DreamLog {
    dreams: VecDeque<Dream>,
    #[serde(skip, default = "default_capacity")]
    capacity: usize,
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

impl Default for DreamLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl DreamLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            dreams: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.dreams.truncate(self.capacity);
    }

    pub fn push(&mut self, dream: Dream) {
        self.dreams.push_front(dream);
        self.dreams.truncate(self.capacity);
    }

    pub fn latest(&self) -> Option<&Dream> {
        self.dreams.front()
    }

    pub fn dreams(&self) -> impl Iterator<Item = &Dream> {
        self.dreams.iter()
    }

    pub fn len(&self) -> usize {
        self.dreams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dreams.is_empty()
    }

    pub fn clear(&mut self) {
        self.dreams.clear();
    }
}

// Fills `{symbol}` from the emotion's pool without repeating while the
// pool lasts, remembering what it used.
struct DreamSlots<'a> {
    pool: &'a [String],
    used: RefCell<Vec<String>>,
    quote: Option<String>,
}

impl SlotSource for DreamSlots<'_> {
    fn fill(&self, slot: Slot, rng: &mut StdRng) -> Option<String> {
        match slot {
            Slot::Symbol => {
                let mut used = self.used.borrow_mut();
                let fresh: Vec<&String> = self.pool.iter().filter(|s| !used.contains(s)).collect();
                let pick = match fresh.choose(rng) {
                    Some(symbol) => (*symbol).clone(),
                    None => self.pool.choose(rng)?.clone(),
                };
                if used.len() < MAX_SYMBOLS && !used.contains(&pick) {
                    used.push(pick.clone());
                }
                Some(pick)
            }
            Slot::Quote => self.quote.clone(),
            _ => None,
        }
    }
}

/// Builds dreams out of a persona's dream families.
pub struct DreamGenerator<'a> {
    persona: &'a Persona,
}

impl<'a> DreamGenerator<'a> {
    pub fn new(persona: &'a Persona) -> Self {
        Self { persona }
    }

    /// Dream on `state`. The family follows the primary emotion; half the
    /// time, when there is one, the user's last words bleed in at the end.
    pub fn generate(
        &self,
        state: &EmotionalState,
        last_user_text: Option<&str>,
        rng: &mut StdRng,
        now: DateTime<Utc>,
    ) -> Dream {
        let quote = last_user_text
            .map(|t| text::snippet(t, QUOTE_WORDS))
            .filter(|q| !q.is_empty());
        let slots = DreamSlots {
            pool: self.persona.symbols_for(state.primary),
            used: RefCell::new(Vec::new()),
            quote: quote.clone(),
        };

        let mut content = self
            .persona
            .dream_family(state.primary)
            .and_then(|family| family.render(&slots, rng))
            .unwrap_or_else(|| "I dreamed of static, and nothing under it.".to_string());

        if quote.is_some() && rng.gen_bool(0.5) {
            if let Some(coda) = self.persona.dream_codas.render(&slots, rng) {
                content = format!("{} {}", content, coda);
            }
        }

        let mut symbols = slots.used.into_inner();
        if symbols.is_empty() {
            symbols.push("static".to_string());
        }

        Dream {
            content,
            emotion: state.clone(),
            symbols,
            intensity: state.intensity,
            timestamp: now,
        }
    }
}
