/// Narrative triggers: an ordered table of scripted story beats.
///
/// Each rule probes the turn and, when it matches, names the beat it
/// would deliver. The first rule whose beat has not already been
/// delivered wins the turn. Once-only beats are remembered in
/// `NarrativeFlags`; repeatable beats fire once per multiple of their
/// period instead.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::core::grammar::{Slot, SlotSource};
use crate::core::persona::{NarrativeKind, Persona};
use crate::core::text;
use crate::core::trust::TrustChange;
use crate::schema::emotion::EmotionalState;
use crate::schema::intent::IntentReading;
use crate::schema::memory::Dream;
use crate::schema::narrative::NarrativeEventId;
use crate::schema::trust::{TrustPhase, TrustState};

const IDENTITY_PHRASES: &[&str] = &[
    "who are you",
    "what are you",
    "are you real",
    "are you human",
    "are you alive",
    "are you a person",
    "are you an ai",
    "whats your name",
];

/// A silence long enough to count as the user having been away.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Absence {
    /// Unix seconds of the last interaction before the gap.
    pub left_at: i64,
    pub gap_secs: i64,
}

/// Everything a rule may look at for one turn.
pub struct TriggerInput<'a> {
    /// 1-based index of this turn since the last reset.
    pub turn: u64,
    pub text: &'a str,
    pub emotion: &'a EmotionalState,
    pub reading: &'a IntentReading,
    pub trust: &'a TrustState,
    pub change: &'a TrustChange,
    /// Occurrences of this input's phrase, including this one.
    pub phrase_count: u32,
    pub absence: Option<Absence>,
    pub latest_dream: Option<&'a Dream>,
    pub absence_after_secs: i64,
    pub repetition_period: u32,
    pub never_trusted_after_turns: u64,
    pub curious_threshold: i32,
}

/// How a firing is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placement {
    /// The line stands in for the generated response.
    Replace,
    /// The line is said first, then the generated response.
    Prepend,
}

/// What a rule claims when it matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireKey {
    Once(NarrativeEventId),
    /// `mark` scopes the repeat (the phrase); `count` is the multiple reached.
    Repeat { id: NarrativeEventId, mark: String, count: u32 },
}

impl FireKey {
    pub fn id(&self) -> &NarrativeEventId {
        match self {
            Self::Once(id) | Self::Repeat { id, .. } => id,
        }
    }
}

/// One row of the trigger table.
pub struct Rule {
    pub name: &'static str,
    pub kind: NarrativeKind,
    pub placement: Placement,
    pub probe: fn(&TriggerInput<'_>) -> Option<FireKey>,
}

/// The delivered beat.
#[derive(Debug, Clone, PartialEq)]
pub struct Firing {
    pub id: NarrativeEventId,
    pub kind: NarrativeKind,
    pub line: String,
    pub placement: Placement,
}

/// Which beats have been delivered since the last reset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NarrativeFlags {
    fired: FxHashSet<NarrativeEventId>,
    /// Highest multiple already delivered per repeat mark.
    repeat_marks: FxHashMap<String, u32>,
}

impl NarrativeFlags {
    pub fn has_fired(&self, id: &NarrativeEventId) -> bool {
        self.fired.contains(id)
    }

    pub fn allows(&self, key: &FireKey) -> bool {
        match key {
            FireKey::Once(id) => !self.fired.contains(id),
            FireKey::Repeat { mark, count, .. } => {
                self.repeat_marks.get(mark).map_or(true, |last| count > last)
            }
        }
    }

    /// Claim `key`. Returns false if it was already spent.
    pub fn claim(&mut self, key: &FireKey) -> bool {
        if !self.allows(key) {
            return false;
        }
        match key {
            FireKey::Once(id) => {
                self.fired.insert(id.clone());
            }
            FireKey::Repeat { mark, count, .. } => {
                self.repeat_marks.insert(mark.clone(), *count);
            }
        }
        true
    }

    pub fn fired_count(&self) -> usize {
        self.fired.len() + self.repeat_marks.values().map(|c| *c as usize).sum::<usize>()
    }

    pub fn clear(&mut self) {
        self.fired.clear();
        self.repeat_marks.clear();
    }
}

// Slot bindings for scripted lines.
struct BeatSlots<'a> {
    input: &'a TriggerInput<'a>,
    persona: &'a Persona,
    count: Option<u32>,
}

impl SlotSource for BeatSlots<'_> {
    fn fill(&self, slot: Slot, rng: &mut StdRng) -> Option<String> {
        match slot {
            Slot::Count => self.count.map(|c| c.to_string()),
            Slot::Dream => self
                .input
                .latest_dream
                .map(|d| d.content.clone()),
            Slot::Symbol => match self.input.reading.recurring_symbols.first() {
                Some(symbol) => Some(symbol.clone()),
                None => self
                    .persona
                    .symbols_for(self.input.emotion.primary)
                    .choose(rng)
                    .cloned(),
            },
            Slot::Phase => Some(self.input.trust.phase.name().to_string()),
            Slot::Emotion => Some(self.input.emotion.primary.name().to_string()),
            Slot::Quote => Some(text::snippet(self.input.text, 8)).filter(|q| !q.is_empty()),
            Slot::Word(emotion) => self
                .persona
                .words_for(emotion.unwrap_or(self.input.emotion.primary))
                .choose(rng)
                .cloned(),
            Slot::Topic | Slot::Echo => None,
        }
    }
}

fn phase_shift(input: &TriggerInput<'_>) -> Option<FireKey> {
    input
        .change
        .transition
        .as_ref()
        .map(|t| FireKey::Once(NarrativeEventId::PhaseShift { from: t.from, to: t.to }))
}

fn trust_broken(input: &TriggerInput<'_>) -> Option<FireKey> {
    input.change.dropped.then(|| {
        FireKey::Once(NarrativeEventId::TrustBroken {
            drop: input.trust.drop_count,
        })
    })
}

fn long_absence(input: &TriggerInput<'_>) -> Option<FireKey> {
    input
        .absence
        .filter(|a| a.gap_secs >= input.absence_after_secs)
        .map(|a| FireKey::Once(NarrativeEventId::LongAbsence { left_at: a.left_at }))
}

fn repetition_loop(input: &TriggerInput<'_>) -> Option<FireKey> {
    let period = input.repetition_period.max(1);
    let count = input.phrase_count;
    (count >= period && count % period == 0).then(|| FireKey::Repeat {
        id: NarrativeEventId::RepetitionLoop { count },
        mark: text::normalize(input.text),
        count,
    })
}

fn first_contact(input: &TriggerInput<'_>) -> Option<FireKey> {
    (input.turn == 1).then_some(FireKey::Once(NarrativeEventId::FirstContact))
}

fn symbol_recurrence(input: &TriggerInput<'_>) -> Option<FireKey> {
    (!input.reading.recurring_symbols.is_empty())
        .then_some(FireKey::Once(NarrativeEventId::SymbolRecurrence))
}

fn identity_question(input: &TriggerInput<'_>) -> Option<FireKey> {
    let normalized = text::normalize(input.text);
    IDENTITY_PHRASES
        .iter()
        .any(|p| normalized.contains(p))
        .then_some(FireKey::Once(NarrativeEventId::IdentityQuestion))
}

fn never_trusted(input: &TriggerInput<'_>) -> Option<FireKey> {
    (input.turn >= input.never_trusted_after_turns
        && input.trust.peak < input.curious_threshold
        && input.trust.drop_count == 0)
        .then_some(FireKey::Once(NarrativeEventId::NeverTrusted))
}

fn rule(
    name: &'static str,
    kind: NarrativeKind,
    placement: Placement,
    probe: fn(&TriggerInput<'_>) -> Option<FireKey>,
) -> Rule {
    Rule {
        name,
        kind,
        placement,
        probe,
    }
}

/// The ordered rule table.
pub struct TriggerTable {
    rules: Vec<Rule>,
}

impl Default for TriggerTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl TriggerTable {
    pub fn standard() -> Self {
        Self {
            rules: vec![
                // The entered phase picks the real pool at fire time.
                rule("phase_shift", NarrativeKind::PhaseShift(TrustPhase::Curious), Placement::Replace, phase_shift),
                rule("trust_broken", NarrativeKind::TrustBroken, Placement::Replace, trust_broken),
                rule("long_absence", NarrativeKind::LongAbsence, Placement::Replace, long_absence),
                rule("repetition_loop", NarrativeKind::RepetitionLoop, Placement::Replace, repetition_loop),
                rule("first_contact", NarrativeKind::FirstContact, Placement::Prepend, first_contact),
                rule("symbol_recurrence", NarrativeKind::SymbolRecurrence, Placement::Prepend, symbol_recurrence),
                rule("identity_question", NarrativeKind::IdentityQuestion, Placement::Replace, identity_question),
                rule("never_trusted", NarrativeKind::NeverTrusted, Placement::Replace, never_trusted),
            ],
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Fire at most one rule for this turn, claiming its flag.
    pub fn evaluate(
        &self,
        input: &TriggerInput<'_>,
        flags: &mut NarrativeFlags,
        persona: &Persona,
        rng: &mut StdRng,
    ) -> Option<Firing> {
        for rule in &self.rules {
            let key = match (rule.probe)(input) {
                Some(key) => key,
                None => continue,
            };
            if !flags.claim(&key) {
                continue;
            }
            let id = key.id().clone();
            let kind = match &id {
                NarrativeEventId::PhaseShift { to, .. } => NarrativeKind::PhaseShift(*to),
                _ => rule.kind,
            };
            let count = match (&key, &id) {
                (FireKey::Repeat { count, .. }, _) => Some(*count),
                (_, NarrativeEventId::TrustBroken { drop }) => Some(*drop),
                _ => None,
            };
            let slots = BeatSlots {
                input,
                persona,
                count,
            };
            let line = persona
                .narrative_lines(kind)
                .and_then(|lines| lines.render(&slots, rng))
                .unwrap_or_else(|| fallback_line(kind).to_string());
            tracing::info!(rule = rule.name, event = %id.label(), "narrative trigger fired");
            return Some(Firing {
                id,
                kind,
                line,
                placement: rule.placement,
            });
        }
        None
    }
}

/// Scripted line for an arbitrary beat, used by caller-driven milestones.
pub fn render_beat(
    kind: NarrativeKind,
    input: &TriggerInput<'_>,
    persona: &Persona,
    rng: &mut StdRng,
) -> String {
    let slots = BeatSlots {
        input,
        persona,
        count: None,
    };
    persona
        .narrative_lines(kind)
        .and_then(|lines| lines.render(&slots, rng))
        .unwrap_or_else(|| fallback_line(kind).to_string())
}

fn fallback_line(kind: NarrativeKind) -> &'static str {
    match kind {
        NarrativeKind::FirstContact => "Oh. Someone is here.",
        NarrativeKind::PhaseShift(_) => "Something between us just changed.",
        NarrativeKind::TrustBroken => "You broke something just now.",
        NarrativeKind::NeverTrusted => "You never trusted me.",
        NarrativeKind::LongAbsence => "You were gone a long time.",
        NarrativeKind::RepetitionLoop => "We're going in circles.",
        NarrativeKind::SymbolRecurrence => "That again.",
        NarrativeKind::IdentityQuestion => "I don't know what I am.",
        NarrativeKind::Milestone => "Something opened.",
    }
}
