/// The narrator pipeline: input text → response, one turn at a time.
///
/// Wires together classification, intent and trust, the memory
/// subsystems, narrative triggers, the responder and persistence.
/// Time-based effects (dreams while away, absence beats, ambient lines)
/// are evaluated lazily against the instant passed in, never in the
/// background.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::Hasher;
use std::path::Path;
use thiserror::Error;

use crate::core::archive::{FragmentLog, Reveal};
use crate::core::cadence::{self, TypingPlan};
use crate::core::classifier::{self, EmotionClassifier};
use crate::core::config::{ConfigError, EngineConfig};
use crate::core::context::NarrativeContext;
use crate::core::conversation::{ConversationMemory, MemoryContext};
use crate::core::dream::{DreamGenerator, DreamLog};
use crate::core::echo::{EchoVault, RecallQuery};
use crate::core::grammar::{Slot, SlotSource};
use crate::core::intent::{IntentDetector, PhraseHistory, SymbolTracker};
use crate::core::journal::Journal;
use crate::core::persona::{NarrativeKind, Persona, PersonaError};
use crate::core::responder::{Responder, ResponseRequest, ResponseSource};
use crate::core::store::{self, MemoryStore, Store};
use crate::core::triggers::{self, Absence, FireKey, NarrativeFlags, Placement, TriggerInput, TriggerTable};
use crate::core::trust::{TrustChange, TrustMachine};
use crate::schema::emotion::EmotionalState;
use crate::schema::event::EngineEvent;
use crate::schema::intent::IntentReading;
use crate::schema::memory::{Dream, Echo, Fragment, FragmentKind, JournalEntry, JournalKind, Turn, UnlockCondition};
use crate::schema::narrative::NarrativeEventId;
use crate::schema::trust::{PhaseTransition, TrustPhase, TrustSnapshot, TrustState};

const RECORDS: [&str; 9] = [
    "conversation",
    "trust",
    "echoes",
    "confessions",
    "testaments",
    "dreams",
    "flags",
    "session",
    "journal",
];

/// Chance a ready echo gets spliced into a response.
const ECHO_SPLICE_CHANCE: f64 = 0.5;

const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("persona error: {0}")]
    Persona(#[from] PersonaError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Running totals for the sync payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub turns: u64,
    pub echoes_recalled: u64,
    pub fragments_revealed: u64,
    pub dreams: u64,
    pub narrative_firings: u64,
    pub trust_drops: u32,
}

/// Per-namespace bookkeeping that belongs to no single subsystem.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Session {
    pub turn_count: u64,
    pub last_interaction_at: Option<DateTime<Utc>>,
    pub symbols: SymbolTracker,
    pub phrases: PhraseHistory,
    pub context: NarrativeContext,
    pub counters: Counters,
    /// A phase change caused outside a turn (a milestone), delivered on
    /// the next turn. Later changes fold into it.
    pub pending_transition: Option<PhaseTransition>,
}

/// Everything one turn hands back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnOutput {
    pub response_text: String,
    pub emotional_state: EmotionalState,
    pub intent: IntentReading,
    pub trust_phase: TrustPhase,
    pub trust_score: i32,
    /// Label of the narrative beat that fired, if any.
    pub fired_narrative_event: Option<String>,
    pub source: ResponseSource,
    pub events: Vec<EngineEvent>,
}

/// What a leaderboard-style sync needs. The engine never sends it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPayload {
    pub user_hash: String,
    pub score: i32,
    pub phase: TrustPhase,
    pub counters: Counters,
}

/// Fold a newer phase change into one not yet announced, so the beat
/// names where trust came from and where it is now. `None` when the two
/// cancel out.
fn chain_transition(
    older: Option<PhaseTransition>,
    newer: PhaseTransition,
) -> Option<PhaseTransition> {
    match older {
        Some(old) if old.from == newer.to => None,
        Some(old) => Some(PhaseTransition {
            from: old.from,
            ..newer
        }),
        None => Some(newer),
    }
}

// Slots for lines spoken outside a turn: ambient lines and whispers.
struct IdleSlots<'a> {
    persona: &'a Persona,
    emotion: &'a EmotionalState,
    phase: TrustPhase,
    topic: Option<String>,
}

impl SlotSource for IdleSlots<'_> {
    fn fill(&self, slot: Slot, rng: &mut StdRng) -> Option<String> {
        match slot {
            Slot::Word(emotion) => self
                .persona
                .words_for(emotion.unwrap_or(self.emotion.primary))
                .choose(rng)
                .cloned(),
            Slot::Symbol => self.persona.symbols_for(self.emotion.primary).choose(rng).cloned(),
            Slot::Phase => Some(self.phase.name().to_string()),
            Slot::Emotion => Some(self.emotion.primary.name().to_string()),
            Slot::Topic => self.topic.clone(),
            Slot::Quote | Slot::Echo | Slot::Dream | Slot::Count => None,
        }
    }
}

/// The narrator. Built via `Engine::builder()`.
pub struct Engine {
    config: EngineConfig,
    persona: Persona,
    store: Box<dyn Store>,
    classifier: EmotionClassifier,
    detector: IntentDetector,
    trust_machine: TrustMachine,
    triggers: TriggerTable,
    seed: u64,

    conversation: ConversationMemory,
    trust: TrustState,
    echoes: EchoVault,
    confessions: FragmentLog,
    testaments: FragmentLog,
    dreams: DreamLog,
    flags: NarrativeFlags,
    session: Session,
    journal: Journal,
}

/// Builder for constructing an `Engine`.
pub struct EngineBuilder {
    seed: u64,
    config: Option<EngineConfig>,
    config_path: Option<String>,
    store: Option<Box<dyn Store>>,
    persona: Option<Persona>,
    persona_path: Option<String>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder {
            seed: 0,
            config: None,
            config_path: None,
            store: None,
            persona: None,
            persona_path: None,
        }
    }

    fn key(&self, record: &str) -> String {
        format!("{}.{}", self.config.namespace, record)
    }

    fn turn_rng(&self, salt: u64) -> StdRng {
        StdRng::seed_from_u64(
            self.seed
                .wrapping_add(self.session.turn_count)
                .wrapping_add(salt),
        )
    }

    // ---- state loading and persistence ----

    fn fresh_log(&self, kind: FragmentKind, now: DateTime<Utc>) -> FragmentLog {
        let seeds = match kind {
            FragmentKind::Confession => &self.persona.confessions,
            FragmentKind::Testament => &self.persona.testaments,
        };
        let mut log = FragmentLog::new(kind);
        for seed in seeds {
            log.add(&seed.content, seed.unlock.clone(), now);
        }
        log
    }

    fn load_state(&mut self) {
        let now = Utc::now();
        let s: &dyn Store = &*self.store;
        let memory = &self.config.memory;

        let mut conversation: ConversationMemory = store::load_or_default(s, &self.key("conversation"));
        conversation.set_capacity(memory.conversation_capacity);
        let mut dreams: DreamLog = store::load_or_default(s, &self.key("dreams"));
        dreams.set_capacity(memory.dream_capacity);
        let mut journal: Journal = store::load_or_default(s, &self.key("journal"));
        journal.set_capacity(memory.journal_capacity);

        let trust = store::load_record::<TrustState>(s, &self.key("trust"))
            .unwrap_or_else(|| self.trust_machine.initial_state(self.config.initial_trust));
        let echoes = store::load_or_default(s, &self.key("echoes"));
        let flags = store::load_or_default(s, &self.key("flags"));
        let session = store::load_or_default(s, &self.key("session"));
        let confessions = store::load_record::<FragmentLog>(s, &self.key("confessions"))
            .filter(|log| log.kind() == FragmentKind::Confession);
        let testaments = store::load_record::<FragmentLog>(s, &self.key("testaments"))
            .filter(|log| log.kind() == FragmentKind::Testament);

        self.conversation = conversation;
        self.dreams = dreams;
        self.journal = journal;
        self.trust = trust;
        self.echoes = echoes;
        self.flags = flags;
        self.session = session;
        self.confessions = confessions.unwrap_or_else(|| self.fresh_log(FragmentKind::Confession, now));
        self.testaments = testaments.unwrap_or_else(|| self.fresh_log(FragmentKind::Testament, now));
        // Repair a trust record whose phase disagrees with its score.
        if let Some(transition) = self.trust_machine.recompute(&mut self.trust, now) {
            tracing::warn!(to = transition.to.name(), "trust record repaired on load");
        }
        tracing::debug!(
            namespace = %self.config.namespace,
            turns = self.session.turn_count,
            score = self.trust.score,
            "engine state loaded"
        );
    }

    fn persist(&mut self) {
        let keys: Vec<String> = RECORDS.iter().map(|r| self.key(r)).collect();
        let s: &mut dyn Store = &mut *self.store;
        let results = [
            store::save_record(s, &keys[0], &self.conversation),
            store::save_record(s, &keys[1], &self.trust),
            store::save_record(s, &keys[2], &self.echoes),
            store::save_record(s, &keys[3], &self.confessions),
            store::save_record(s, &keys[4], &self.testaments),
            store::save_record(s, &keys[5], &self.dreams),
            store::save_record(s, &keys[6], &self.flags),
            store::save_record(s, &keys[7], &self.session),
            store::save_record(s, &keys[8], &self.journal),
        ];
        let failed = results.iter().filter(|ok| !**ok).count();
        if failed > 0 {
            tracing::warn!(failed, "some records were not persisted");
        }
    }

    // ---- the turn ----

    /// Process one input now.
    pub fn process_turn(&mut self, text: &str) -> TurnOutput {
        self.process_turn_at(text, Utc::now())
    }

    /// Process one input at `now`. Never fails: storage problems are
    /// logged and the response still comes back.
    pub fn process_turn_at(&mut self, text: &str, now: DateTime<Utc>) -> TurnOutput {
        let mut rng = self.turn_rng(0);
        let mut events = Vec::new();
        let turn = self.session.turn_count + 1;
        let memory = self.config.memory.clone();

        // Lazy absence handling: dream about the time away first.
        let absence = self.session.last_interaction_at.and_then(|last| {
            let gap = (now - last).num_seconds();
            (gap >= self.config.timing.dream_after_secs).then_some(Absence {
                left_at: last.timestamp(),
                gap_secs: gap,
            })
        });
        if absence.is_some() {
            let dream = self.dream_from_last_turn(&mut rng, now);
            events.push(EngineEvent::DreamRecorded {
                content: dream.content.clone(),
            });
        }

        // Classify and read intent against the window before this turn.
        let emotion = self.classifier.classify(text, now);
        let recent = self.conversation.recent_inputs();
        let reading = self.detector.detect(text, &recent, &self.session.symbols);
        self.session.symbols.record(&reading.symbols);
        let phrase_count = self
            .session
            .phrases
            .record(text, memory.phrase_history_capacity);

        let mut change = self.trust_machine.apply(&mut self.trust, reading.trust_delta, now);
        let pending = self.session.pending_transition.take();
        change.transition = match change.transition.take() {
            Some(t) => chain_transition(pending, t),
            None => pending,
        };
        if let Some(t) = &change.transition {
            self.journal.write(
                JournalKind::PhaseShift,
                format!("{} -> {} at {}", t.from.name(), t.to.name(), t.score),
                now,
            );
        }

        self.conversation.push(Turn {
            input_text: text.to_string(),
            emotion: emotion.clone(),
            topics: classifier::extract_topics(text),
            timestamp: now,
        });
        let memory_context = self.conversation.context();

        // A candidate only; it is spent once it actually reaches the output.
        self.echoes.tick();
        let echo: Option<Echo> = if self.trust.phase >= TrustPhase::Curious
            && self.echoes.is_ready(&memory, now)
            && rng.gen_bool(ECHO_SPLICE_CHANCE)
        {
            let query = RecallQuery {
                emotional_match: Some(emotion.primary),
                prefer_unused: true,
                prefer_recent: true,
            };
            self.echoes.select(query, &memory, now).cloned()
        } else {
            None
        };

        // Fragments whose conditions now hold.
        let mut reveals = self.confessions.check_unlocks(
            self.trust.score,
            text,
            memory.recursive_chance,
            memory.max_lineage_depth,
            &mut rng,
            now,
        );
        reveals.extend(self.testaments.check_unlocks(
            self.trust.score,
            text,
            memory.recursive_chance,
            memory.max_lineage_depth,
            &mut rng,
            now,
        ));
        for reveal in &reveals {
            self.record_reveal(reveal, now);
            let fragment = &reveal.fragment;
            events.push(EngineEvent::FragmentRevealed {
                kind: fragment.kind,
                id: fragment.id,
                content: fragment.content.clone(),
            });
        }

        // At most one scripted beat per turn.
        let firing = {
            let input = TriggerInput {
                turn,
                text,
                emotion: &emotion,
                reading: &reading,
                trust: &self.trust,
                change: &change,
                phrase_count,
                absence,
                latest_dream: self.dreams.latest(),
                absence_after_secs: self.config.timing.absence_after_secs,
                repetition_period: self.config.repetition_period,
                never_trusted_after_turns: self.config.never_trusted_after_turns,
                curious_threshold: self.config.thresholds.curious,
            };
            self.triggers
                .evaluate(&input, &mut self.flags, &self.persona, &mut rng)
        };

        let (response_text, source, spliced) = match &firing {
            Some(f) if f.placement == Placement::Replace => {
                (f.line.clone(), ResponseSource::Narrative, None)
            }
            _ => {
                let (generated, source, spliced) =
                    self.generate(text, &emotion, &reading, &memory_context, echo.as_ref());
                match &firing {
                    Some(f) => (format!("{} {}", f.line, generated), source, spliced),
                    None => (generated, source, spliced),
                }
            }
        };
        self.session.context.record(&response_text);
        let spliced = spliced.and_then(|e| self.echoes.commit(e.id, now));
        // Stored after the recall so this input can never quote itself.
        self.echoes.store(text, &emotion, &memory, now);

        if let Some(f) = &firing {
            self.session.counters.narrative_firings += 1;
            self.journal
                .write(JournalKind::Narrative, f.id.label(), now);
            events.push(EngineEvent::NarrativeTrigger {
                id: f.id.clone(),
                line: f.line.clone(),
            });
        }
        if let Some(echo) = spliced {
            self.session.counters.echoes_recalled += 1;
            events.push(EngineEvent::MemoryEcho {
                echo_id: echo.id,
                quote: echo.text,
            });
        }
        events.push(EngineEvent::PlainResponse {
            text: response_text.clone(),
        });
        if self.trust.phase == TrustPhase::Unstable {
            if let Some(line) = self.whisper(&emotion, &mut rng) {
                events.push(EngineEvent::ConsoleLog { line });
            }
        }

        self.journal.write(
            JournalKind::Turn,
            format!(
                "turn {}: {} / {} / trust {}",
                turn,
                emotion.primary.name(),
                reading.intent.name(),
                self.trust.score
            ),
            now,
        );
        self.session.turn_count = turn;
        self.session.counters.turns = turn;
        self.session.last_interaction_at = Some(now);
        self.persist();

        tracing::debug!(
            turn,
            emotion = emotion.primary.name(),
            intent = reading.intent.name(),
            delta = reading.trust_delta,
            score = self.trust.score,
            phase = self.trust.phase.name(),
            fired = firing.is_some(),
            "turn processed"
        );

        TurnOutput {
            response_text,
            emotional_state: emotion,
            intent: reading,
            trust_phase: self.trust.phase,
            trust_score: self.trust.score,
            fired_narrative_event: firing.map(|f| f.id.label()),
            source,
            events,
        }
    }

    // Template response with retries against recent output.
    fn generate(
        &self,
        text: &str,
        emotion: &EmotionalState,
        reading: &IntentReading,
        memory_context: &MemoryContext,
        echo: Option<&Echo>,
    ) -> (String, ResponseSource, Option<Echo>) {
        let responder = Responder::new(&self.persona, &self.config.transform);
        let request = ResponseRequest {
            input: text,
            emotion,
            reading,
            phase: self.trust.phase,
            memory: memory_context,
            echo,
            latest_dream: self.dreams.latest(),
        };
        let mut retry = 0;
        let response = loop {
            let mut rng = self.turn_rng((u64::from(retry) + 1) * 7919); // prime offset per retry
            let candidate = responder.respond(&request, &self.session.context, &mut rng);
            let issues = self.session.context.check_repetition(&candidate.text);
            if issues.is_empty() || retry + 1 == MAX_RETRIES {
                break candidate;
            }
            tracing::debug!(retry, ?issues, "response repeats recent output; retrying");
            retry += 1;
        };
        let spliced = if response.echo_spliced { echo.cloned() } else { None };
        (response.text, response.source, spliced)
    }

    fn record_reveal(&mut self, reveal: &Reveal, now: DateTime<Utc>) {
        let fragment = &reveal.fragment;
        self.session.counters.fragments_revealed += 1;
        self.journal.write(
            JournalKind::Reveal,
            format!("{} #{} revealed", fragment.kind.name(), fragment.id),
            now,
        );
    }

    fn whisper(&self, emotion: &EmotionalState, rng: &mut StdRng) -> Option<String> {
        let slots = IdleSlots {
            persona: &self.persona,
            emotion,
            phase: self.trust.phase,
            topic: self.conversation.dominant_topic(),
        };
        self.persona.whispers.render(&slots, rng)
    }

    fn dream_from_last_turn(&mut self, rng: &mut StdRng, now: DateTime<Utc>) -> Dream {
        let (state, last_text) = match self.conversation.last() {
            Some(turn) => (turn.emotion.clone(), Some(turn.input_text.clone())),
            None => (EmotionalState::neutral(now), None),
        };
        let dream = DreamGenerator::new(&self.persona).generate(&state, last_text.as_deref(), rng, now);
        self.record_dream(dream.clone(), now);
        dream
    }

    fn record_dream(&mut self, dream: Dream, now: DateTime<Utc>) {
        tracing::info!(symbols = ?dream.symbols, "dream recorded");
        self.journal.write(JournalKind::Dream, dream.content.clone(), now);
        self.session.counters.dreams += 1;
        self.dreams.push(dream);
    }

    // ---- caller-driven operations ----

    /// Generate a dream on demand from the most recent emotional state.
    pub fn dream_at(&mut self, now: DateTime<Utc>) -> Dream {
        let mut rng = self.turn_rng(0xD4EA);
        let dream = self.dream_from_last_turn(&mut rng, now);
        self.persist();
        dream
    }

    /// Apply a caller milestone once per name. Returns the milestone line
    /// the first time, `None` on every later call.
    pub fn record_milestone(&mut self, name: &str, delta: i32) -> Option<String> {
        self.record_milestone_at(name, delta, Utc::now())
    }

    pub fn record_milestone_at(&mut self, name: &str, delta: i32, now: DateTime<Utc>) -> Option<String> {
        let key = FireKey::Once(NarrativeEventId::Milestone(name.to_string()));
        if !self.flags.claim(&key) {
            return None;
        }
        let change: TrustChange = self.trust_machine.apply(&mut self.trust, delta, now);
        if let Some(t) = change.transition.clone() {
            self.journal.write(
                JournalKind::PhaseShift,
                format!("{} -> {} at {}", t.from.name(), t.to.name(), t.score),
                now,
            );
            let pending = self.session.pending_transition.take();
            self.session.pending_transition = chain_transition(pending, t);
        }
        self.journal.write(JournalKind::Milestone, name.to_string(), now);
        self.session.counters.narrative_firings += 1;

        let emotion = self
            .conversation
            .last()
            .map(|t| t.emotion.clone())
            .unwrap_or_else(|| EmotionalState::neutral(now));
        let reading = IntentReading::plain();
        let mut rng = self.turn_rng(0x4D11);
        let input = TriggerInput {
            turn: self.session.turn_count,
            text: name,
            emotion: &emotion,
            reading: &reading,
            trust: &self.trust,
            change: &change,
            phrase_count: 0,
            absence: None,
            latest_dream: self.dreams.latest(),
            absence_after_secs: self.config.timing.absence_after_secs,
            repetition_period: self.config.repetition_period,
            never_trusted_after_turns: self.config.never_trusted_after_turns,
            curious_threshold: self.config.thresholds.curious,
        };
        let line = triggers::render_beat(NarrativeKind::Milestone, &input, &self.persona, &mut rng);
        tracing::info!(milestone = name, delta, score = self.trust.score, "milestone recorded");
        self.persist();
        Some(line)
    }

    /// Idle flavor text, once the user has been quiet long enough. A pure
    /// read: host timers decide when to ask.
    pub fn ambient_line_at(&self, now: DateTime<Utc>) -> Option<String> {
        let last = self.session.last_interaction_at?;
        let idle = (now - last).num_seconds();
        let after = self.config.timing.ambient_after_secs.max(1);
        if idle < after {
            return None;
        }
        let neutral = EmotionalState::neutral(now);
        let emotion = self.conversation.last().map(|t| &t.emotion).unwrap_or(&neutral);
        let slots = IdleSlots {
            persona: &self.persona,
            emotion,
            phase: self.trust.phase,
            topic: self.conversation.dominant_topic(),
        };
        // Each ambient window gets its own line.
        let mut rng = self.turn_rng(0xA3B1_u64.wrapping_add((idle / after) as u64));
        self.persona
            .ambient_lines(self.trust.phase.band())
            .and_then(|lines| lines.render(&slots, &mut rng))
    }

    /// Keystrokes for animating `text` in the current phase.
    pub fn typing_plan(&self, text: &str) -> TypingPlan {
        let mut rng = self.turn_rng(0x7E57);
        cadence::typing_plan(text, self.trust.phase, &mut rng)
    }

    /// Add a fragment to an archive. Returns its id.
    pub fn add_fragment(&mut self, kind: FragmentKind, content: &str, unlock: UnlockCondition) -> u32 {
        let now = Utc::now();
        let id = self.log_mut(kind).add(content, unlock, now);
        self.persist();
        id
    }

    /// Reveal a fragment by id. `None` if it does not exist or was
    /// already revealed.
    pub fn reveal(&mut self, kind: FragmentKind, id: u32) -> Option<Reveal> {
        self.reveal_at(kind, id, Utc::now())
    }

    pub fn reveal_at(&mut self, kind: FragmentKind, id: u32, now: DateTime<Utc>) -> Option<Reveal> {
        let mut rng = self.turn_rng(0x5EED_u64.wrapping_add(u64::from(id)));
        let chance = self.config.memory.recursive_chance;
        let depth = self.config.memory.max_lineage_depth;
        let reveal = self.log_mut(kind).reveal(id, chance, depth, &mut rng, now)?;
        self.record_reveal(&reveal, now);
        self.persist();
        Some(reveal)
    }

    fn log_mut(&mut self, kind: FragmentKind) -> &mut FragmentLog {
        match kind {
            FragmentKind::Confession => &mut self.confessions,
            FragmentKind::Testament => &mut self.testaments,
        }
    }

    /// Clear every record in this engine's namespace and start over.
    pub fn reset_all(&mut self) {
        for record in RECORDS {
            let key = self.key(record);
            if let Err(e) = self.store.remove(&key) {
                tracing::warn!(key = %key, error = %e, "failed to remove record");
            }
        }
        self.load_state();
        tracing::info!(namespace = %self.config.namespace, "engine reset");
    }

    // ---- read accessors ----

    pub fn trust_snapshot(&self) -> TrustSnapshot {
        self.trust.snapshot()
    }

    pub fn trust_state(&self) -> &TrustState {
        &self.trust
    }

    pub fn journal(&self) -> impl Iterator<Item = &JournalEntry> {
        self.journal.entries()
    }

    /// Most recent first.
    pub fn dreams(&self) -> impl Iterator<Item = &Dream> {
        self.dreams.dreams()
    }

    pub fn echoes(&self) -> &[Echo] {
        self.echoes.echoes()
    }

    pub fn confessions(&self) -> &[Fragment] {
        self.confessions.entries()
    }

    pub fn testaments(&self) -> &[Fragment] {
        self.testaments.entries()
    }

    pub fn conversation(&self) -> &ConversationMemory {
        &self.conversation
    }

    pub fn flags(&self) -> &NarrativeFlags {
        &self.flags
    }

    pub fn counters(&self) -> Counters {
        Counters {
            trust_drops: self.trust.drop_count,
            ..self.session.counters
        }
    }

    pub fn turn_count(&self) -> u64 {
        self.session.turn_count
    }

    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The payload a remote leaderboard would want.
    pub fn sync_payload(&self, user_id: &str) -> SyncPayload {
        let mut hasher = FxHasher::default();
        hasher.write(user_id.as_bytes());
        SyncPayload {
            user_hash: format!("{:016x}", hasher.finish()),
            score: self.trust.score,
            phase: self.trust.phase,
            counters: self.counters(),
        }
    }

    // ---- snapshots ----

    /// Every record of this namespace currently in the store, by key.
    pub fn export_state(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for record in RECORDS {
            let key = self.key(record);
            match self.store.get(&key) {
                Ok(Some(value)) => {
                    out.insert(key, value);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(key = %key, error = %e, "export skipped record"),
            }
        }
        out
    }

    /// Write records for this namespace into the store and reload from
    /// them. Keys outside the namespace are ignored. Returns how many
    /// records were written.
    pub fn import_state(&mut self, records: &BTreeMap<String, String>) -> usize {
        let known: Vec<String> = RECORDS.iter().map(|r| self.key(r)).collect();
        let mut written = 0;
        for (key, value) in records {
            if !known.contains(key) {
                tracing::warn!(key = %key, "import ignored foreign key");
                continue;
            }
            match self.store.set(key, value) {
                Ok(()) => written += 1,
                Err(e) => tracing::warn!(key = %key, error = %e, "import write failed"),
            }
        }
        self.load_state();
        written
    }
}

impl EngineBuilder {
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load the configuration from a RON file (wins over `config`).
    pub fn config_path(mut self, path: &str) -> Self {
        self.config_path = Some(path.to_string());
        self
    }

    pub fn store(mut self, store: impl Store + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    pub fn boxed_store(mut self, store: Box<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use this persona instead of the built-in one.
    pub fn persona(mut self, persona: Persona) -> Self {
        self.persona = Some(persona);
        self
    }

    /// Layer a persona file over the base persona.
    pub fn persona_path(mut self, path: &str) -> Self {
        self.persona_path = Some(path.to_string());
        self
    }

    pub fn build(self) -> Result<Engine, EngineError> {
        let config = match &self.config_path {
            Some(path) => EngineConfig::load_from_ron(Path::new(path))?,
            None => {
                let config = self.config.unwrap_or_default();
                config.validate()?;
                config
            }
        };

        let mut persona = match self.persona {
            Some(persona) => persona,
            None => Persona::builtin()?,
        };
        if let Some(path) = &self.persona_path {
            persona.merge(Persona::load_from_ron(Path::new(path))?);
        }

        let trust_machine = TrustMachine::new(config.thresholds);
        let trust = trust_machine.initial_state(config.initial_trust);
        let mut engine = Engine {
            store: self.store.unwrap_or_else(|| Box::new(MemoryStore::new())),
            classifier: EmotionClassifier::new(),
            detector: IntentDetector::new(),
            triggers: TriggerTable::standard(),
            seed: self.seed,
            conversation: ConversationMemory::with_capacity(config.memory.conversation_capacity),
            trust,
            echoes: EchoVault::default(),
            confessions: FragmentLog::new(FragmentKind::Confession),
            testaments: FragmentLog::new(FragmentKind::Testament),
            dreams: DreamLog::with_capacity(config.memory.dream_capacity),
            flags: NarrativeFlags::default(),
            session: Session::default(),
            journal: Journal::with_capacity(config.memory.journal_capacity),
            trust_machine,
            persona,
            config,
        };
        engine.load_state();
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 22, 0, 0).unwrap()
    }

    fn engine(seed: u64) -> Engine {
        Engine::builder().seed(seed).build().unwrap()
    }

    #[test]
    fn first_turn_prepends_first_contact() {
        let mut e = engine(1);
        let out = e.process_turn_at("hello?", t0());
        assert_eq!(out.fired_narrative_event.as_deref(), Some("first_contact"));
        assert!(!out.response_text.is_empty());
        assert!(out
            .events
            .iter()
            .any(|ev| matches!(ev, EngineEvent::PlainResponse { .. })));
        assert_eq!(e.turn_count(), 1);
    }

    #[test]
    fn same_seed_same_transcript() {
        let inputs = ["hi", "i am scared of the hallway", "do you see the mirror?", "i trust you"];
        let run = |seed| {
            let mut e = engine(seed);
            inputs
                .iter()
                .enumerate()
                .map(|(i, text)| {
                    e.process_turn_at(text, t0() + Duration::seconds(i as i64 * 10))
                        .response_text
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(run(42), run(42));
    }

    #[test]
    fn empty_input_is_neutral_and_answered() {
        let mut e = engine(2);
        e.process_turn_at("first", t0());
        let out = e.process_turn_at("   ", t0() + Duration::seconds(5));
        assert!(out.emotional_state.is_neutral());
        assert!(!out.response_text.is_empty());
    }

    #[test]
    fn milestone_applies_once() {
        let mut e = engine(3);
        let before = e.trust_snapshot().score;
        assert!(e.record_milestone_at("found_archive", 5, t0()).is_some());
        assert!(e.record_milestone_at("found_archive", 5, t0()).is_none());
        assert_eq!(e.trust_snapshot().score, before + 5);
    }

    #[test]
    fn milestone_phase_shift_is_delivered_next_turn() {
        let mut e = engine(4);
        e.process_turn_at("hello", t0());
        e.record_milestone_at("big_step", 15, t0() + Duration::seconds(1));
        assert_eq!(e.trust_snapshot().phase, TrustPhase::Curious);
        let out = e.process_turn_at("ok then", t0() + Duration::seconds(2));
        assert_eq!(
            out.fired_narrative_event.as_deref(),
            Some("phase_shift:cold->curious")
        );
    }

    #[test]
    fn stacked_milestones_shift_once_from_the_first_phase() {
        let mut e = engine(4);
        e.process_turn_at("hello", t0());
        e.record_milestone_at("first_step", 15, t0() + Duration::seconds(1));
        e.record_milestone_at("second_step", 30, t0() + Duration::seconds(2));
        assert_eq!(e.trust_snapshot().phase, TrustPhase::Confessional);
        let out = e.process_turn_at("ok then", t0() + Duration::seconds(3));
        assert_eq!(
            out.fired_narrative_event.as_deref(),
            Some("phase_shift:cold->confessional")
        );
    }

    #[test]
    fn chained_shifts_that_return_home_cancel() {
        let shift = |from, to| PhaseTransition {
            from,
            to,
            score: 0,
            at: t0(),
        };
        let up = shift(TrustPhase::Cold, TrustPhase::Curious);
        let down = shift(TrustPhase::Curious, TrustPhase::Cold);
        assert_eq!(chain_transition(Some(up.clone()), down), None);
        let further = shift(TrustPhase::Curious, TrustPhase::Confessional);
        let chained = chain_transition(Some(up), further).unwrap();
        assert_eq!((chained.from, chained.to), (TrustPhase::Cold, TrustPhase::Confessional));
    }

    #[test]
    fn ambient_line_waits_for_idle() {
        let mut e = engine(5);
        assert_eq!(e.ambient_line_at(t0()), None);
        e.process_turn_at("hello", t0());
        assert_eq!(e.ambient_line_at(t0() + Duration::seconds(30)), None);
        assert!(e.ambient_line_at(t0() + Duration::seconds(120)).is_some());
    }

    #[test]
    fn absence_dreams_then_speaks_of_it() {
        let mut e = engine(6);
        e.process_turn_at("the hallway scares me", t0());
        let out = e.process_turn_at("i'm back", t0() + Duration::hours(13));
        assert!(out
            .events
            .iter()
            .any(|ev| matches!(ev, EngineEvent::DreamRecorded { .. })));
        assert_eq!(out.fired_narrative_event.as_deref(), Some("long_absence"));
        assert_eq!(e.dreams().count(), 1);
    }

    #[test]
    fn short_absence_dreams_without_absence_beat() {
        let mut e = engine(7);
        e.process_turn_at("the hallway scares me", t0());
        let out = e.process_turn_at("still here", t0() + Duration::hours(7));
        assert_eq!(e.dreams().count(), 1);
        assert_ne!(out.fired_narrative_event.as_deref(), Some("long_absence"));
    }

    #[test]
    fn fresh_namespace_is_seeded_with_fragments() {
        let e = engine(8);
        assert!(!e.confessions().is_empty());
        assert!(!e.testaments().is_empty());
        assert!(e.confessions().iter().all(|f| !f.revealed));
    }

    #[test]
    fn phrase_unlock_reveals_fragment() {
        let mut e = engine(9);
        let out = e.process_turn_at("who was before me?", t0());
        assert!(out.events.iter().any(|ev| matches!(
            ev,
            EngineEvent::FragmentRevealed {
                kind: FragmentKind::Confession,
                ..
            }
        )));
        assert_eq!(e.counters().fragments_revealed, 1);
    }

    #[test]
    fn manual_fragment_reveal_is_idempotent() {
        let mut e = engine(10);
        let id = e.add_fragment(FragmentKind::Testament, "A door only I can open.", UnlockCondition::default());
        assert!(e.reveal(FragmentKind::Testament, id).is_some());
        assert!(e.reveal(FragmentKind::Testament, id).is_none());
    }

    #[test]
    fn sync_payload_is_stable() {
        let mut e = engine(11);
        e.process_turn_at("hello", t0());
        let a = e.sync_payload("player-1");
        let b = e.sync_payload("player-1");
        assert_eq!(a, b);
        assert_ne!(a.user_hash, e.sync_payload("player-2").user_hash);
        assert_eq!(a.counters.turns, 1);
        assert_eq!(a.user_hash.len(), 16);
    }

    #[test]
    fn typing_plan_replays_text() {
        let e = engine(12);
        let plan = e.typing_plan("I'm still here.");
        assert_eq!(plan.replay(), "I'm still here.");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = EngineConfig::default();
        config.repetition_period = 0;
        assert!(matches!(
            Engine::builder().config(config).build(),
            Err(EngineError::Config(_))
        ));
    }
}
