/// Response generation: style choice, template lookup with fallback,
/// slot filling, echo splicing and the variety pass.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::config::TransformConfig;
use crate::core::context::NarrativeContext;
use crate::core::conversation::{MemoryContext, StyleProfile};
use crate::core::grammar::{LineSet, Slot, SlotSource};
use crate::core::persona::{Persona, ResponseStyle, TemplateKey};
use crate::core::text;
use crate::core::variety::{PassReport, VarietyPass};
use crate::schema::emotion::{EmotionalState, Intensity};
use crate::schema::intent::{Confidence, Intent, IntentReading};
use crate::schema::memory::{Dream, Echo};
use crate::schema::trust::TrustPhase;

/// Said when the persona cannot answer at all.
pub const LAST_RESORT: &str = "I'm here.";

const QUOTE_WORDS: usize = 8;

/// Where the response text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseSource {
    /// A response pool; the key is the pool actually used after fallback.
    Template(TemplateKey),
    /// An intent override pool.
    Intent(Intent),
    /// Scripted narrative line.
    Narrative,
    /// The hardcoded last resort.
    Fallback,
}

/// Everything one response is built from.
pub struct ResponseRequest<'a> {
    pub input: &'a str,
    pub emotion: &'a EmotionalState,
    pub reading: &'a IntentReading,
    pub phase: TrustPhase,
    pub memory: &'a MemoryContext,
    /// An echo already recalled for this turn, to be spliced in.
    pub echo: Option<&'a Echo>,
    pub latest_dream: Option<&'a Dream>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub text: String,
    pub source: ResponseSource,
    pub style: ResponseStyle,
    pub echo_spliced: bool,
    pub passes: PassReport,
}

/// Pick a response style from the phase and how the user writes.
pub fn choose_style(phase: TrustPhase, profile: StyleProfile) -> ResponseStyle {
    use ResponseStyle::*;
    match (phase, profile) {
        (_, StyleProfile::Technical) => Technical,
        (TrustPhase::Cold, _) => Direct,
        (TrustPhase::Curious, StyleProfile::Verbose) => Elaborate,
        (TrustPhase::Curious, StyleProfile::Emotional) => Poetic,
        (TrustPhase::Curious, _) => Direct,
        (TrustPhase::Confessional, StyleProfile::Verbose) => Elaborate,
        (TrustPhase::Confessional, StyleProfile::Questioning) => Cryptic,
        (TrustPhase::Confessional, _) => Poetic,
        (TrustPhase::Unstable, _) => Cryptic,
    }
}

/// How hard the variety pass pushes in a phase.
pub fn phase_pressure(phase: TrustPhase) -> f32 {
    match phase {
        TrustPhase::Cold => 0.2,
        TrustPhase::Curious => 0.5,
        TrustPhase::Confessional => 0.8,
        TrustPhase::Unstable => 1.5,
    }
}

fn intensity_pressure(intensity: Intensity) -> f32 {
    match intensity {
        Intensity::Low => 0.8,
        Intensity::Medium => 1.0,
        Intensity::High => 1.3,
    }
}

/// Whether an intent pool should stand in for the emotional template.
fn intent_overrides(reading: &IntentReading) -> bool {
    match reading.intent {
        Intent::Repetition => true,
        Intent::Greeting | Intent::Farewell => reading.confidence >= Confidence::Medium,
        Intent::Statement => false,
        _ => reading.confidence == Confidence::High,
    }
}

struct ResponseSlots<'a> {
    persona: &'a Persona,
    request: &'a ResponseRequest<'a>,
}

impl SlotSource for ResponseSlots<'_> {
    fn fill(&self, slot: Slot, rng: &mut StdRng) -> Option<String> {
        let request = self.request;
        match slot {
            Slot::Word(emotion) => self
                .persona
                .words_for(emotion.unwrap_or(request.emotion.primary))
                .choose(rng)
                .cloned(),
            Slot::Topic => request.memory.dominant_topic.clone(),
            // The user's own symbol if they brought one.
            Slot::Symbol => match request.reading.symbols.first() {
                Some(symbol) => Some(symbol.clone()),
                None => self
                    .persona
                    .symbols_for(request.emotion.primary)
                    .choose(rng)
                    .cloned(),
            },
            Slot::Quote => Some(text::snippet(request.input, QUOTE_WORDS)).filter(|q| !q.is_empty()),
            Slot::Echo => request.echo.map(|e| e.refracted.clone()),
            Slot::Phase => Some(request.phase.name().to_string()),
            Slot::Dream => request.latest_dream.map(|d| d.content.clone()),
            Slot::Emotion => Some(request.emotion.primary.name().to_string()),
            Slot::Count => None,
        }
    }
}

pub struct Responder<'a> {
    persona: &'a Persona,
    transform: &'a TransformConfig,
}

impl<'a> Responder<'a> {
    pub fn new(persona: &'a Persona, transform: &'a TransformConfig) -> Self {
        Self { persona, transform }
    }

    /// Build one response. Never fails; the worst case is `LAST_RESORT`.
    pub fn respond(
        &self,
        request: &ResponseRequest<'_>,
        context: &NarrativeContext,
        rng: &mut StdRng,
    ) -> Response {
        let style = choose_style(request.phase, request.memory.style);
        let slots = ResponseSlots {
            persona: self.persona,
            request,
        };
        let previous = context.last();
        let fresh = |line: &str| previous != Some(line);

        let mut picked = None;
        if intent_overrides(request.reading) {
            if let Some(pool) = self.persona.intents.get(&request.reading.intent) {
                picked = pool
                    .render_with(&slots, rng, &fresh)
                    .map(|line| (line, ResponseSource::Intent(request.reading.intent)));
            }
        }
        if picked.is_none() {
            let key = TemplateKey::new(request.emotion.primary, style, request.phase.band());
            picked = self.from_templates(key, &slots, rng, &fresh);
        }
        let (mut body, source) =
            picked.unwrap_or_else(|| (LAST_RESORT.to_string(), ResponseSource::Fallback));

        let mut echo_spliced = false;
        if request.echo.is_some() {
            if let Some(frame) = self.persona.echo_frames.render(&slots, rng) {
                body = if rng.gen_bool(0.5) {
                    format!("{} {}", frame, body)
                } else {
                    format!("{} {}", body, frame)
                };
                echo_spliced = true;
            }
        }

        let pressure = phase_pressure(request.phase) * intensity_pressure(request.emotion.intensity);
        let (text, passes) = VarietyPass::apply(&body, self.transform, pressure, rng);

        Response {
            text,
            source,
            style,
            echo_spliced,
            passes,
        }
    }

    // Walk the fallback chain until some pool renders.
    fn from_templates(
        &self,
        key: TemplateKey,
        slots: &dyn SlotSource,
        rng: &mut StdRng,
        fresh: &dyn Fn(&str) -> bool,
    ) -> Option<(String, ResponseSource)> {
        key.fallback_chain().into_iter().find_map(|k| {
            let pool: &LineSet = self.persona.responses.get(&k)?;
            pool.render_with(slots, rng, fresh)
                .map(|line| (line, ResponseSource::Template(k)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::PassToggles;
    use crate::core::conversation::EmotionalTrend;
    use crate::schema::emotion::EmotionCategory;
    use crate::schema::trust::TrustBand;
    use chrono::{TimeZone, Utc};
    use rand::SeedableRng;

    fn quiet() -> TransformConfig {
        TransformConfig {
            passes: PassToggles::none(),
            ..TransformConfig::default()
        }
    }

    fn memory(style: StyleProfile) -> MemoryContext {
        MemoryContext {
            dominant_topic: None,
            dominant_emotion: None,
            style,
            trend: EmotionalTrend::Steady,
            last_input: None,
        }
    }

    fn state(primary: EmotionCategory, intensity: Intensity) -> EmotionalState {
        EmotionalState {
            primary,
            secondary: None,
            intensity,
            timestamp: Utc.with_ymd_and_hms(2024, 2, 2, 2, 2, 2).unwrap(),
        }
    }

    #[test]
    fn style_follows_phase_and_profile() {
        assert_eq!(choose_style(TrustPhase::Cold, StyleProfile::Verbose), ResponseStyle::Direct);
        assert_eq!(choose_style(TrustPhase::Curious, StyleProfile::Verbose), ResponseStyle::Elaborate);
        assert_eq!(choose_style(TrustPhase::Unstable, StyleProfile::Balanced), ResponseStyle::Cryptic);
        assert_eq!(choose_style(TrustPhase::Unstable, StyleProfile::Technical), ResponseStyle::Technical);
    }

    #[test]
    fn fear_draws_from_fear_pool() {
        let persona = Persona::builtin().unwrap();
        let transform = quiet();
        let responder = Responder::new(&persona, &transform);
        let emotion = state(EmotionCategory::Fear, Intensity::Medium);
        let reading = IntentReading::plain();
        let mem = memory(StyleProfile::Emotional);
        let request = ResponseRequest {
            input: "i am so afraid of the dark",
            emotion: &emotion,
            reading: &reading,
            phase: TrustPhase::Cold,
            memory: &mem,
            echo: None,
            latest_dream: None,
        };
        let response = responder.respond(&request, &NarrativeContext::default(), &mut StdRng::seed_from_u64(1));
        match response.source {
            ResponseSource::Template(key) => {
                assert_eq!(key.emotion, EmotionCategory::Fear);
                assert_eq!(key.band, TrustBand::Low);
            }
            other => panic!("unexpected source {:?}", other),
        }
        assert!(!response.text.is_empty());
    }

    #[test]
    fn repetition_intent_always_overrides() {
        let persona = Persona::builtin().unwrap();
        let transform = quiet();
        let responder = Responder::new(&persona, &transform);
        let emotion = state(EmotionCategory::Neutral, Intensity::Low);
        let mut reading = IntentReading::plain();
        reading.intent = Intent::Repetition;
        reading.repeated = true;
        let mem = memory(StyleProfile::Balanced);
        let request = ResponseRequest {
            input: "hello",
            emotion: &emotion,
            reading: &reading,
            phase: TrustPhase::Curious,
            memory: &mem,
            echo: None,
            latest_dream: None,
        };
        let response = responder.respond(&request, &NarrativeContext::default(), &mut StdRng::seed_from_u64(2));
        assert_eq!(response.source, ResponseSource::Intent(Intent::Repetition));
    }

    #[test]
    fn never_repeats_previous_when_pool_allows() {
        let persona = Persona::builtin().unwrap();
        let transform = quiet();
        let responder = Responder::new(&persona, &transform);
        let emotion = state(EmotionCategory::Sadness, Intensity::Low);
        let reading = IntentReading::plain();
        let mem = memory(StyleProfile::Balanced);
        let request = ResponseRequest {
            input: "it hurts",
            emotion: &emotion,
            reading: &reading,
            phase: TrustPhase::Cold,
            memory: &mem,
            echo: None,
            latest_dream: None,
        };
        let mut context = NarrativeContext::default();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..10 {
            let response = responder.respond(&request, &context, &mut rng);
            assert_ne!(Some(response.text.as_str()), context.last());
            context.record(&response.text);
        }
    }

    #[test]
    fn echo_is_spliced() {
        let persona = Persona::builtin().unwrap();
        let transform = quiet();
        let responder = Responder::new(&persona, &transform);
        let emotion = state(EmotionCategory::Neutral, Intensity::Low);
        let reading = IntentReading::plain();
        let mem = memory(StyleProfile::Balanced);
        let echo = Echo {
            id: 1,
            text: "i never told anyone about the house".to_string(),
            refracted: "you never told anyone about the house...".to_string(),
            emotion: EmotionCategory::Sadness,
            uses: 1,
            created_at: Utc::now(),
            last_used_at: None,
        };
        let request = ResponseRequest {
            input: "ok",
            emotion: &emotion,
            reading: &reading,
            phase: TrustPhase::Curious,
            memory: &mem,
            echo: Some(&echo),
            latest_dream: None,
        };
        let response = responder.respond(&request, &NarrativeContext::default(), &mut StdRng::seed_from_u64(4));
        assert!(response.echo_spliced);
        assert!(response
            .text
            .to_lowercase()
            .contains("you never told anyone about the house"));
    }

    #[test]
    fn empty_persona_uses_last_resort() {
        let persona = Persona::default();
        let transform = quiet();
        let responder = Responder::new(&persona, &transform);
        let emotion = state(EmotionCategory::Anger, Intensity::High);
        let reading = IntentReading::plain();
        let mem = memory(StyleProfile::Balanced);
        let request = ResponseRequest {
            input: "",
            emotion: &emotion,
            reading: &reading,
            phase: TrustPhase::Unstable,
            memory: &mem,
            echo: None,
            latest_dream: None,
        };
        let response = responder.respond(&request, &NarrativeContext::default(), &mut StdRng::seed_from_u64(5));
        assert_eq!(response.text, LAST_RESORT);
        assert_eq!(response.source, ResponseSource::Fallback);
    }
}
