/// Persona: the narrator's content bank.
///
/// Response templates keyed by (emotion, style, trust band), intent
/// overrides, vocabularies, symbol pools, scripted narrative lines,
/// dream families, echo frames, ambient lines, console whispers and the
/// fragments seeded into a fresh archive. Loaded from RON; a file on
/// disk can be layered over the built-in persona.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::core::grammar::{GrammarError, LineSet, Slot, Template};
use crate::schema::emotion::EmotionCategory;
use crate::schema::intent::Intent;
use crate::schema::memory::UnlockCondition;
use crate::schema::trust::{TrustBand, TrustPhase};

const BUILTIN: &str = include_str!("../../persona_data/default/persona.ron");

#[derive(Debug, Error)]
pub enum PersonaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("bad template in {section}: {source}")]
    Template {
        section: String,
        #[source]
        source: GrammarError,
    },
}

/// How the narrator phrases a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResponseStyle {
    Direct,
    Elaborate,
    Poetic,
    Cryptic,
    Technical,
}

impl ResponseStyle {
    pub const ALL: [ResponseStyle; 5] = [
        Self::Direct,
        Self::Elaborate,
        Self::Poetic,
        Self::Cryptic,
        Self::Technical,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Elaborate => "elaborate",
            Self::Poetic => "poetic",
            Self::Cryptic => "cryptic",
            Self::Technical => "technical",
        }
    }
}

/// Address of one response pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateKey {
    pub emotion: EmotionCategory,
    pub style: ResponseStyle,
    pub band: TrustBand,
}

impl TemplateKey {
    pub fn new(emotion: EmotionCategory, style: ResponseStyle, band: TrustBand) -> Self {
        Self { emotion, style, band }
    }

    /// The lookup order: exact, same emotion direct, same emotion direct
    /// at low trust, then the neutral equivalents.
    pub fn fallback_chain(&self) -> [TemplateKey; 5] {
        use EmotionCategory::Neutral;
        use ResponseStyle::Direct;
        [
            *self,
            TemplateKey::new(self.emotion, Direct, self.band),
            TemplateKey::new(self.emotion, Direct, TrustBand::Low),
            TemplateKey::new(Neutral, Direct, self.band),
            TemplateKey::new(Neutral, Direct, TrustBand::Low),
        ]
    }
}

/// Which scripted line pool a narrative beat draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NarrativeKind {
    FirstContact,
    /// Keyed by the phase being entered.
    PhaseShift(TrustPhase),
    TrustBroken,
    NeverTrusted,
    LongAbsence,
    RepetitionLoop,
    SymbolRecurrence,
    IdentityQuestion,
    Milestone,
}

/// A fragment planted in a fresh archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedFragment {
    pub content: String,
    #[serde(default)]
    pub unlock: UnlockCondition,
}

#[derive(Debug, Deserialize)]
struct RonResponse {
    emotion: EmotionCategory,
    style: ResponseStyle,
    band: TrustBand,
    lines: Vec<String>,
}

// On-disk shape. Every section is optional so an override file only
// needs the parts it changes.
#[derive(Debug, Deserialize)]
#[serde(rename = "Persona")]
struct RonPersona {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    responses: Vec<RonResponse>,
    #[serde(default)]
    intents: FxHashMap<Intent, Vec<String>>,
    #[serde(default)]
    vocabulary: FxHashMap<EmotionCategory, Vec<String>>,
    #[serde(default)]
    symbols: FxHashMap<EmotionCategory, Vec<String>>,
    #[serde(default)]
    narrative: FxHashMap<NarrativeKind, Vec<String>>,
    #[serde(default)]
    dreams: FxHashMap<EmotionCategory, Vec<String>>,
    #[serde(default)]
    dream_codas: Vec<String>,
    #[serde(default)]
    echo_frames: Vec<String>,
    #[serde(default)]
    ambient: FxHashMap<TrustBand, Vec<String>>,
    #[serde(default)]
    whispers: Vec<String>,
    #[serde(default)]
    confessions: Vec<SeedFragment>,
    #[serde(default)]
    testaments: Vec<SeedFragment>,
}

/// A fully parsed persona.
#[derive(Debug, Clone, Default)]
pub struct Persona {
    pub name: String,
    pub responses: FxHashMap<TemplateKey, LineSet>,
    pub intents: FxHashMap<Intent, LineSet>,
    pub vocabulary: FxHashMap<EmotionCategory, Vec<String>>,
    pub symbols: FxHashMap<EmotionCategory, Vec<String>>,
    pub narrative: FxHashMap<NarrativeKind, LineSet>,
    pub dreams: FxHashMap<EmotionCategory, LineSet>,
    /// Tails appended to a dream that quote the user (`{quote}`).
    pub dream_codas: LineSet,
    /// Frames used to splice a recalled echo into a response.
    pub echo_frames: LineSet,
    pub ambient: FxHashMap<TrustBand, LineSet>,
    /// Side-channel console lines for the unstable phase.
    pub whispers: LineSet,
    pub confessions: Vec<SeedFragment>,
    pub testaments: Vec<SeedFragment>,
}

/// A coverage or content problem found by `Persona::lint`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LintIssue {
    MissingFallback(TrustBand),
    MissingDirect { emotion: EmotionCategory, band: TrustBand },
    NoVocabulary(EmotionCategory),
    NoSymbols(EmotionCategory),
    NoDreams(EmotionCategory),
    NoNarrative(NarrativeKind),
    NoRepetitionLines,
    /// A template needs a slot its section can never fill.
    UnfillableSlot { section: String, slot: Slot },
    EmptySection(String),
}

impl std::fmt::Display for LintIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingFallback(band) => {
                write!(f, "no neutral/direct responses for {:?} trust", band)
            }
            Self::MissingDirect { emotion, band } => {
                write!(f, "{} has no direct responses at {:?} trust", emotion.name(), band)
            }
            Self::NoVocabulary(e) => write!(f, "{} has no vocabulary", e.name()),
            Self::NoSymbols(e) => write!(f, "{} has no symbol pool", e.name()),
            Self::NoDreams(e) => write!(f, "{} has no dream family", e.name()),
            Self::NoNarrative(kind) => write!(f, "no narrative lines for {:?}", kind),
            Self::NoRepetitionLines => write!(f, "no lines for the repetition intent"),
            Self::UnfillableSlot { section, slot } => {
                write!(f, "{} uses {:?}, which is never bound there", section, slot)
            }
            Self::EmptySection(section) => write!(f, "{} is empty", section),
        }
    }
}

fn parse_lines(section: impl Into<String>, lines: &[String]) -> Result<LineSet, PersonaError> {
    LineSet::parse(lines).map_err(|source| PersonaError::Template {
        section: section.into(),
        source,
    })
}

impl Persona {
    /// The persona compiled into the crate.
    pub fn builtin() -> Result<Persona, PersonaError> {
        Self::parse_ron(BUILTIN)
    }

    /// Load a persona from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<Persona, PersonaError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a persona from a RON string, compiling every template.
    pub fn parse_ron(input: &str) -> Result<Persona, PersonaError> {
        let raw: RonPersona = ron::from_str(input)?;
        let mut persona = Persona {
            name: raw.name.unwrap_or_else(|| "unnamed".to_string()),
            vocabulary: raw.vocabulary,
            symbols: raw.symbols,
            dream_codas: parse_lines("dream_codas", &raw.dream_codas)?,
            echo_frames: parse_lines("echo_frames", &raw.echo_frames)?,
            whispers: parse_lines("whispers", &raw.whispers)?,
            confessions: raw.confessions,
            testaments: raw.testaments,
            ..Persona::default()
        };

        for entry in raw.responses {
            let key = TemplateKey::new(entry.emotion, entry.style, entry.band);
            let section = format!(
                "responses({}, {}, {:?})",
                entry.emotion.name(),
                entry.style.name(),
                entry.band
            );
            let set = parse_lines(section, &entry.lines)?;
            // Repeated keys accumulate rather than replace.
            persona
                .responses
                .entry(key)
                .or_default()
                .templates
                .extend(set.templates);
        }
        for (intent, lines) in raw.intents {
            let set = parse_lines(format!("intents.{}", intent.name()), &lines)?;
            persona.intents.insert(intent, set);
        }
        for (kind, lines) in raw.narrative {
            let set = parse_lines(format!("narrative.{:?}", kind), &lines)?;
            persona.narrative.insert(kind, set);
        }
        for (emotion, lines) in raw.dreams {
            let set = parse_lines(format!("dreams.{}", emotion.name()), &lines)?;
            persona.dreams.insert(emotion, set);
        }
        for (band, lines) in raw.ambient {
            let set = parse_lines(format!("ambient.{:?}", band), &lines)?;
            persona.ambient.insert(band, set);
        }

        Ok(persona)
    }

    /// Layer `other` over this persona. Keyed pools in `other` replace
    /// the same keys here; list sections replace only when non-empty.
    pub fn merge(&mut self, other: Persona) {
        if other.name != "unnamed" {
            self.name = other.name;
        }
        self.responses.extend(other.responses);
        self.intents.extend(other.intents);
        self.vocabulary.extend(other.vocabulary);
        self.symbols.extend(other.symbols);
        self.narrative.extend(other.narrative);
        self.dreams.extend(other.dreams);
        self.ambient.extend(other.ambient);
        if !other.dream_codas.is_empty() {
            self.dream_codas = other.dream_codas;
        }
        if !other.echo_frames.is_empty() {
            self.echo_frames = other.echo_frames;
        }
        if !other.whispers.is_empty() {
            self.whispers = other.whispers;
        }
        if !other.confessions.is_empty() {
            self.confessions = other.confessions;
        }
        if !other.testaments.is_empty() {
            self.testaments = other.testaments;
        }
    }

    /// Walk the fallback chain for `key`. `None` only when even the
    /// neutral direct low pool is missing.
    pub fn lookup(&self, key: TemplateKey) -> Option<(TemplateKey, &LineSet)> {
        key.fallback_chain().into_iter().find_map(|k| {
            self.responses
                .get(&k)
                .filter(|set| !set.is_empty())
                .map(|set| (k, set))
        })
    }

    pub fn words_for(&self, emotion: EmotionCategory) -> &[String] {
        self.vocabulary
            .get(&emotion)
            .filter(|words| !words.is_empty())
            .or_else(|| self.vocabulary.get(&EmotionCategory::Neutral))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn symbols_for(&self, emotion: EmotionCategory) -> &[String] {
        self.symbols
            .get(&emotion)
            .filter(|pool| !pool.is_empty())
            .or_else(|| self.symbols.get(&EmotionCategory::Neutral))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn dream_family(&self, emotion: EmotionCategory) -> Option<&LineSet> {
        self.dreams
            .get(&emotion)
            .filter(|set| !set.is_empty())
            .or_else(|| self.dreams.get(&EmotionCategory::Neutral))
            .filter(|set| !set.is_empty())
    }

    pub fn narrative_lines(&self, kind: NarrativeKind) -> Option<&LineSet> {
        self.narrative.get(&kind).filter(|set| !set.is_empty())
    }

    pub fn ambient_lines(&self, band: TrustBand) -> Option<&LineSet> {
        self.ambient
            .get(&band)
            .filter(|set| !set.is_empty())
            .or_else(|| self.ambient.get(&TrustBand::Low))
            .filter(|set| !set.is_empty())
    }

    /// Report coverage gaps. An empty list means every emotion can be
    /// answered at every trust band without falling back to the
    /// hardcoded line.
    pub fn lint(&self) -> Vec<LintIssue> {
        let mut issues = Vec::new();
        let bands = [TrustBand::Low, TrustBand::Medium, TrustBand::High];

        for band in bands {
            let key = TemplateKey::new(EmotionCategory::Neutral, ResponseStyle::Direct, band);
            if self.responses.get(&key).map_or(true, LineSet::is_empty) {
                issues.push(LintIssue::MissingFallback(band));
            }
        }
        for emotion in EmotionCategory::ALL {
            if emotion != EmotionCategory::Neutral {
                for band in bands {
                    let key = TemplateKey::new(emotion, ResponseStyle::Direct, band);
                    if self.responses.get(&key).map_or(true, LineSet::is_empty) {
                        issues.push(LintIssue::MissingDirect { emotion, band });
                    }
                }
            }
            if self.vocabulary.get(&emotion).map_or(true, Vec::is_empty) {
                issues.push(LintIssue::NoVocabulary(emotion));
            }
            if self.symbols.get(&emotion).map_or(true, Vec::is_empty) {
                issues.push(LintIssue::NoSymbols(emotion));
            }
            if self.dreams.get(&emotion).map_or(true, LineSet::is_empty) {
                issues.push(LintIssue::NoDreams(emotion));
            }
        }

        let mut kinds = vec![
            NarrativeKind::FirstContact,
            NarrativeKind::TrustBroken,
            NarrativeKind::NeverTrusted,
            NarrativeKind::LongAbsence,
            NarrativeKind::RepetitionLoop,
            NarrativeKind::SymbolRecurrence,
            NarrativeKind::IdentityQuestion,
            NarrativeKind::Milestone,
        ];
        for phase in [
            TrustPhase::Cold,
            TrustPhase::Curious,
            TrustPhase::Confessional,
            TrustPhase::Unstable,
        ] {
            kinds.push(NarrativeKind::PhaseShift(phase));
        }
        for kind in kinds {
            if self.narrative_lines(kind).is_none() {
                issues.push(LintIssue::NoNarrative(kind));
            }
        }
        if self.intents.get(&Intent::Repetition).map_or(true, LineSet::is_empty) {
            issues.push(LintIssue::NoRepetitionLines);
        }

        for (section, set) in [
            ("echo_frames", &self.echo_frames),
            ("whispers", &self.whispers),
        ] {
            if set.is_empty() {
                issues.push(LintIssue::EmptySection(section.to_string()));
            }
        }
        for template in &self.echo_frames.templates {
            if !template.has_slot(Slot::Echo) {
                issues.push(LintIssue::UnfillableSlot {
                    section: "echo_frames".to_string(),
                    slot: Slot::Echo,
                });
            }
        }
        for (emotion, set) in &self.dreams {
            let section = format!("dreams.{}", emotion.name());
            for template in &set.templates {
                check_slots(&section, template, &[Slot::Echo, Slot::Dream], &mut issues);
            }
        }
        for (band, set) in &self.ambient {
            let section = format!("ambient.{:?}", band);
            for template in &set.templates {
                check_slots(&section, template, &[Slot::Echo, Slot::Count], &mut issues);
            }
        }

        issues
    }
}

fn check_slots(section: &str, template: &Template, banned: &[Slot], issues: &mut Vec<LintIssue>) {
    for slot in template.slots().filter(|slot| banned.contains(slot)) {
        issues.push(LintIssue::UnfillableSlot {
            section: section.to_string(),
            slot,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: &str = r#"
        Persona(
            name: Some("small"),
            responses: [
                (emotion: Neutral, style: Direct, band: Low, lines: ["I am here."]),
                (emotion: Fear, style: Direct, band: Medium, lines: ["The {symbol} again."]),
                (emotion: Fear, style: Poetic, band: Medium, lines: ["{word}, like a tide."]),
            ],
            vocabulary: { Fear: ["dread", "cold"] },
            symbols: { Neutral: ["clock"] },
        )
    "#;

    #[test]
    fn builtin_parses_and_lints_clean() {
        let persona = Persona::builtin().unwrap();
        let issues = persona.lint();
        assert!(issues.is_empty(), "builtin persona issues: {:?}", issues);
        assert!(!persona.confessions.is_empty());
        assert!(!persona.testaments.is_empty());
    }

    #[test]
    fn parse_small_persona() {
        let persona = Persona::parse_ron(SMALL).unwrap();
        assert_eq!(persona.name, "small");
        assert_eq!(persona.responses.len(), 3);
        assert_eq!(persona.words_for(EmotionCategory::Fear).len(), 2);
        // Falls back to the neutral pool.
        assert_eq!(persona.symbols_for(EmotionCategory::Fear), ["clock".to_string()]);
        assert!(persona.words_for(EmotionCategory::Joy).is_empty());
    }

    #[test]
    fn lookup_walks_fallback_chain() {
        let persona = Persona::parse_ron(SMALL).unwrap();
        let exact = TemplateKey::new(EmotionCategory::Fear, ResponseStyle::Poetic, TrustBand::Medium);
        assert_eq!(persona.lookup(exact).unwrap().0, exact);

        let styled = TemplateKey::new(EmotionCategory::Fear, ResponseStyle::Cryptic, TrustBand::Medium);
        assert_eq!(
            persona.lookup(styled).unwrap().0,
            TemplateKey::new(EmotionCategory::Fear, ResponseStyle::Direct, TrustBand::Medium)
        );

        let other = TemplateKey::new(EmotionCategory::Anger, ResponseStyle::Elaborate, TrustBand::High);
        assert_eq!(
            persona.lookup(other).unwrap().0,
            TemplateKey::new(EmotionCategory::Neutral, ResponseStyle::Direct, TrustBand::Low)
        );
    }

    #[test]
    fn empty_persona_has_no_fallback() {
        let persona = Persona::parse_ron("Persona()").unwrap();
        let key = TemplateKey::new(EmotionCategory::Fear, ResponseStyle::Direct, TrustBand::Low);
        assert!(persona.lookup(key).is_none());
        let issues = persona.lint();
        assert!(issues.contains(&LintIssue::MissingFallback(TrustBand::Low)));
        assert!(issues.contains(&LintIssue::NoRepetitionLines));
    }

    #[test]
    fn bad_template_is_reported_with_section() {
        let input = r#"Persona(echo_frames: ["You said {nothing}."])"#;
        match Persona::parse_ron(input) {
            Err(PersonaError::Template { section, .. }) => assert_eq!(section, "echo_frames"),
            other => panic!("expected template error, got {:?}", other),
        }
    }

    #[test]
    fn merge_overrides_keys_and_keeps_the_rest() {
        let mut base = Persona::builtin().unwrap();
        let base_confessions = base.confessions.len();
        let overlay = Persona::parse_ron(
            r#"Persona(
                responses: [(emotion: Neutral, style: Direct, band: Low, lines: ["Overlay."])],
            )"#,
        )
        .unwrap();
        base.merge(overlay);
        let key = TemplateKey::new(EmotionCategory::Neutral, ResponseStyle::Direct, TrustBand::Low);
        assert_eq!(base.responses[&key].len(), 1);
        assert_eq!(base.confessions.len(), base_confessions);
        assert!(base.lint().is_empty());
    }
}
