/// Template runtime: parsing `{slot}` templates and rendering them
/// against whatever the current turn can supply.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::text;
use crate::schema::emotion::EmotionCategory;

#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("template parse error: {0}")]
    TemplateParse(String),
    #[error("unknown slot '{0}'")]
    UnknownSlot(String),
}

/// A named hole in a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    /// `{word}` uses the turn's primary emotion, `{word:fear}` a fixed one.
    Word(Option<EmotionCategory>),
    /// `{topic}`: dominant topic of the conversation window.
    Topic,
    /// `{symbol}`: a symbol from the emotion's pool or the user's own.
    Symbol,
    /// `{quote}`: a fragment of the user's latest input.
    Quote,
    /// `{echo}`: a recalled echo, refracted.
    Echo,
    /// `{phase}`: the current trust phase name.
    Phase,
    /// `{dream}`: the most recent dream.
    Dream,
    /// `{count}`: a number the caller binds (repetitions, drops).
    Count,
    /// `{emotion}`: the primary emotion name.
    Emotion,
}

impl Slot {
    pub fn parse(content: &str) -> Result<Slot, GrammarError> {
        if let Some(emotion) = content.strip_prefix("word:") {
            return EmotionCategory::from_name(emotion)
                .map(|e| Slot::Word(Some(e)))
                .ok_or_else(|| GrammarError::UnknownSlot(content.to_string()));
        }
        Ok(match content {
            "word" => Slot::Word(None),
            "topic" => Slot::Topic,
            "symbol" => Slot::Symbol,
            "quote" => Slot::Quote,
            "echo" => Slot::Echo,
            "phase" => Slot::Phase,
            "dream" => Slot::Dream,
            "count" => Slot::Count,
            "emotion" => Slot::Emotion,
            _ => return Err(GrammarError::UnknownSlot(content.to_string())),
        })
    }
}

/// A segment of a parsed template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TemplateSegment {
    /// Literal text, emitted as-is.
    Literal(String),
    Slot(Slot),
}

/// Anything that can fill slots during rendering. Returning `None` means
/// the slot has nothing to offer this turn and the template is skipped.
pub trait SlotSource {
    fn fill(&self, slot: Slot, rng: &mut StdRng) -> Option<String>;
}

/// A parsed template: a sequence of segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub segments: Vec<TemplateSegment>,
}

impl Template {
    /// Parse a template string into a sequence of segments.
    ///
    /// Syntax:
    /// - `{slot}` / `{word:emotion}` → `Slot`
    /// - `{{` / `}}` → literal braces
    /// - Everything else → `Literal`
    pub fn parse(input: &str) -> Result<Template, GrammarError> {
        let mut segments = Vec::new();
        let mut literal_buf = String::new();
        let chars: Vec<char> = input.chars().collect();
        let len = chars.len();
        let mut i = 0;

        while i < len {
            if chars[i] == '{' {
                // Escaped brace
                if i + 1 < len && chars[i + 1] == '{' {
                    literal_buf.push('{');
                    i += 2;
                    continue;
                }

                if !literal_buf.is_empty() {
                    segments.push(TemplateSegment::Literal(std::mem::take(&mut literal_buf)));
                }

                let start = i + 1;
                let mut end = start;
                while end < len && chars[end] != '}' {
                    if chars[end] == '{' {
                        return Err(GrammarError::TemplateParse(
                            "nested braces are not allowed".to_string(),
                        ));
                    }
                    end += 1;
                }
                if end == len {
                    return Err(GrammarError::TemplateParse("unclosed brace".to_string()));
                }

                let content: String = chars[start..end].iter().collect();
                if content.trim().is_empty() {
                    return Err(GrammarError::TemplateParse("empty braces".to_string()));
                }

                segments.push(TemplateSegment::Slot(Slot::parse(content.trim())?));
                i = end + 1;
            } else if chars[i] == '}' {
                if i + 1 < len && chars[i + 1] == '}' {
                    literal_buf.push('}');
                    i += 2;
                    continue;
                }
                return Err(GrammarError::TemplateParse(
                    "unmatched closing brace".to_string(),
                ));
            } else {
                literal_buf.push(chars[i]);
                i += 1;
            }
        }

        if !literal_buf.is_empty() {
            segments.push(TemplateSegment::Literal(literal_buf));
        }

        Ok(Template { segments })
    }

    pub fn slots(&self) -> impl Iterator<Item = Slot> + '_ {
        self.segments.iter().filter_map(|s| match s {
            TemplateSegment::Slot(slot) => Some(*slot),
            TemplateSegment::Literal(_) => None,
        })
    }

    pub fn has_slot(&self, wanted: Slot) -> bool {
        self.slots().any(|s| s == wanted)
    }

    /// Render against `source`. `None` if any slot cannot be filled.
    pub fn render(&self, source: &dyn SlotSource, rng: &mut StdRng) -> Option<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                TemplateSegment::Literal(text) => out.push_str(text),
                TemplateSegment::Slot(slot) => out.push_str(&source.fill(*slot, rng)?),
            }
        }
        let out = text::tidy(&out);
        if out.is_empty() {
            None
        } else {
            Some(text::capitalize(&out))
        }
    }
}

/// An unordered pool of interchangeable templates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineSet {
    pub templates: Vec<Template>,
}

impl LineSet {
    pub fn parse(lines: &[String]) -> Result<LineSet, GrammarError> {
        let templates = lines
            .iter()
            .map(|line| Template::parse(line))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(LineSet { templates })
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Render candidates in random order, keeping those that render and
    /// that `accept` agrees to. Returns the first survivor, or the first
    /// renderable line if `accept` rejected everything.
    pub fn render_with(
        &self,
        source: &dyn SlotSource,
        rng: &mut StdRng,
        accept: &dyn Fn(&str) -> bool,
    ) -> Option<String> {
        let mut order: Vec<&Template> = self.templates.iter().collect();
        order.shuffle(rng);
        let mut fallback = None;
        for template in order {
            if let Some(line) = template.render(source, rng) {
                if accept(&line) {
                    return Some(line);
                }
                fallback.get_or_insert(line);
            }
        }
        fallback
    }

    pub fn render(&self, source: &dyn SlotSource, rng: &mut StdRng) -> Option<String> {
        self.render_with(source, rng, &|_| true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    struct Fixed;

    impl SlotSource for Fixed {
        fn fill(&self, slot: Slot, _rng: &mut StdRng) -> Option<String> {
            match slot {
                Slot::Word(Some(EmotionCategory::Fear)) => Some("dread".to_string()),
                Slot::Word(_) => Some("hush".to_string()),
                Slot::Symbol => Some("mirror".to_string()),
                Slot::Phase => Some("curious".to_string()),
                _ => None,
            }
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn parse_literal_only() {
        let t = Template::parse("Hello, world.").unwrap();
        assert_eq!(
            t.segments,
            vec![TemplateSegment::Literal("Hello, world.".to_string())]
        );
    }

    #[test]
    fn parse_slots() {
        let t = Template::parse("The {symbol} is full of {word:fear}.").unwrap();
        assert_eq!(t.segments.len(), 5);
        assert_eq!(t.segments[1], TemplateSegment::Slot(Slot::Symbol));
        assert_eq!(
            t.segments[3],
            TemplateSegment::Slot(Slot::Word(Some(EmotionCategory::Fear)))
        );
        assert!(t.has_slot(Slot::Symbol));
        assert!(!t.has_slot(Slot::Echo));
    }

    #[test]
    fn parse_escaped_braces() {
        let t = Template::parse("Use {{braces}} here.").unwrap();
        assert_eq!(
            t.segments,
            vec![TemplateSegment::Literal("Use {braces} here.".to_string())]
        );
    }

    #[test]
    fn parse_errors() {
        assert!(Template::parse("Bad {} here").is_err());
        assert!(Template::parse("Bad {outer{inner}} here").is_err());
        assert!(Template::parse("Bad {unclosed here").is_err());
        assert!(Template::parse("Bad } here").is_err());
        assert!(matches!(
            Template::parse("{nonsense}"),
            Err(GrammarError::UnknownSlot(_))
        ));
        assert!(Template::parse("{word:elation}").is_err());
    }

    #[test]
    fn render_fills_and_capitalizes() {
        let t = Template::parse("{word}. the {symbol} knows.").unwrap();
        assert_eq!(t.render(&Fixed, &mut rng()).as_deref(), Some("Hush. the mirror knows."));
    }

    #[test]
    fn render_fails_on_missing_slot() {
        let t = Template::parse("You said {echo}.").unwrap();
        assert_eq!(t.render(&Fixed, &mut rng()), None);
    }

    #[test]
    fn line_set_skips_unrenderable() {
        let set = LineSet::parse(&["I remember {echo}.".to_string(), "We are {phase} now.".to_string()])
            .unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.render(&Fixed, &mut rng()).as_deref(), Some("We are curious now."));
    }

    #[test]
    fn line_set_honours_accept_when_possible() {
        let set = LineSet::parse(&["One.".to_string(), "Two.".to_string()]).unwrap();
        for seed in 0..10 {
            let got = set
                .render_with(&Fixed, &mut StdRng::seed_from_u64(seed), &|s| s != "One.")
                .unwrap();
            assert_eq!(got, "Two.");
        }
        let single = LineSet::parse(&["Only.".to_string()]).unwrap();
        let got = single.render_with(&Fixed, &mut rng(), &|s| s != "Only.");
        assert_eq!(got.as_deref(), Some("Only."));
    }
}
