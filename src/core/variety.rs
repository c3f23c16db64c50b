/// Variety pass — post-processing transforms that break the narrator's
/// text apart as it destabilizes.
///
/// Includes sentence fragmentation, tic injection, punctuation shift,
/// character-level glitching and trailing truncation. Every pass is
/// probabilistic and can be switched off on its own.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::core::config::TransformConfig;
use crate::core::text;

/// Lookalike substitutions tried before falling back to noise blocks.
const GLITCH_MAP: &[(char, char)] = &[
    ('a', '4'),
    ('e', '3'),
    ('i', '1'),
    ('o', '0'),
    ('s', '5'),
    ('t', '7'),
    ('l', '|'),
    ('g', '9'),
];
const NOISE: &[char] = &['█', '▓', '░', '#', '_'];
const SPLIT_WORDS: &[&str] = &["and", "but", "because", "so", "when", "until"];

/// Which passes ran, for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub fragmented: bool,
    pub quirked: bool,
    pub punctuation_shifted: bool,
    pub glitched: bool,
    pub truncated: bool,
}

/// The variety pass applied to generated text before final output.
#[derive(Debug, Clone, Default)]
pub struct VarietyPass;

impl VarietyPass {
    /// Run every enabled pass over `input`. `pressure` scales all pass
    /// probabilities (phase and emotional intensity feed it).
    pub fn apply(
        input: &str,
        config: &TransformConfig,
        pressure: f32,
        rng: &mut StdRng,
    ) -> (String, PassReport) {
        let mut output = input.to_string();
        let mut report = PassReport::default();
        let personality = &config.personality;
        let chance = |weight: f32| (weight * config.intensity * pressure).clamp(0.0, 1.0) as f64;

        if config.passes.fragmentation && rng.gen_bool(chance(personality.fragmentation)) {
            let fragmented = fragment(&output, rng);
            report.fragmented = fragmented != output;
            output = fragmented;
        }
        if config.passes.quirks
            && !personality.tics.is_empty()
            && rng.gen_bool(chance(personality.quirks))
        {
            output = inject_tic(&output, &personality.tics, rng);
            report.quirked = true;
        }
        if config.passes.punctuation_shift && rng.gen_bool(chance(personality.punctuation_shift)) {
            let shifted = shift_punctuation(&output, rng);
            report.punctuation_shifted = shifted != output;
            output = shifted;
        }
        if config.passes.glitch {
            let p = chance(personality.glitch);
            if rng.gen_bool(p) {
                let rate = 0.02 + 0.10 * p;
                let glitched = corrupt_characters(&output, rate, rng);
                report.glitched = glitched != output;
                output = glitched;
            }
        }
        if config.passes.truncation && rng.gen_bool(chance(personality.truncation)) {
            let truncated = truncate_tail(&output);
            report.truncated = truncated != output;
            output = truncated;
        }

        (text::tidy(&output), report)
    }
}

/// Break long sentences at a conjunction or their first comma.
pub fn fragment(input: &str, rng: &mut StdRng) -> String {
    let mut pieces = Vec::new();
    for sentence in text::sentences(input) {
        let words: Vec<&str> = sentence.split_whitespace().collect();
        if words.len() <= 6 {
            pieces.push(sentence);
            continue;
        }
        let splits: Vec<usize> = words
            .iter()
            .enumerate()
            .skip(2)
            .filter(|(i, w)| *i + 2 < words.len() && SPLIT_WORDS.contains(&w.to_lowercase().as_str()))
            .map(|(i, _)| i)
            .collect();
        if let Some(&at) = splits.choose(rng) {
            let head = words[..at].join(" ");
            let tail = words[at..].join(" ");
            let head = head.trim_end_matches(',');
            pieces.push(format!("{}.", head));
            pieces.push(text::capitalize(&tail));
        } else if let Some(comma) = sentence.find(", ") {
            let (head, tail) = sentence.split_at(comma);
            pieces.push(format!("{}.", head));
            pieces.push(text::capitalize(tail[2..].trim()));
        } else {
            pieces.push(sentence);
        }
    }
    pieces.join(" ")
}

/// Insert one verbal tic, or stutter the opening word.
pub fn inject_tic(input: &str, tics: &[String], rng: &mut StdRng) -> String {
    if rng.gen_bool(0.3) {
        if let Some(first) = input.split_whitespace().next() {
            if let Some(initial) = first.chars().next().filter(|c| c.is_alphabetic()) {
                return format!("{}-{}", initial, input);
            }
        }
    }
    let tic = match tics.choose(rng) {
        Some(tic) => tic,
        None => return input.to_string(),
    };
    let mut sentences = text::sentences(input);
    if sentences.is_empty() {
        return input.to_string();
    }
    let at = rng.gen_range(0..=sentences.len());
    let tic = if tic.chars().all(|c| c.is_ascii_punctuation()) {
        tic.clone()
    } else {
        format!("{}.", text::capitalize(tic))
    };
    sentences.insert(at, tic);
    sentences.join(" ")
}

/// Shift sentence endings: periods trail off, exclamations flatten,
/// or a sentence drops to a lowercase whisper.
pub fn shift_punctuation(input: &str, rng: &mut StdRng) -> String {
    text::sentences(input)
        .into_iter()
        .map(|sentence| match rng.gen_range(0..4) {
            0 if sentence.ends_with('.') && !sentence.ends_with("...") => format!("{}..", sentence),
            1 if sentence.ends_with('!') => format!("{}.", sentence.trim_end_matches('!')),
            2 => sentence
                .trim_end_matches(|c: char| matches!(c, '.' | '!' | '?'))
                .to_lowercase(),
            _ => sentence,
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Replace roughly `rate` of the non-space characters with lookalikes or
/// noise blocks. Whitespace is never touched.
pub fn corrupt_characters(input: &str, rate: f64, rng: &mut StdRng) -> String {
    let rate = rate.clamp(0.0, 1.0);
    input
        .chars()
        .map(|ch| {
            if ch.is_whitespace() || !rng.gen_bool(rate) {
                return ch;
            }
            let lower = ch.to_ascii_lowercase();
            match GLITCH_MAP.iter().find(|(from, _)| *from == lower) {
                Some((_, to)) if rng.gen_bool(0.7) => *to,
                _ => *NOISE.choose(rng).unwrap_or(&'#'),
            }
        })
        .collect()
}

/// Cut the last sentence off halfway and let it trail away.
pub fn truncate_tail(input: &str) -> String {
    let mut sentences = text::sentences(input);
    let last = match sentences.pop() {
        Some(last) => last,
        None => return input.to_string(),
    };
    let words: Vec<&str> = last.split_whitespace().collect();
    if words.len() < 4 {
        sentences.push(last);
        return sentences.join(" ");
    }
    let keep = (words.len() + 1) / 2;
    let cut = words[..keep]
        .join(" ")
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .to_string();
    sentences.push(format!("{}...", cut));
    sentences.join(" ")
}
