// Text Processing Service
// Normalization, tokenization, sentence splitting and deterministic rewrite passes

use crate::models::{SentenceLength, StyleTemplate};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

/// Machine-typical words and phrases with plainer alternates.
const AI_CLICHES: &[(&str, &[&str])] = &[
    ("delve into", &["explore", "examine", "dig into", "investigate"]),
    ("delve", &["explore", "examine", "investigate", "look into"]),
    ("comprehensive", &["complete", "thorough", "full", "detailed"]),
    ("tapestry", &["mix", "blend", "combination", "mixture"]),
    ("unveiling", &["revealing", "showing", "exposing"]),
    ("seamless", &["smooth", "easy", "effortless"]),
    ("leverage", &["use", "employ", "apply", "harness"]),
    ("robust", &["strong", "solid", "sturdy", "effective"]),
    ("paradigm", &["model", "framework", "approach"]),
    ("synergy", &["cooperation", "teamwork", "partnership"]),
    ("holistic", &["complete", "integrated", "unified"]),
    ("furthermore", &["also", "besides", "plus"]),
    ("moreover", &["also", "what's more", "besides"]),
    ("in conclusion", &["finally", "to sum up", "in the end"]),
    ("it is important to note that", &["note that", "notably,"]),
    ("it is important to note", &["note that", "notably"]),
    ("in today's digital landscape", &["today", "nowadays", "currently"]),
    ("navigate", &["handle", "manage", "work through"]),
    ("crucial", &["important", "key", "vital", "essential"]),
    ("pivotal", &["key", "central", "important"]),
    ("multifaceted", &["complex", "varied", "many-sided"]),
    ("underscore", &["highlight", "stress", "show"]),
    ("facilitate", &["help", "enable", "support"]),
    ("utilize", &["use", "employ", "apply"]),
    ("optimize", &["improve", "refine", "tune"]),
];

const CONTRACTIONS: &[(&str, &str)] = &[
    ("do not", "don't"),
    ("does not", "doesn't"),
    ("did not", "didn't"),
    ("is not", "isn't"),
    ("are not", "aren't"),
    ("was not", "wasn't"),
    ("were not", "weren't"),
    ("have not", "haven't"),
    ("has not", "hasn't"),
    ("will not", "won't"),
    ("would not", "wouldn't"),
    ("should not", "shouldn't"),
    ("could not", "couldn't"),
    ("cannot", "can't"),
    ("it is", "it's"),
];

/// Normalize punctuation and whitespace
pub fn normalize_punctuation(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let s = text
        .replace(['\u{201c}', '\u{201d}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{2013}', '\u{2014}'], " - ")
        .replace('\u{2026}', "...")
        .replace(['\u{00A0}', '\u{3000}'], " ")
        .replace("\r\n", "\n")
        .replace('\r', "\n");

    s.lines()
        .map(|ln| collapse_whitespace(ln))
        .filter(|ln| !ln.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapse every whitespace run to a single space and trim
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercased word tokens with surrounding punctuation trimmed; empty tokens dropped
pub fn word_tokens(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                .trim_matches('\'')
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Split text into sentences on `.`, `!` and `?`.
/// Decimal numbers are not split and terminator runs (`?!`, `...`) stay together.
pub fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut sentences = Vec::new();
    let mut buffer = String::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        buffer.push(ch);

        if is_terminator(ch) {
            if ch == '.'
                && i > 0
                && i + 1 < chars.len()
                && chars[i - 1].is_ascii_digit()
                && chars[i + 1].is_ascii_digit()
            {
                i += 1;
                continue;
            }

            while i + 1 < chars.len() && (is_terminator(chars[i + 1]) || matches!(chars[i + 1], '"' | ')')) {
                i += 1;
                buffer.push(chars[i]);
            }

            if i + 1 >= chars.len() || chars[i + 1].is_whitespace() {
                let sentence = buffer.trim();
                if !sentence.is_empty() && sentence.chars().any(|c| c.is_alphanumeric()) {
                    sentences.push(sentence.to_string());
                }
                buffer.clear();
            }
        }

        i += 1;
    }

    let remaining = buffer.trim();
    if !remaining.is_empty() && remaining.chars().any(|c| c.is_alphanumeric()) {
        sentences.push(remaining.to_string());
    }

    sentences
}

fn deterministic_index(text: &str, key: &str, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    key.hash(&mut hasher);
    (hasher.finish() % len as u64) as usize
}

fn match_case(original: &str, replacement: &str) -> String {
    if original.chars().next().map_or(false, |c| c.is_uppercase()) {
        capitalize_first(replacement)
    } else {
        replacement.to_string()
    }
}

pub fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn lowercase_first(s: &str) -> String {
    let first_word = s.split_whitespace().next().unwrap_or("");
    let keep = first_word == "I"
        || first_word.starts_with("I'")
        || (first_word.chars().count() > 1 && first_word.chars().all(|c| !c.is_lowercase()));
    if keep {
        return s.to_string();
    }
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn phrase_regex(phrase: &str) -> Option<Regex> {
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(phrase))).ok()
}

fn cliche_regexes() -> &'static Vec<(Regex, &'static [&'static str], &'static str)> {
    static RE: OnceLock<Vec<(Regex, &'static [&'static str], &'static str)>> = OnceLock::new();
    RE.get_or_init(|| {
        AI_CLICHES
            .iter()
            .filter_map(|(cliche, alts)| phrase_regex(cliche).map(|re| (re, *alts, *cliche)))
            .collect()
    })
}

fn contraction_regexes() -> &'static Vec<(Regex, &'static str, Regex, &'static str)> {
    static RE: OnceLock<Vec<(Regex, &'static str, Regex, &'static str)>> = OnceLock::new();
    RE.get_or_init(|| {
        CONTRACTIONS
            .iter()
            .filter_map(|(long, short)| {
                Some((phrase_regex(long)?, *short, phrase_regex(short)?, *long))
            })
            .collect()
    })
}

/// Replace machine-typical phrasing; the alternate is chosen deterministically from the text
pub fn replace_cliches(text: &str) -> String {
    let mut out = text.to_string();
    for (re, alts, cliche) in cliche_regexes() {
        if !re.is_match(&out) {
            continue;
        }
        let replacement = alts[deterministic_index(text, cliche, alts.len())];
        out = re
            .replace_all(&out, |caps: &Captures| match_case(&caps[0], replacement))
            .into_owned();
    }
    out
}

pub fn add_contractions(text: &str) -> String {
    let mut out = text.to_string();
    for (long_re, short, _, _) in contraction_regexes() {
        out = long_re
            .replace_all(&out, |caps: &Captures| match_case(&caps[0], short))
            .into_owned();
    }
    out
}

pub fn remove_contractions(text: &str) -> String {
    let mut out = text.to_string();
    for (_, _, short_re, long) in contraction_regexes() {
        out = short_re
            .replace_all(&out, |caps: &Captures| match_case(&caps[0], long))
            .into_owned();
    }
    out
}

fn strip_terminal(sentence: &str) -> &str {
    sentence.trim_end_matches(|c: char| is_terminator(c) || c == ',' || c == ';')
}

fn ensure_terminal(sentence: &str) -> String {
    let trimmed = sentence.trim();
    if trimmed.ends_with(|c: char| is_terminator(c) || c == '"' || c == ')') {
        trimmed.to_string()
    } else {
        format!("{}.", trimmed)
    }
}

/// Split a long sentence near its middle, preferring a comma boundary
fn split_near_middle(words: &[&str]) -> (String, String) {
    let mut split_point = words.len() / 2;
    let lo = split_point.saturating_sub(3);
    let hi = (split_point + 3).min(words.len().saturating_sub(1));
    for j in lo..hi {
        if words[j].ends_with(',') {
            split_point = j + 1;
            break;
        }
    }

    let first = words[..split_point].join(" ");
    let second = words[split_point..].join(" ");
    (
        ensure_terminal(strip_terminal(&first)),
        capitalize_first(&second),
    )
}

fn join_sentences(first: &str, second: &str) -> String {
    format!("{}, and {}", strip_terminal(first), lowercase_first(second))
}

/// Vary sentence lengths: split sentences over 20 words and join alternating medium pairs
pub fn increase_burstiness(text: &str) -> String {
    let sentences = split_sentences(text);
    if sentences.len() < 2 {
        return text.to_string();
    }

    let mut out: Vec<String> = Vec::with_capacity(sentences.len());
    let mut medium_seen = 0usize;
    let mut i = 0;

    while i < sentences.len() {
        let sentence = &sentences[i];
        let words: Vec<&str> = sentence.split_whitespace().collect();

        if words.len() > 20 {
            let (a, b) = split_near_middle(&words);
            out.push(a);
            out.push(b);
            i += 1;
        } else if words.len() >= 10 {
            medium_seen += 1;
            let next_len = sentences
                .get(i + 1)
                .map(|s| s.split_whitespace().count())
                .unwrap_or(usize::MAX);
            if medium_seen % 2 == 1 && next_len < 20 {
                out.push(join_sentences(sentence, &sentences[i + 1]));
                i += 2;
            } else {
                out.push(sentence.clone());
                i += 1;
            }
        } else {
            out.push(sentence.clone());
            i += 1;
        }
    }

    out.join(" ")
}

fn target_length(band: SentenceLength, index: usize) -> usize {
    match band {
        SentenceLength::Short => 8,
        SentenceLength::Medium => 16,
        SentenceLength::Long => 24,
        SentenceLength::Varied => {
            if index % 2 == 0 {
                8
            } else {
                20
            }
        }
    }
}

/// Reshape text towards a style template's sentence length and formality
pub fn apply_style(text: &str, style: &StyleTemplate) -> String {
    let sentences = split_sentences(text);
    let mut enhanced: Vec<String> = Vec::with_capacity(sentences.len());

    for (idx, sentence) in sentences.iter().enumerate() {
        let words: Vec<&str> = sentence.split_whitespace().collect();
        let target = target_length(style.sentence_length, idx);

        if words.len() > target + 5 && words.len() >= 4 {
            let (a, b) = split_near_middle(&words);
            enhanced.push(a);
            enhanced.push(b);
        } else if words.len() + 5 < target {
            match enhanced.last_mut() {
                Some(prev) if prev.split_whitespace().count() + 3 < target => {
                    *prev = ensure_terminal(&join_sentences(prev, sentence));
                }
                _ => enhanced.push(ensure_terminal(sentence)),
            }
        } else {
            enhanced.push(ensure_terminal(sentence));
        }
    }

    let joined = enhanced.join(" ");
    if style.formality < 0.5 {
        add_contractions(&joined)
    } else if style.formality > 0.7 {
        remove_contractions(&joined)
    } else {
        joined
    }
}

/// Deterministic rewrite applied before or after generation
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextPass {
    Decliche,
    Burstiness,
    Contractions,
}

pub const PRE_PASS_ORDER: [TextPass; 3] = [TextPass::Decliche, TextPass::Burstiness, TextPass::Contractions];
pub const POST_PASS_ORDER: [TextPass; 2] = [TextPass::Contractions, TextPass::Burstiness];

pub fn apply_pass(text: &str, pass: TextPass) -> String {
    match pass {
        TextPass::Decliche => replace_cliches(&normalize_punctuation(text)),
        TextPass::Burstiness => increase_burstiness(text),
        TextPass::Contractions => add_contractions(text),
    }
}

/// Apply the first `count` passes of `order`
pub fn apply_passes(text: &str, order: &[TextPass], count: usize) -> String {
    order
        .iter()
        .take(count)
        .fold(text.to_string(), |acc, pass| apply_pass(&acc, *pass))
}
