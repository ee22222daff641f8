// Part-of-Speech Tagger
// Closed-class lexicon plus suffix rules; deterministic and model-free

use crate::services::text_processor::split_sentences;
use std::collections::HashMap;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PosTag {
    Determiner,
    Pronoun,
    Preposition,
    Conjunction,
    Auxiliary,
    Modal,
    Particle,
    Interjection,
    Number,
    Adverb,
    Adjective,
    Verb,
    Noun,
    ProperNoun,
}

pub const TAGSET_SIZE: usize = 14;

const DETERMINERS: &[&str] = &[
    "the", "a", "an", "this", "that", "these", "those", "each", "every", "some", "any", "no",
    "all", "both", "either", "neither", "its", "their", "our", "his", "her", "my", "your",
];
const PRONOUNS: &[&str] = &[
    "i", "you", "he", "she", "it", "we", "they", "me", "him", "us", "them", "who", "whom",
    "which", "what", "myself", "itself", "themselves", "something", "anything", "nothing",
    "someone", "everyone", "it's", "i'm", "you're", "we're", "they're", "i've", "we've",
];
const PREPOSITIONS: &[&str] = &[
    "of", "in", "on", "at", "by", "for", "with", "about", "against", "between", "into",
    "through", "during", "before", "after", "above", "below", "from", "up", "down", "over",
    "under", "across", "within", "without", "toward", "towards", "upon", "among",
];
const CONJUNCTIONS: &[&str] = &[
    "and", "but", "or", "nor", "so", "yet", "because", "although", "though", "while",
    "whereas", "if", "unless", "since", "whether", "than", "when", "where",
];
const AUXILIARIES: &[&str] = &[
    "is", "are", "was", "were", "be", "been", "being", "am", "has", "have", "had", "do",
    "does", "did", "isn't", "aren't", "wasn't", "weren't", "don't", "doesn't", "didn't",
    "hasn't", "haven't",
];
const MODALS: &[&str] = &[
    "can", "could", "will", "would", "shall", "should", "may", "might", "must", "can't",
    "won't", "wouldn't", "shouldn't", "couldn't",
];
const PARTICLES: &[&str] = &["to", "not", "n't"];
const INTERJECTIONS: &[&str] = &["oh", "wow", "hey", "well", "yeah", "ok", "okay", "hmm", "ah", "yes"];
const ADVERBS: &[&str] = &[
    "very", "also", "just", "still", "even", "never", "always", "often", "here", "there",
    "now", "then", "too", "quite", "rather", "almost", "already", "soon", "however",
];
const COMMON_VERBS: &[&str] = &[
    "make", "makes", "made", "get", "gets", "got", "go", "goes", "went", "take", "takes",
    "took", "see", "saw", "know", "knew", "think", "thought", "say", "said", "use", "uses",
    "need", "needs", "want", "wants", "give", "gave", "find", "found", "tell", "told",
    "become", "became", "show", "shows", "seem", "seems", "feel", "felt", "keep", "kept",
    "let", "help", "helps", "require", "requires", "provide", "provides", "include", "includes",
];

const ADJECTIVE_SUFFIXES: &[&str] = &["ous", "ful", "ive", "able", "ible", "ical", "less", "ish", "ary", "ant", "ent"];
const NOUN_SUFFIXES: &[&str] = &["tion", "sion", "ment", "ness", "ity", "ism", "ship", "ance", "ence", "er", "or", "ist"];
const VERB_SUFFIXES: &[&str] = &["ing", "ed", "ize", "ise", "ify", "ate"];

fn lexicon() -> &'static HashMap<&'static str, PosTag> {
    static LEX: std::sync::OnceLock<HashMap<&'static str, PosTag>> = std::sync::OnceLock::new();
    LEX.get_or_init(|| {
        let mut map = HashMap::new();
        let groups: [(&[&str], PosTag); 10] = [
            (COMMON_VERBS, PosTag::Verb),
            (ADVERBS, PosTag::Adverb),
            (INTERJECTIONS, PosTag::Interjection),
            (CONJUNCTIONS, PosTag::Conjunction),
            (PREPOSITIONS, PosTag::Preposition),
            (PRONOUNS, PosTag::Pronoun),
            (DETERMINERS, PosTag::Determiner),
            (PARTICLES, PosTag::Particle),
            (MODALS, PosTag::Modal),
            (AUXILIARIES, PosTag::Auxiliary),
        ];
        // Later groups win on overlap
        for (words, tag) in groups {
            for w in words {
                map.insert(*w, tag);
            }
        }
        map
    })
}

fn tag_word(raw: &str, sentence_initial: bool) -> Option<PosTag> {
    let trimmed = raw.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'');
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_lowercase();

    if let Some(tag) = lexicon().get(lower.as_str()) {
        return Some(*tag);
    }
    if trimmed.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',') {
        return Some(PosTag::Number);
    }
    if !sentence_initial && trimmed.chars().next().map_or(false, |c| c.is_uppercase()) {
        return Some(PosTag::ProperNoun);
    }
    if lower.len() > 4 && lower.ends_with("ly") {
        return Some(PosTag::Adverb);
    }
    let long_enough = |suffix: &str| lower.len() > suffix.len() + 2;
    if VERB_SUFFIXES.iter().any(|s| lower.ends_with(s) && long_enough(s)) {
        return Some(PosTag::Verb);
    }
    if ADJECTIVE_SUFFIXES.iter().any(|s| lower.ends_with(s) && long_enough(s)) {
        return Some(PosTag::Adjective);
    }
    if NOUN_SUFFIXES.iter().any(|s| lower.ends_with(s) && long_enough(s)) {
        return Some(PosTag::Noun);
    }
    Some(PosTag::Noun)
}

/// Tag every word of the text in order
pub fn tag_text(text: &str) -> Vec<PosTag> {
    let mut tags = Vec::new();
    for sentence in split_sentences(text) {
        for (i, word) in sentence.split_whitespace().enumerate() {
            if let Some(tag) = tag_word(word, i == 0) {
                tags.push(tag);
            }
        }
    }
    tags
}

/// POS entropy on 0-100: normalized Shannon entropy blended with tag coverage.
/// `None` with fewer than two tagged words.
pub fn pos_entropy(tags: &[PosTag]) -> Option<f64> {
    if tags.len() < 2 {
        return None;
    }

    let mut freq: HashMap<PosTag, usize> = HashMap::new();
    for tag in tags {
        *freq.entry(*tag).or_insert(0) += 1;
    }

    let total = tags.len() as f64;
    let entropy: f64 = freq
        .values()
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.log2()
        })
        .sum();

    let max_entropy = (tags.len().min(TAGSET_SIZE) as f64).log2();
    let normalized = if max_entropy > 0.0 { entropy / max_entropy } else { 0.0 };
    let coverage = freq.len() as f64 / TAGSET_SIZE as f64;

    Some((0.8 * normalized * 100.0 + 0.2 * coverage * 100.0).clamp(0.0, 100.0))
}
