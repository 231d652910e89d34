//! Nigerian English / Pidgin text normalization.
//!
//! [`normalize`] prepares caller text for the acoustic model: it collapses
//! whitespace, softens punctuation and repetition spam, splits Pidgin
//! reduplicated intensifiers (`well-well` → `well, well`) so the model
//! pauses between them, and marks English/Pidgin code-switch boundaries
//! with commas.
//!
//! The rules run as a single pass that is repeated until the text stops
//! changing, so `normalize(normalize(x)) == normalize(x)` for every input.

use std::fmt;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Upper bound on normalized text length, in characters.
pub const MAX_NORMALIZED_CHARS: usize = 3000;

/// Longest run of identical letters or words that survives normalization.
pub const MAX_REPEAT: usize = 3;

const MAX_PASSES: usize = 8;

/// Reduplicated intensifiers that read better with a pause in the middle.
const SPLIT_INTENSIFIERS: &[&str] = &[
    "well", "sharp", "quick", "fine", "proper", "slow", "plenty", "sweet", "gently", "fast",
    "kpatakpata",
];

/// Clause-final discourse particles.
const TRAILING_PARTICLES: &[&str] = &["sha", "o", "oo", "jare", "abi", "sef", "shey", "ehn"];

/// Clause-initial interjections.
const LEADING_INTERJECTIONS: &[&str] = &[
    "abeg", "oya", "haba", "chai", "ehen", "omo", "walahi",
];

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

static INTENSIFIER_CHAINS: Lazy<Vec<Regex>> = Lazy::new(|| {
    SPLIT_INTENSIFIERS
        .iter()
        .map(|w| Regex::new(&format!(r"(?i)\b{w}(?:-{w})+\b")).expect("valid regex"))
        .collect()
});

static SMALL_SMALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(small) (small)\b").expect("valid regex"));

/// Text that has been through [`normalize`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NormalizedText(String);

impl NormalizedText {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn char_count(&self) -> usize {
        self.0.chars().count()
    }

    /// True when at least one letter or digit survived normalization.
    pub fn is_speakable(&self) -> bool {
        self.0.chars().any(char::is_alphanumeric)
    }
}

impl AsRef<str> for NormalizedText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize `text` for synthesis. Total over any string input.
pub fn normalize(text: &str) -> NormalizedText {
    let mut current = normalize_pass(text);
    for _ in 1..MAX_PASSES {
        let next = normalize_pass(&current);
        if next == current {
            return NormalizedText(current);
        }
        current = next;
    }
    log::debug!("normalization did not settle after {MAX_PASSES} passes");
    NormalizedText(current)
}

fn normalize_pass(text: &str) -> String {
    let t = WHITESPACE.replace_all(text.trim(), " ");
    let t = collapse_repeated_punctuation(&t);
    let t = collapse_letter_runs(&t);
    let t = collapse_word_runs(&t);
    let t = expand_intensifiers(&t);
    let t = mark_code_switches(&t);
    let t = cap_length(t, MAX_NORMALIZED_CHARS);
    ensure_terminal_punctuation(t)
}

fn collapse_repeated_punctuation(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev = None;
    for ch in text.chars() {
        if matches!(ch, '!' | '?' | '.' | ',') && prev == Some(ch) {
            continue;
        }
        out.push(ch);
        prev = Some(ch);
    }
    out
}

fn collapse_letter_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev = None;
    let mut run = 0usize;
    for ch in text.chars() {
        if Some(ch) == prev {
            run += 1;
        } else {
            prev = Some(ch);
            run = 1;
        }
        if ch.is_alphabetic() && run > MAX_REPEAT {
            continue;
        }
        out.push(ch);
    }
    out
}

/// Lowercased word with surrounding punctuation removed.
fn word_key(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

fn trailing_punctuation(word: &str) -> &str {
    let core_end = word
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_alphanumeric())
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    &word[core_end..]
}

fn collapse_word_runs(text: &str) -> String {
    let mut kept: Vec<String> = Vec::new();
    let mut prev_key = String::new();
    let mut run = 0usize;

    for word in text.split(' ').filter(|w| !w.is_empty()) {
        let key = word_key(word);
        if !key.is_empty() && key == prev_key {
            run += 1;
        } else {
            prev_key = key;
            run = 1;
        }

        if run > MAX_REPEAT {
            // Keep the sentence punctuation of dropped words.
            let punct = trailing_punctuation(word);
            if let Some(last) = kept.last_mut() {
                if !punct.is_empty() && trailing_punctuation(last).is_empty() {
                    last.push_str(punct);
                }
            }
            continue;
        }
        kept.push(word.to_string());
    }

    kept.join(" ")
}

fn expand_intensifiers(text: &str) -> String {
    let mut out = text.to_string();
    for re in INTENSIFIER_CHAINS.iter() {
        out = re
            .replace_all(&out, |caps: &Captures| caps[0].replace('-', ", "))
            .into_owned();
    }
    SMALL_SMALL.replace_all(&out, "$1-$2").into_owned()
}

fn ends_clause(word: &str) -> bool {
    word.ends_with(['.', '!', '?', ',', ';', ':'])
}

fn ends_bare(word: &str) -> bool {
    word.chars().last().is_some_and(char::is_alphanumeric)
}

fn mark_code_switches(text: &str) -> String {
    let mut words: Vec<String> = text.split(' ').map(str::to_string).collect();
    let mut clause_start = 0usize;

    for end in 0..words.len() {
        let last_word = end + 1 == words.len();
        if !ends_clause(&words[end]) && !last_word {
            continue;
        }

        // Interjection opening the clause: "Oya make we go" -> "Oya, make we go".
        if clause_start < end
            && ends_bare(&words[clause_start])
            && LEADING_INTERJECTIONS.contains(&word_key(&words[clause_start]).as_str())
        {
            words[clause_start].push(',');
        }

        // Particles closing the clause: "e be sha o!" -> "e be, sha o!".
        let mut run_start = end + 1;
        while run_start > clause_start {
            let candidate = &words[run_start - 1];
            let is_particle = TRAILING_PARTICLES.contains(&word_key(candidate).as_str());
            let attached_ok = run_start - 1 == end || ends_bare(candidate);
            if is_particle && attached_ok {
                run_start -= 1;
            } else {
                break;
            }
        }
        if run_start <= end && run_start > clause_start && ends_bare(&words[run_start - 1]) {
            words[run_start - 1].push(',');
        }

        clause_start = end + 1;
    }

    words.join(" ")
}

fn cap_length(text: String, cap: usize) -> String {
    if text.chars().count() <= cap {
        return text;
    }
    // Leave one character of room for terminal punctuation.
    let truncated: String = text.chars().take(cap.saturating_sub(1)).collect();
    truncated.trim_end().to_string()
}

fn ensure_terminal_punctuation(text: String) -> String {
    let mut t = text
        .trim_end_matches(|c: char| matches!(c, ',' | ';' | ':') || c.is_whitespace())
        .to_string();
    if t.is_empty() {
        return t;
    }
    if !t.ends_with(['.', '!', '?']) {
        t.push('.');
    }
    t
}
