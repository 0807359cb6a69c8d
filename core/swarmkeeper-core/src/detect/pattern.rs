//! Text pattern matching over captured pane output.
//!
//! Patterns are OR-ed: the first pattern (in caller order) that matches wins
//! and the rest are never evaluated. Three modes:
//!
//! - **Literal**: raw substring containment.
//! - **Regex**: searched over the whole capture; invalid patterns are skipped.
//! - **Fuzzy**: case-folded, whitespace-collapsed comparison with a cheap
//!   similarity score as fallback.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use tracing::debug;

use super::DetectionResult;
use crate::tmux::count_lines;
use crate::types::truncate_chars;

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

pub const DEFAULT_FUZZY_THRESHOLD: f64 = 80.0;
const SUBSTRING_SCORE: f64 = 80.0;
const EXCERPT_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Literal,
    Regex { case_insensitive: bool },
    Fuzzy,
}

impl MatchMode {
    /// Regex wins over fuzzy; asking for both means case-insensitive regex.
    pub fn from_flags(regex: bool, fuzzy: bool) -> Self {
        match (regex, fuzzy) {
            (true, fuzzy) => MatchMode::Regex {
                case_insensitive: fuzzy,
            },
            (false, true) => MatchMode::Fuzzy,
            (false, false) => MatchMode::Literal,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternSet {
    pub patterns: Vec<String>,
    pub mode: MatchMode,
    pub fuzzy_threshold: f64,
}

impl PatternSet {
    pub fn new(patterns: Vec<String>, mode: MatchMode) -> Self {
        Self {
            patterns,
            mode,
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.fuzzy_threshold = threshold;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    pub pattern: String,
    pub excerpt: String,
}

/// Lowercases, collapses whitespace runs to one space, and trims.
pub fn normalize(text: &str) -> String {
    RE_WHITESPACE
        .replace_all(&text.to_lowercase(), " ")
        .trim()
        .to_string()
}

/// Similarity between two strings on a 0–100 scale.
///
/// Identical (after normalization) scores 100. Otherwise the share of
/// position-aligned equal characters over the longer length, lifted to 80
/// when one string contains the other.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let a = normalize(a);
    let b = normalize(b);
    if a == b {
        return 100.0;
    }

    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let max_len = a_chars.len().max(b_chars.len());
    let aligned = a_chars
        .iter()
        .zip(b_chars.iter())
        .filter(|(x, y)| x == y)
        .count();

    let mut score = aligned as f64 / max_len as f64 * 100.0;
    if a.contains(b.as_str()) || b.contains(a.as_str()) {
        score = score.max(SUBSTRING_SCORE);
    }
    score
}

/// Fuzzy search for `pattern` in `text`; returns the excerpt on success.
pub fn fuzzy_match(text: &str, pattern: &str, threshold: f64) -> Option<String> {
    let norm_text = normalize(text);
    let norm_pattern = normalize(pattern);
    let pattern_words: Vec<&str> = norm_pattern.split(' ').filter(|w| !w.is_empty()).collect();

    if norm_text.contains(norm_pattern.as_str()) {
        let located = text.split('\n').find(|line| {
            let norm_line = normalize(line);
            !pattern_words.is_empty() && pattern_words.iter().all(|w| norm_line.contains(w))
        });
        return Some(match located {
            Some(line) => line.trim().to_string(),
            None => head(text),
        });
    }

    if similarity(&norm_text, &norm_pattern) >= threshold {
        return Some(head(text));
    }

    for line in text.split('\n') {
        let norm_line = normalize(line);
        if norm_line.contains(norm_pattern.as_str()) {
            return Some(line.trim().to_string());
        }

        let line_words: Vec<&str> = norm_line.split(' ').filter(|w| !w.is_empty()).collect();
        if !pattern_words.is_empty() && !line_words.is_empty() {
            let all_words_found = pattern_words.iter().all(|pw| {
                line_words
                    .iter()
                    .any(|lw| lw.contains(pw) || similarity(pw, lw) >= threshold)
            });
            if all_words_found {
                return Some(line.trim().to_string());
            }
        }

        if similarity(&norm_line, &norm_pattern) >= threshold {
            return Some(line.trim().to_string());
        }
    }

    None
}

fn head(text: &str) -> String {
    truncate_chars(text.trim(), EXCERPT_CHARS)
}

fn literal_match(text: &str, pattern: &str) -> Option<String> {
    if !text.contains(pattern) {
        return None;
    }
    text.split('\n')
        .find(|line| line.contains(pattern))
        .map(|line| line.trim().to_string())
}

fn regex_match(text: &str, pattern: &str, case_insensitive: bool) -> Option<String> {
    let re = match RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
    {
        Ok(re) => re,
        Err(err) => {
            debug!(pattern = %pattern, error = %err, "Skipping invalid regex pattern");
            return None;
        }
    };
    re.find(text).map(|m| m.as_str().to_string())
}

/// First matching pattern in `set`, if any.
pub fn find_match(text: &str, set: &PatternSet) -> Option<PatternMatch> {
    set.patterns.iter().find_map(|pattern| {
        let excerpt = match set.mode {
            MatchMode::Literal => literal_match(text, pattern),
            MatchMode::Regex { case_insensitive } => regex_match(text, pattern, case_insensitive),
            MatchMode::Fuzzy => fuzzy_match(text, pattern, set.fuzzy_threshold),
        }?;
        Some(PatternMatch {
            pattern: pattern.clone(),
            excerpt,
        })
    })
}

/// Runs the pattern set against already captured output of a live session.
pub fn detect(session: &str, text: &str, set: &PatternSet) -> DetectionResult {
    let line_count = count_lines(text);
    match find_match(text, set) {
        Some(found) => DetectionResult {
            matched: true,
            matched_pattern: Some(found.pattern),
            matched_text: Some(found.excerpt),
            ..DetectionResult::unmatched(session, line_count)
        },
        None => DetectionResult::unmatched(session, line_count),
    }
}
