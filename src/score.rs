//! Relevance scoring of work items against a free-text query.
//!
//! Scoring is a weighted token-overlap: titles are curated and carry more
//! intent signal than free-form discussion text, so title overlap gets the
//! larger weight. Only records at or above the match threshold materialize
//! as [`ScoredMatch`]es.

use crate::models::{ScoredMatch, WorkItem};

/// Minimum token length; shorter alphanumeric runs are noise.
pub const MIN_TOKEN_LEN: usize = 2;
/// Weight of the title overlap fraction.
pub const TITLE_WEIGHT: f64 = 0.6;
/// Weight of the discussion overlap fraction.
pub const DISCUSSION_WEIGHT: f64 = 0.4;
/// Records scoring below this are discarded. Fixed, not configurable.
pub const SCORE_THRESHOLD: f64 = 0.30;
/// Approximate excerpt window width in characters.
const EXCERPT_WIDTH: usize = 120;

/// Normalize text for matching: strip markup-like tags, collapse
/// whitespace, lowercase.
pub fn normalize(text: &str) -> String {
    let mut stripped = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                // Tags separate words ("a<br>b" must not fuse).
                stripped.push(' ');
            }
            _ if !in_tag => stripped.push(c),
            _ => {}
        }
    }
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Tokenize normalized text into lowercase alphanumeric runs of length
/// >= [`MIN_TOKEN_LEN`]. Order is preserved and duplicates are kept.
pub fn tokenize(normalized: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in normalized.chars().chain(std::iter::once(' ')) {
        if c.is_ascii_alphanumeric() {
            current.push(c);
        } else if !current.is_empty() {
            if current.len() >= MIN_TOKEN_LEN {
                tokens.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
        }
    }
    tokens
}

/// Score a record against a query: `0.6 * titleOverlap + 0.4 * discOverlap`.
///
/// Overlap fractions count unique query tokens found in the text's token
/// set, over the *original* query token count (duplicates included, so they
/// dilute rather than add weight). Returns `None` when the query yields no
/// tokens — no score is computable, and the record is excluded rather than
/// dividing by zero.
pub fn score(query: &str, title: &str, discussion: &str) -> Option<f64> {
    let query_tokens = tokenize(&normalize(query));
    if query_tokens.is_empty() {
        return None;
    }
    let denominator = query_tokens.len() as f64;

    let unique: std::collections::BTreeSet<&str> =
        query_tokens.iter().map(|t| t.as_str()).collect();
    let title_set: std::collections::BTreeSet<String> =
        tokenize(&normalize(title)).into_iter().collect();
    let disc_set: std::collections::BTreeSet<String> =
        tokenize(&normalize(discussion)).into_iter().collect();

    let title_hits = unique.iter().filter(|t| title_set.contains(**t)).count() as f64;
    let disc_hits = unique.iter().filter(|t| disc_set.contains(**t)).count() as f64;

    Some(TITLE_WEIGHT * (title_hits / denominator) + DISCUSSION_WEIGHT * (disc_hits / denominator))
}

/// Compute a ~120-character excerpt around the first case-insensitive
/// occurrence of the query phrase in the normalized discussion text, with
/// ellipsis markers at truncated edges. Falls back to the leading window
/// when the phrase does not occur.
pub fn excerpt(query: &str, discussion: &str) -> String {
    let normalized = normalize(discussion);
    let chars: Vec<char> = normalized.chars().collect();
    if chars.is_empty() {
        return String::new();
    }

    let needle = query.trim().to_lowercase();
    let found = if needle.is_empty() {
        None
    } else {
        normalized.find(&needle)
    };

    let (start, end) = match found {
        Some(byte_pos) => {
            let char_pos = normalized[..byte_pos].chars().count();
            let center = char_pos + needle.chars().count() / 2;
            let start = center.saturating_sub(EXCERPT_WIDTH / 2);
            (start, (start + EXCERPT_WIDTH).min(chars.len()))
        }
        None => (0, EXCERPT_WIDTH.min(chars.len())),
    };

    let mut out = String::new();
    if start > 0 {
        out.push('…');
    }
    out.extend(&chars[start..end]);
    if end < chars.len() {
        out.push('…');
    }
    out
}

/// Score, threshold, and rank a fetched record set against a query.
///
/// The sort is stable and descending by score, so equal scores keep the
/// original fetch order (most-recently-changed first).
pub fn rank(query: &str, items: &[(WorkItem, String)]) -> Vec<ScoredMatch> {
    let mut matches: Vec<ScoredMatch> = items
        .iter()
        .filter_map(|(item, discussion)| {
            let score = score(query, item.title(), discussion)?;
            if score < SCORE_THRESHOLD {
                return None;
            }
            Some(ScoredMatch {
                id: item.id,
                title: item.title().to_string(),
                state: item.state().to_string(),
                score,
                excerpt: excerpt(query, discussion),
            })
        })
        .collect();

    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matches
}
