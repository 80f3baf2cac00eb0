// Search engine — keyword matching, relevance scoring, compound filters.
//
// Read-only over the message set: queries produce derived SearchResults and
// never mutate or reorder the messages themselves. Scores are normalized per
// query (maxima over the filtered candidate set), so results are comparable
// within one result set even though absolute view counts vary wildly across
// sources.

use std::sync::Arc;

use tracing::{debug, info};

use feedscout_common::error::QueryError;
use feedscout_common::types::{FilterSpec, Message, SearchResult};

use crate::stats::StatsCollector;

/// Bounded snippet length in bytes (trimmed to char boundaries).
const SNIPPET_LEN: usize = 150;
/// Words of context kept on each side of the first match.
const CONTEXT_WORDS: usize = 5;

/// Aggregate view over one result set.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SearchSummary {
    pub total_results: usize,
    pub avg_relevance: f64,
    pub total_views: u64,
    pub total_reactions: u64,
    pub avg_views: f64,
    pub avg_reactions: f64,
}

pub struct SearchEngine {
    case_sensitive: bool,
    stats: Option<Arc<StatsCollector>>,
}

impl Default for SearchEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchEngine {
    /// Case-insensitive matching by default.
    pub fn new() -> Self {
        Self {
            case_sensitive: false,
            stats: None,
        }
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Count keyword matches into a shared stats collector.
    pub fn with_stats(mut self, stats: Arc<StatsCollector>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Rank `messages` against `keywords`, descending by relevance score,
    /// ties broken by descending views then original order. `limit`
    /// truncates after sorting; it never changes which messages are scored.
    ///
    /// Every message in the set is scored: one without a keyword hit simply
    /// gets a zero keyword term and competes on popularity and engagement
    /// alone, so the weighting arithmetic stays comparable across the set.
    pub fn search(
        &self,
        messages: &[Message],
        keywords: &[String],
        limit: Option<usize>,
    ) -> Result<Vec<SearchResult>, QueryError> {
        if keywords.is_empty() {
            return Err(QueryError::EmptyKeywordList);
        }
        let candidates: Vec<(usize, &Message)> = messages.iter().enumerate().collect();
        let results = self.rank(&candidates, keywords, limit);
        info!(
            keywords = ?keywords,
            candidates = messages.len(),
            results = results.len(),
            "Search complete"
        );
        Ok(results)
    }

    /// Apply every present filter as a hard AND constraint, then rank the
    /// survivors. Absent keywords is a valid mode: every kept message is
    /// scored from popularity and engagement alone. A fully empty spec
    /// degenerates to "all messages, popularity-ranked" — not an error.
    pub fn advanced_search(&self, messages: &[Message], spec: &FilterSpec) -> Vec<SearchResult> {
        let candidates: Vec<(usize, &Message)> = messages
            .iter()
            .enumerate()
            .filter(|(_, m)| passes_filters(m, spec))
            .collect();
        debug!(
            total = messages.len(),
            kept = candidates.len(),
            "Filters applied"
        );

        let keywords: &[String] = spec.keywords.as_deref().unwrap_or(&[]);
        let results = self.rank(&candidates, keywords, None);
        info!(
            total = messages.len(),
            filtered = candidates.len(),
            results = results.len(),
            "Advanced search complete"
        );
        results
    }

    /// Aggregate statistics over a result set.
    pub fn summarize(&self, results: &[SearchResult]) -> SearchSummary {
        if results.is_empty() {
            return SearchSummary::default();
        }
        let total_views: u64 = results.iter().map(|r| r.message.views).sum();
        let total_reactions: u64 = results.iter().map(|r| r.message.reactions).sum();
        let count = results.len();
        SearchSummary {
            total_results: count,
            avg_relevance: results.iter().map(|r| r.relevance_score).sum::<f64>() / count as f64,
            total_views,
            total_reactions,
            avg_views: total_views as f64 / count as f64,
            avg_reactions: total_reactions as f64 / count as f64,
        }
    }

    fn rank(
        &self,
        candidates: &[(usize, &Message)],
        keywords: &[String],
        limit: Option<usize>,
    ) -> Vec<SearchResult> {
        // Normalization denominators come from the filtered candidate set
        // for this query, not from global constants.
        let max_views = candidates.iter().map(|(_, m)| m.views).max().unwrap_or(0);
        let max_reactions = candidates
            .iter()
            .map(|(_, m)| m.reactions)
            .max()
            .unwrap_or(0);

        let mut ranked: Vec<(usize, u64, SearchResult)> = Vec::with_capacity(candidates.len());
        for (index, message) in candidates {
            let matched = self.match_keywords(&message.text, keywords);
            let score = relevance_score(
                matched.occurrences,
                message.text.split_whitespace().count(),
                message.views,
                max_views,
                message.reactions,
                max_reactions,
            );
            let (text_snippet, context) = match matched.first_offset {
                Some(offset) => (
                    centered_snippet(&message.text, offset),
                    word_context(&message.text, offset),
                ),
                None => (head_snippet(&message.text), String::new()),
            };

            if !matched.keywords.is_empty() {
                if let Some(stats) = &self.stats {
                    stats.add_match();
                }
            }

            ranked.push((
                *index,
                message.views,
                SearchResult {
                    message: (*message).clone(),
                    matched_keywords: matched.keywords,
                    relevance_score: score,
                    text_snippet,
                    context,
                },
            ));
        }

        // Descending score, descending views, then source-stable original
        // order — deterministic for equal scores and equal views.
        ranked.sort_by(|a, b| {
            b.2.relevance_score
                .total_cmp(&a.2.relevance_score)
                .then_with(|| b.1.cmp(&a.1))
                .then_with(|| a.0.cmp(&b.0))
        });

        let mut results: Vec<SearchResult> = ranked.into_iter().map(|(_, _, r)| r).collect();
        if let Some(limit) = limit {
            results.truncate(limit);
        }
        results
    }

    fn match_keywords(&self, text: &str, keywords: &[String]) -> KeywordMatches {
        let haystack = if self.case_sensitive {
            text.to_string()
        } else {
            text.to_lowercase()
        };

        let mut matched = KeywordMatches::default();
        for keyword in keywords {
            let needle = if self.case_sensitive {
                keyword.clone()
            } else {
                keyword.to_lowercase()
            };
            if needle.is_empty() {
                continue;
            }
            let count = haystack.matches(needle.as_str()).count();
            if count > 0 {
                matched.occurrences += count;
                matched.keywords.push(keyword.clone());
                if let Some(offset) = haystack.find(needle.as_str()) {
                    matched.first_offset = Some(match matched.first_offset {
                        Some(existing) => existing.min(offset),
                        None => offset,
                    });
                }
            }
        }
        matched
    }
}

#[derive(Debug, Default)]
struct KeywordMatches {
    keywords: Vec<String>,
    occurrences: usize,
    first_offset: Option<usize>,
}

/// Weighted relevance in [0, 100]:
/// 50 * keyword density + 30 * normalized views + 20 * normalized reactions.
/// A zero denominator zeroes that term rather than poisoning the score;
/// the final clamp guards against keyword occurrences exceeding the word
/// count (overlapping substring matches).
fn relevance_score(
    occurrences: usize,
    word_count: usize,
    views: u64,
    max_views: u64,
    reactions: u64,
    max_reactions: u64,
) -> f64 {
    let mut score = 0.0;
    if word_count > 0 {
        score += 50.0 * occurrences as f64 / word_count as f64;
    }
    if max_views > 0 {
        score += 30.0 * views as f64 / max_views as f64;
    }
    if max_reactions > 0 {
        score += 20.0 * reactions as f64 / max_reactions as f64;
    }
    score.clamp(0.0, 100.0)
}

fn head_snippet(text: &str) -> String {
    if text.len() <= SNIPPET_LEN {
        return text.to_string();
    }
    let mut end = SNIPPET_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// Fixed-width window centered on the first match offset, clamped to the
/// text and trimmed to char boundaries.
fn centered_snippet(text: &str, offset: usize) -> String {
    if text.len() <= SNIPPET_LEN {
        return text.to_string();
    }
    let offset = offset.min(text.len());
    let mut start = offset.saturating_sub(SNIPPET_LEN / 2);
    let mut end = (start + SNIPPET_LEN).min(text.len());
    if end - start < SNIPPET_LEN {
        start = end.saturating_sub(SNIPPET_LEN);
    }
    while !text.is_char_boundary(start) {
        start -= 1;
    }
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[start..end].to_string()
}

/// Surrounding word window: CONTEXT_WORDS on each side of the word
/// containing the match offset.
fn word_context(text: &str, offset: usize) -> String {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return String::new();
    }
    let word_index = text[..offset].split_whitespace().count().min(words.len() - 1);
    let start = word_index.saturating_sub(CONTEXT_WORDS);
    let end = (word_index + CONTEXT_WORDS + 1).min(words.len());
    format!("...{}...", words[start..end].join(" "))
}

fn passes_filters(message: &Message, spec: &FilterSpec) -> bool {
    if let Some(from) = spec.date_from {
        if message.timestamp < from {
            return false;
        }
    }
    if let Some(to) = spec.date_to {
        if message.timestamp > to {
            return false;
        }
    }
    if let Some(hashtags) = &spec.hashtags {
        if !intersects(hashtags, &message.hashtags, '#') {
            return false;
        }
    }
    if let Some(mentions) = &spec.mentions {
        if !intersects(mentions, &message.mentions, '@') {
            return false;
        }
    }
    if let Some(author) = &spec.author {
        if message.author != *author {
            return false;
        }
    }
    if let Some(min_views) = spec.min_views {
        if message.views < min_views {
            return false;
        }
    }
    if let Some(has_url) = spec.has_url {
        if message.has_url() != has_url {
            return false;
        }
    }
    true
}

/// Case-insensitive non-empty intersection, ignoring a leading sigil on
/// either side.
fn intersects(wanted: &[String], present: &[String], sigil: char) -> bool {
    wanted.iter().any(|w| {
        let w = w.trim_start_matches(sigil).to_lowercase();
        present
            .iter()
            .any(|p| p.trim_start_matches(sigil).to_lowercase() == w)
    })
}
