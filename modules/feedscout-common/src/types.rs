use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque identifier for one remote feed. Fetched independently of all others.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Content-derived identity used solely for duplicate suppression within one
/// run. Hex-encoded SHA-256 over normalized text, author, and the timestamp
/// truncated to the minute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A normalized unit of content from one source.
///
/// Immutable once created by a parser: search and filters produce derived
/// views, never mutate a message. `text` is never empty for a valid message;
/// a parse yielding empty text is a parse failure, not an empty message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Source-local message id.
    pub id: String,
    pub source_id: SourceId,
    /// Normalized plain text, HTML stripped, whitespace collapsed.
    pub text: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    /// 0 when unknown.
    pub views: u64,
    /// 0 when unknown.
    pub reactions: u64,
    /// Ordered, deduplicated within the message.
    pub mentions: Vec<String>,
    pub hashtags: Vec<String>,
    pub urls: Vec<String>,
    pub edited: bool,
    pub pinned: bool,
}

impl Message {
    /// Dedup fingerprint. The timestamp is truncated to the minute so that
    /// the same message seen with second-level jitter across overlapping
    /// fetches still collapses to one fingerprint.
    pub fn fingerprint(&self) -> Fingerprint {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.text.as_bytes());
        hasher.update([0]);
        hasher.update(self.author.as_bytes());
        hasher.update([0]);
        hasher.update(self.timestamp.format("%Y-%m-%dT%H:%M").to_string().as_bytes());
        Fingerprint(hex::encode(hasher.finalize()))
    }

    pub fn has_url(&self) -> bool {
        !self.urls.is_empty()
    }
}

/// A message that matched a query, paired with query-derived data.
/// Recomputed per query; never cached across different keyword sets.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub message: Message,
    /// Subset of the query's keywords found in the message text.
    pub matched_keywords: Vec<String>,
    /// Weighted combination of keyword density, popularity, and engagement,
    /// normalized per query. Always in [0, 100].
    pub relevance_score: f64,
    /// Bounded-length excerpt centered on the first match.
    pub text_snippet: String,
    /// Word window around the first match.
    pub context: String,
}

/// Immutable AND-combined set of hard constraints applied before scoring.
/// An absent field means "no constraint on that dimension", not "zero value".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterSpec {
    pub keywords: Option<Vec<String>>,
    /// Non-empty intersection with the message's hashtags (case-insensitive,
    /// leading `#` ignored).
    pub hashtags: Option<Vec<String>>,
    /// Non-empty intersection with the message's mentions (case-insensitive,
    /// leading `@` ignored).
    pub mentions: Option<Vec<String>>,
    /// Case-sensitive exact match.
    pub author: Option<String>,
    pub min_views: Option<u64>,
    /// Inclusive lower bound.
    pub date_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound.
    pub date_to: Option<DateTime<Utc>>,
    /// `Some(true)` keeps only messages carrying a URL, `Some(false)` only
    /// messages without one.
    pub has_url: Option<bool>,
}

impl FilterSpec {
    /// True when no constraint is present at all. A fully empty spec is a
    /// valid query: every message, ranked by popularity alone.
    pub fn is_empty(&self) -> bool {
        self.keywords.is_none()
            && self.hashtags.is_none()
            && self.mentions.is_none()
            && self.author.is_none()
            && self.min_views.is_none()
            && self.date_from.is_none()
            && self.date_to.is_none()
            && self.has_url.is_none()
    }
}
