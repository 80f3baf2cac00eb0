// Test mocks for the fetch pipeline.
//
// Two mocks matching the two trait boundaries:
// - MockFetcher (Fetcher) — scripted per-source response sequences, with
//   call counting and an in-flight high-water mark for concurrency tests
// - MockParser (MessageParser) — line-per-message passthrough, with
//   scripted per-source errors
//
// Plus helpers for constructing messages and sources.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};

use feedscout_common::error::{FetchError, ParseError};
use feedscout_common::types::{Message, SourceId};

use crate::traits::{Fetcher, MessageParser};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

pub fn source(name: &str) -> SourceId {
    SourceId::new(name)
}

/// Message with a fixed timestamp so fingerprints depend only on text and
/// author.
pub fn message(id: &str, text: &str) -> Message {
    Message {
        id: id.to_string(),
        source_id: SourceId::new("test-feed"),
        text: text.to_string(),
        author: "tester".to_string(),
        timestamp: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        views: 0,
        reactions: 0,
        mentions: vec![],
        hashtags: vec![],
        urls: vec![],
        edited: false,
        pinned: false,
    }
}

pub fn message_with_stats(id: &str, text: &str, views: u64, reactions: u64) -> Message {
    Message {
        views,
        reactions,
        ..message(id, text)
    }
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Scripted fetcher. Each source carries a response sequence; the last entry
/// repeats once the sequence is exhausted, so "fail twice then succeed" and
/// "always succeed" are both one script. Unscripted sources fail permanently.
///
/// Builder pattern: `.on_success()`, `.fails_transient()`, `.fails_permanent()`,
/// `.with_delay()`.
pub struct MockFetcher {
    scripts: Mutex<HashMap<SourceId, VecDeque<Result<Bytes, FetchError>>>>,
    calls: Mutex<HashMap<SourceId, usize>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            delay: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn push(self, source: &str, entry: Result<Bytes, FetchError>) -> Self {
        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(SourceId::new(source))
            .or_default()
            .push_back(entry);
        self
    }

    /// Every remaining fetch of `source` returns `content`.
    pub fn on_success(self, source: &str, content: &str) -> Self {
        self.push(source, Ok(Bytes::from(content.to_string())))
    }

    /// The next `times` fetches of `source` fail transiently.
    pub fn fails_transient(self, source: &str, times: usize) -> Self {
        let mut fetcher = self;
        for _ in 0..times {
            fetcher = fetcher.push(
                source,
                Err(FetchError::Transient("scripted transient failure".into())),
            );
        }
        fetcher
    }

    /// Every remaining fetch of `source` fails permanently.
    pub fn fails_permanent(self, source: &str) -> Self {
        self.push(
            source,
            Err(FetchError::Permanent("scripted permanent failure".into())),
        )
    }

    /// Hold every fetch for `delay` before responding. Gives overlapping
    /// workers time to actually overlap in concurrency tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of fetch calls made for `source`.
    pub fn calls(&self, source: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&SourceId::new(source))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .sum()
    }

    /// Highest number of fetches observed simultaneously in flight.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_response(&self, source: &SourceId) -> Result<Bytes, FetchError> {
        let mut scripts = self.scripts.lock().unwrap_or_else(|e| e.into_inner());
        match scripts.get_mut(source) {
            Some(script) if !script.is_empty() => {
                if script.len() > 1 {
                    script.pop_front().expect("non-empty script")
                } else {
                    script.front().expect("non-empty script").clone()
                }
            }
            _ => Err(FetchError::Permanent(format!(
                "no scripted response for {source}"
            ))),
        }
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, source: &SourceId) -> Result<Bytes, FetchError> {
        *self
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(source.clone())
            .or_insert(0) += 1;

        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let response = self.next_response(source);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }
}

// ---------------------------------------------------------------------------
// MockParser
// ---------------------------------------------------------------------------

/// Line-per-message parser. Each non-empty line of the UTF-8 content becomes
/// one message with that line as text and a fixed timestamp, so identical
/// lines across sources produce identical fingerprints. Sources registered
/// via `.fails_for()` error instead.
pub struct MockParser {
    errors: HashMap<SourceId, ParseError>,
}

impl Default for MockParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MockParser {
    pub fn new() -> Self {
        Self {
            errors: HashMap::new(),
        }
    }

    pub fn fails_for(mut self, source: &str, error: ParseError) -> Self {
        self.errors.insert(SourceId::new(source), error);
        self
    }
}

#[async_trait]
impl MessageParser for MockParser {
    async fn parse(
        &self,
        content: &[u8],
        source: &SourceId,
    ) -> Result<Vec<Message>, ParseError> {
        if let Some(error) = self.errors.get(source) {
            return Err(error.clone());
        }
        let text = std::str::from_utf8(content)
            .map_err(|e| ParseError::Invalid(format!("content is not valid UTF-8: {e}")))?;
        Ok(text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(index, line)| Message {
                source_id: source.clone(),
                ..message(&index.to_string(), line.trim())
            })
            .collect())
    }
}
