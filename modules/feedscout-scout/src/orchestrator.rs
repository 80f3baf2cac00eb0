// Fetch orchestrator — turns a list of source ids into a deduplicated,
// parsed message set under a concurrency bound, with linear-backoff retry
// and per-run statistics.
//
// Concurrency discipline: the message set, the dedup set, and the stats
// accumulator each sit behind their own lock; a worker holds at most one of
// them at a time and never across a fetch or parse call, so slow I/O is
// never serialized behind a mutex.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use feedscout_common::config::Config;
use feedscout_common::error::{FetchError, OrchestratorError};
use feedscout_common::types::{Message, SourceId};

use crate::dedup::Deduplicator;
use crate::stats::{RunStatistics, StatsCollector};
use crate::traits::{Fetcher, MessageParser};

/// Options for one orchestration run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Maximum sources in flight at once (minimum 1).
    pub max_concurrency: usize,
    /// Total fetch attempts allowed per source; transient failures retry
    /// until the budget is spent. 0 is treated as 1.
    pub max_retries: u32,
    /// Base retry delay. The delay before attempt N+1 is base * N — linear,
    /// not exponential, so the worst-case run time stays predictable.
    pub retry_backoff: Duration,
    /// Per-attempt fetch timeout. Expiry is a transient failure.
    pub fetch_timeout: Duration,
    /// Optional global cap on collected messages. Once reached, no new
    /// fetch work is scheduled; in-flight work completes and is kept.
    pub max_messages: Option<usize>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl RunOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_concurrency: config.max_concurrency,
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff,
            fetch_timeout: config.fetch_timeout,
            max_messages: config.max_messages,
        }
    }
}

/// Cooperative cancellation flag shared between the caller and a run.
///
/// Checked before each source starts; in-flight sources finish normally.
/// Cancellation is an early, valid termination, not a failure.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of one orchestration run: the deduplicated message set (no
/// guaranteed ordering) plus the run's statistics.
#[derive(Debug)]
pub struct RunOutcome {
    pub messages: Vec<Message>,
    pub stats: RunStatistics,
}

enum SourceOutcome {
    Succeeded,
    Failed,
    Skipped,
}

/// Schedules fetch+parse work across sources, deduplicates, and accumulates
/// statistics. Holds no per-run state itself: each `run` gets a fresh
/// deduplicator and message set.
pub struct Orchestrator {
    fetcher: Arc<dyn Fetcher>,
    parser: Arc<dyn MessageParser>,
    cancel: CancelToken,
    stats: Option<Arc<StatsCollector>>,
}

impl Orchestrator {
    pub fn new(fetcher: Arc<dyn Fetcher>, parser: Arc<dyn MessageParser>) -> Self {
        Self {
            fetcher,
            parser,
            cancel: CancelToken::new(),
            stats: None,
        }
    }

    /// Attach a cancellation token the caller keeps a handle to.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Share a stats collector with other components (e.g. the search
    /// engine's match counter). Must be fresh for each run.
    pub fn with_stats(mut self, stats: Arc<StatsCollector>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Run the full fetch/parse/dedup pipeline over `sources`.
    ///
    /// Duplicate source ids are deduplicated before scheduling (first
    /// occurrence wins, submission order preserved). A single source's
    /// failure is absorbed into the statistics; the run itself fails only
    /// when every scheduled source failed.
    pub async fn run(
        &self,
        sources: &[SourceId],
        options: &RunOptions,
    ) -> Result<RunOutcome, OrchestratorError> {
        let fresh_stats;
        let stats: &StatsCollector = match self.stats.as_deref() {
            Some(shared) => shared,
            None => {
                fresh_stats = StatsCollector::new();
                &fresh_stats
            }
        };

        let mut submitted = HashSet::new();
        let scheduled: Vec<SourceId> = sources
            .iter()
            .filter(|s| submitted.insert((*s).clone()))
            .cloned()
            .collect();

        let concurrency = options.max_concurrency.max(1);
        info!(
            submitted = sources.len(),
            scheduled = scheduled.len(),
            concurrency,
            "Starting fetch run"
        );

        let dedup = Deduplicator::new();
        let collected: Mutex<Vec<Message>> = Mutex::new(Vec::new());
        let kept_total = AtomicUsize::new(0);

        let outcomes: Vec<SourceOutcome> = stream::iter(scheduled.iter().map(|source| {
            let dedup = &dedup;
            let collected = &collected;
            let kept_total = &kept_total;
            async move {
                if self.cancel.is_cancelled() {
                    info!(source = %source, "Run cancelled, skipping source");
                    stats.add_skipped_source(source);
                    return SourceOutcome::Skipped;
                }
                if let Some(cap) = options.max_messages {
                    if kept_total.load(Ordering::SeqCst) >= cap {
                        info!(source = %source, cap, "Message cap reached, skipping source");
                        stats.add_skipped_source(source);
                        return SourceOutcome::Skipped;
                    }
                }

                let (content, attempts) = match self.fetch_with_retry(source, options).await {
                    Ok(fetched) => fetched,
                    Err((error, attempts)) => {
                        warn!(source = %source, attempts, error = %error, "Source failed");
                        stats.add_failed_source(source, attempts, &error.to_string());
                        return SourceOutcome::Failed;
                    }
                };

                let candidates = match self.parser.parse(&content, source).await {
                    Ok(candidates) => candidates,
                    Err(error) => {
                        warn!(source = %source, error = %error, "Parse failed");
                        stats.add_failed_source(source, attempts, &error.to_string());
                        return SourceOutcome::Failed;
                    }
                };

                // An empty parse is a success that contributes zero messages.
                let parsed = candidates.len();
                let mut fresh = Vec::new();
                for message in candidates {
                    if dedup.insert_if_new(message.fingerprint()) {
                        fresh.push(message);
                    } else {
                        stats.add_duplicate();
                    }
                }
                for message in &fresh {
                    stats.add_message(message);
                }
                let kept = fresh.len();
                kept_total.fetch_add(kept, Ordering::SeqCst);
                collected
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .extend(fresh);
                stats.add_parsed_source(source, kept, attempts);
                info!(source = %source, parsed, kept, attempts, "Source complete");
                SourceOutcome::Succeeded
            }
        }))
        .buffer_unordered(concurrency)
        .collect()
        .await;

        let failed = outcomes
            .iter()
            .filter(|o| matches!(o, SourceOutcome::Failed))
            .count();
        if !scheduled.is_empty() && failed == scheduled.len() {
            return Err(OrchestratorError::AllSourcesFailed { failed });
        }

        let messages = collected.into_inner().unwrap_or_else(|e| e.into_inner());
        let snapshot = stats.get_statistics();
        info!("{snapshot}");
        Ok(RunOutcome {
            messages,
            stats: snapshot,
        })
    }

    /// One source's fetch state machine: Attempting → Succeeded, or
    /// Attempting → RetryScheduled (transient, budget left) → Attempting,
    /// or terminal Failed. Returns the content and the attempt count.
    async fn fetch_with_retry(
        &self,
        source: &SourceId,
        options: &RunOptions,
    ) -> Result<(Bytes, u32), (FetchError, u32)> {
        let max_attempts = options.max_retries.max(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = match timeout(options.fetch_timeout, self.fetcher.fetch(source)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Transient(format!(
                    "fetch timed out after {}ms",
                    options.fetch_timeout.as_millis()
                ))),
            };
            match result {
                Ok(content) => return Ok((content, attempt)),
                Err(error) if error.is_transient() && attempt < max_attempts => {
                    let backoff = options.retry_backoff * attempt;
                    warn!(
                        source = %source,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %error,
                        "Transient failure, retrying after backoff"
                    );
                    sleep(backoff).await;
                }
                Err(error) => return Err((error, attempt)),
            }
        }
    }
}
