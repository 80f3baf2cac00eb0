use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;
use tracing::debug;

use feedscout_common::types::{Message, SourceId};

/// Terminal state of one source within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Succeeded,
    Failed,
    /// Never started: the run was cancelled or the message cap was reached
    /// before this source was scheduled. Skipped sources are not attempted.
    Skipped,
}

/// Per-source record, keyed by source id in `RunStatistics`. Keying by id
/// (not completion order) keeps statistics reproducible regardless of
/// scheduling interleaving.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRecord {
    pub status: SourceStatus,
    /// Messages kept from this source after dedup.
    pub messages: usize,
    /// Fetch attempts made, including retries.
    pub attempts: u32,
    pub error: Option<String>,
}

/// Accumulated statistics for one orchestration run.
///
/// Never reset mid-run; a fresh run requires a fresh `StatsCollector`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStatistics {
    pub sources_attempted: usize,
    pub sources_succeeded: usize,
    pub sources_failed: usize,
    pub sources_skipped: usize,
    pub messages_collected: usize,
    pub duplicates_dropped: usize,
    pub matches_found: usize,
    pub total_views: u64,
    pub total_reactions: u64,
    pub duration_secs: f64,
    pub by_source: HashMap<String, SourceRecord>,
}

impl RunStatistics {
    /// Succeeded over attempted, in [0, 1]. Zero attempts yields 0.
    pub fn success_rate(&self) -> f64 {
        if self.sources_attempted == 0 {
            return 0.0;
        }
        self.sources_succeeded as f64 / self.sources_attempted as f64
    }

    pub fn avg_messages_per_source(&self) -> f64 {
        if self.sources_succeeded == 0 {
            return 0.0;
        }
        self.messages_collected as f64 / self.sources_succeeded as f64
    }
}

impl std::fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Fetch Run Complete ===")?;
        writeln!(f, "Sources attempted:  {}", self.sources_attempted)?;
        writeln!(f, "Sources succeeded:  {}", self.sources_succeeded)?;
        writeln!(f, "Sources failed:     {}", self.sources_failed)?;
        if self.sources_skipped > 0 {
            writeln!(f, "Sources skipped:    {}", self.sources_skipped)?;
        }
        writeln!(f, "Messages collected: {}", self.messages_collected)?;
        writeln!(f, "Duplicates dropped: {}", self.duplicates_dropped)?;
        if self.matches_found > 0 {
            writeln!(f, "Matches found:      {}", self.matches_found)?;
        }
        writeln!(f, "Success rate:       {:.0}%", self.success_rate() * 100.0)?;
        writeln!(f, "Duration:           {:.2}s", self.duration_secs)?;
        let mut failed: Vec<_> = self
            .by_source
            .iter()
            .filter(|(_, r)| r.status == SourceStatus::Failed)
            .collect();
        if !failed.is_empty() {
            failed.sort_by(|a, b| a.0.cmp(b.0));
            writeln!(f, "\nFailed sources:")?;
            for (source, record) in failed {
                writeln!(
                    f,
                    "  {} ({} attempts): {}",
                    source,
                    record.attempts,
                    record.error.as_deref().unwrap_or("unknown error")
                )?;
            }
        }
        Ok(())
    }
}

/// Passive, thread-safe accumulator fed by the orchestrator and the search
/// engine during a run. No behavior beyond accumulation and ratios.
#[derive(Debug)]
pub struct StatsCollector {
    inner: Mutex<RunStatistics>,
    started: Instant,
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RunStatistics::default()),
            started: Instant::now(),
        }
    }

    pub fn add_parsed_source(&self, source: &SourceId, messages: usize, attempts: u32) {
        let mut stats = self.lock();
        stats.sources_attempted += 1;
        stats.sources_succeeded += 1;
        stats.by_source.insert(
            source.as_str().to_string(),
            SourceRecord {
                status: SourceStatus::Succeeded,
                messages,
                attempts,
                error: None,
            },
        );
        debug!(source = %source, messages, "Recorded parsed source");
    }

    pub fn add_failed_source(&self, source: &SourceId, attempts: u32, error: &str) {
        let mut stats = self.lock();
        stats.sources_attempted += 1;
        stats.sources_failed += 1;
        stats.by_source.insert(
            source.as_str().to_string(),
            SourceRecord {
                status: SourceStatus::Failed,
                messages: 0,
                attempts,
                error: Some(error.to_string()),
            },
        );
        debug!(source = %source, error, "Recorded failed source");
    }

    pub fn add_skipped_source(&self, source: &SourceId) {
        let mut stats = self.lock();
        stats.sources_skipped += 1;
        stats.by_source.insert(
            source.as_str().to_string(),
            SourceRecord {
                status: SourceStatus::Skipped,
                messages: 0,
                attempts: 0,
                error: None,
            },
        );
    }

    pub fn add_message(&self, message: &Message) {
        let mut stats = self.lock();
        stats.messages_collected += 1;
        stats.total_views += message.views;
        stats.total_reactions += message.reactions;
    }

    pub fn add_duplicate(&self) {
        self.lock().duplicates_dropped += 1;
    }

    pub fn add_match(&self) {
        self.lock().matches_found += 1;
    }

    /// Snapshot of the totals so far. Reading never blocks writers for long:
    /// the snapshot is a clone taken under the lock.
    pub fn get_statistics(&self) -> RunStatistics {
        let mut stats = self.lock().clone();
        stats.duration_secs = self.started.elapsed().as_secs_f64();
        stats
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RunStatistics> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
