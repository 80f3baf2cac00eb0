// Orchestrator behavior tests: mocks at the fetch/parse boundary, assertions
// on the collected message set and the run statistics.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use feedscout_common::error::{FetchError, OrchestratorError, ParseError};
use feedscout_common::types::SourceId;

use crate::orchestrator::{CancelToken, Orchestrator, RunOptions};
use crate::search::SearchEngine;
use crate::stats::{SourceStatus, StatsCollector};
use crate::testing::{source, MockFetcher, MockParser};
use crate::traits::Fetcher;

fn options() -> RunOptions {
    RunOptions {
        max_concurrency: 5,
        max_retries: 2,
        retry_backoff: Duration::from_millis(1),
        fetch_timeout: Duration::from_secs(5),
        max_messages: None,
    }
}

fn orchestrator(fetcher: MockFetcher, parser: MockParser) -> (Orchestrator, Arc<MockFetcher>) {
    let fetcher = Arc::new(fetcher);
    let orchestrator = Orchestrator::new(fetcher.clone(), Arc::new(parser));
    (orchestrator, fetcher)
}

#[tokio::test]
async fn collects_messages_across_sources() {
    let (orchestrator, _) = orchestrator(
        MockFetcher::new()
            .on_success("a", "first from a\nsecond from a")
            .on_success("b", "only from b"),
        MockParser::new(),
    );

    let outcome = orchestrator
        .run(&[source("a"), source("b")], &options())
        .await
        .unwrap();

    assert_eq!(outcome.messages.len(), 3);
    assert_eq!(outcome.stats.sources_attempted, 2);
    assert_eq!(outcome.stats.sources_succeeded, 2);
    assert_eq!(outcome.stats.messages_collected, 3);
}

#[tokio::test]
async fn transient_failures_stop_at_the_attempt_budget() {
    // max_retries = 2 allows exactly two fetch attempts; the third call is
    // never made and the source is marked failed while the run still
    // succeeds on the healthy source.
    let (orchestrator, fetcher) = orchestrator(
        MockFetcher::new()
            .fails_transient("flaky", 5)
            .on_success("healthy", "hello"),
        MockParser::new(),
    );

    let outcome = orchestrator
        .run(&[source("flaky"), source("healthy")], &options())
        .await
        .unwrap();

    assert_eq!(fetcher.calls("flaky"), 2);
    assert_eq!(outcome.messages.len(), 1);
    assert_eq!(outcome.stats.sources_failed, 1);
    assert_eq!(outcome.stats.by_source["flaky"].status, SourceStatus::Failed);
    assert_eq!(outcome.stats.by_source["flaky"].attempts, 2);
}

#[tokio::test]
async fn permanent_failure_is_not_retried() {
    let (orchestrator, fetcher) = orchestrator(
        MockFetcher::new()
            .fails_permanent("gone")
            .on_success("ok", "hello"),
        MockParser::new(),
    );

    let outcome = orchestrator
        .run(&[source("gone"), source("ok")], &options())
        .await
        .unwrap();

    assert_eq!(fetcher.calls("gone"), 1);
    assert_eq!(outcome.stats.by_source["gone"].attempts, 1);
    assert_eq!(outcome.stats.sources_failed, 1);
}

#[tokio::test]
async fn parse_error_fails_the_source_without_refetching() {
    let (orchestrator, fetcher) = orchestrator(
        MockFetcher::new().on_success("garbled", "content"),
        MockParser::new().fails_for("garbled", ParseError::Invalid("bad markup".into())),
    );

    let err = orchestrator
        .run(&[source("garbled")], &options())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrchestratorError::AllSourcesFailed { failed: 1 }
    ));
    assert_eq!(fetcher.calls("garbled"), 1);
}

#[tokio::test]
async fn zero_message_parse_is_a_success() {
    let (orchestrator, _) = orchestrator(
        MockFetcher::new().on_success("quiet", ""),
        MockParser::new(),
    );

    let outcome = orchestrator.run(&[source("quiet")], &options()).await.unwrap();

    assert!(outcome.messages.is_empty());
    assert_eq!(outcome.stats.sources_succeeded, 1);
    assert_eq!(outcome.stats.sources_failed, 0);
    assert_eq!(outcome.stats.by_source["quiet"].messages, 0);
}

#[tokio::test]
async fn run_fails_only_when_every_source_failed() {
    let (orchestrator, _) = orchestrator(
        MockFetcher::new().fails_permanent("a").fails_permanent("b"),
        MockParser::new(),
    );

    let err = orchestrator
        .run(&[source("a"), source("b")], &options())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrchestratorError::AllSourcesFailed { failed: 2 }
    ));
}

#[tokio::test]
async fn empty_source_list_is_an_empty_success() {
    let (orchestrator, _) = orchestrator(MockFetcher::new(), MockParser::new());
    let outcome = orchestrator.run(&[], &options()).await.unwrap();
    assert!(outcome.messages.is_empty());
    assert_eq!(outcome.stats.sources_attempted, 0);
}

#[tokio::test]
async fn cross_source_duplicates_are_dropped_under_concurrency() {
    // The same line appears in both sources; with a delayed fetcher both
    // workers overlap, and exactly one copy survives.
    let (orchestrator, _) = orchestrator(
        MockFetcher::new()
            .with_delay(Duration::from_millis(10))
            .on_success("a", "shared story\nunique to a")
            .on_success("b", "shared story\nunique to b"),
        MockParser::new(),
    );

    let outcome = orchestrator
        .run(&[source("a"), source("b")], &options())
        .await
        .unwrap();

    assert_eq!(outcome.messages.len(), 3);
    assert_eq!(outcome.stats.duplicates_dropped, 1);

    let fingerprints: HashSet<_> = outcome.messages.iter().map(|m| m.fingerprint()).collect();
    assert_eq!(fingerprints.len(), outcome.messages.len());
}

#[tokio::test]
async fn single_worker_preserves_submission_order() {
    let (orchestrator, _) = orchestrator(
        MockFetcher::new()
            .on_success("first", "m1")
            .on_success("second", "m2")
            .on_success("third", "m3"),
        MockParser::new(),
    );

    let outcome = orchestrator
        .run(
            &[source("first"), source("second"), source("third")],
            &RunOptions {
                max_concurrency: 1,
                ..options()
            },
        )
        .await
        .unwrap();

    let texts: Vec<&str> = outcome.messages.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["m1", "m2", "m3"]);
}

#[tokio::test]
async fn five_workers_run_simultaneously() {
    let (orchestrator, fetcher) = orchestrator(
        MockFetcher::new()
            .with_delay(Duration::from_millis(50))
            .on_success("a", "1")
            .on_success("b", "2")
            .on_success("c", "3")
            .on_success("d", "4")
            .on_success("e", "5"),
        MockParser::new(),
    );

    orchestrator
        .run(
            &[source("a"), source("b"), source("c"), source("d"), source("e")],
            &options(),
        )
        .await
        .unwrap();

    assert_eq!(fetcher.max_in_flight(), 5);
}

#[tokio::test]
async fn concurrency_bound_caps_in_flight_fetches() {
    let (orchestrator, fetcher) = orchestrator(
        MockFetcher::new()
            .with_delay(Duration::from_millis(20))
            .on_success("a", "1")
            .on_success("b", "2")
            .on_success("c", "3")
            .on_success("d", "4"),
        MockParser::new(),
    );

    orchestrator
        .run(
            &[source("a"), source("b"), source("c"), source("d")],
            &RunOptions {
                max_concurrency: 2,
                ..options()
            },
        )
        .await
        .unwrap();

    assert!(fetcher.max_in_flight() <= 2);
}

/// Fetcher that cancels the run after a fixed number of fetch calls.
struct CancellingFetcher {
    inner: MockFetcher,
    cancel: CancelToken,
    after: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl Fetcher for CancellingFetcher {
    async fn fetch(&self, source: &SourceId) -> Result<Bytes, FetchError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) + 1 >= self.after {
            self.cancel.cancel();
        }
        self.inner.fetch(source).await
    }
}

#[tokio::test]
async fn cancellation_skips_unstarted_sources_and_keeps_partial_results() {
    // Cancel fires during the second of five sources; with one worker the
    // remaining three are never attempted.
    let cancel = CancelToken::new();
    let fetcher = Arc::new(CancellingFetcher {
        inner: MockFetcher::new()
            .on_success("s1", "m1")
            .on_success("s2", "m2")
            .on_success("s3", "m3")
            .on_success("s4", "m4")
            .on_success("s5", "m5"),
        cancel: cancel.clone(),
        after: 2,
        calls: AtomicUsize::new(0),
    });
    let orchestrator =
        Orchestrator::new(fetcher, Arc::new(MockParser::new())).with_cancel_token(cancel);

    let outcome = orchestrator
        .run(
            &[source("s1"), source("s2"), source("s3"), source("s4"), source("s5")],
            &RunOptions {
                max_concurrency: 1,
                ..options()
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.messages.len(), 2);
    assert_eq!(outcome.stats.sources_attempted, 2);
    assert_eq!(outcome.stats.sources_skipped, 3);
    assert!(outcome.stats.sources_attempted <= 5);
    assert_eq!(
        outcome.stats.sources_attempted,
        outcome.stats.sources_succeeded + outcome.stats.sources_failed
    );
}

#[tokio::test]
async fn cancelled_before_start_attempts_nothing() {
    let cancel = CancelToken::new();
    cancel.cancel();
    let (orchestrator, fetcher) = orchestrator(
        MockFetcher::new().on_success("a", "m"),
        MockParser::new(),
    );
    let orchestrator = orchestrator.with_cancel_token(cancel);

    let outcome = orchestrator.run(&[source("a")], &options()).await.unwrap();

    assert!(outcome.messages.is_empty());
    assert_eq!(outcome.stats.sources_attempted, 0);
    assert_eq!(outcome.stats.sources_skipped, 1);
    assert_eq!(fetcher.calls("a"), 0);
}

#[tokio::test]
async fn duplicate_source_ids_are_scheduled_once() {
    let (orchestrator, fetcher) = orchestrator(
        MockFetcher::new().on_success("a", "m"),
        MockParser::new(),
    );

    let outcome = orchestrator
        .run(&[source("a"), source("a"), source("a")], &options())
        .await
        .unwrap();

    assert_eq!(fetcher.calls("a"), 1);
    assert_eq!(outcome.stats.sources_attempted, 1);
    assert_eq!(outcome.messages.len(), 1);
}

#[tokio::test]
async fn message_cap_skips_sources_once_reached() {
    // One worker: source a fills the cap, b is skipped before any fetch.
    // In-flight work is kept, so the total may exceed the cap.
    let (orchestrator, fetcher) = orchestrator(
        MockFetcher::new()
            .on_success("a", "m1\nm2")
            .on_success("b", "m3"),
        MockParser::new(),
    );

    let outcome = orchestrator
        .run(
            &[source("a"), source("b")],
            &RunOptions {
                max_concurrency: 1,
                max_messages: Some(1),
                ..options()
            },
        )
        .await
        .unwrap();

    assert_eq!(fetcher.calls("b"), 0);
    assert_eq!(outcome.messages.len(), 2);
    assert_eq!(outcome.stats.sources_skipped, 1);
}

#[tokio::test]
async fn fetch_timeout_counts_as_transient() {
    let (orchestrator, fetcher) = orchestrator(
        MockFetcher::new()
            .with_delay(Duration::from_millis(100))
            .on_success("slow", "never arrives"),
        MockParser::new(),
    );

    let outcome = orchestrator
        .run(
            &[source("slow")],
            &RunOptions {
                fetch_timeout: Duration::from_millis(5),
                ..options()
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(
        outcome,
        OrchestratorError::AllSourcesFailed { failed: 1 }
    ));
    // Transient classification retried up to the attempt budget.
    assert_eq!(fetcher.calls("slow"), 2);
}

#[tokio::test]
async fn run_and_search_share_one_stats_collector() {
    let stats = Arc::new(StatsCollector::new());
    let fetcher = Arc::new(MockFetcher::new().on_success("feed", "rust ships\nnothing here"));
    let orchestrator = Orchestrator::new(fetcher, Arc::new(MockParser::new()))
        .with_stats(stats.clone());

    let outcome = orchestrator.run(&[source("feed")], &options()).await.unwrap();
    let engine = SearchEngine::new().with_stats(stats.clone());
    let results = engine
        .search(&outcome.messages, &["rust".to_string()], None)
        .unwrap();

    assert_eq!(results.len(), 2);
    let snapshot = stats.get_statistics();
    assert_eq!(snapshot.sources_succeeded, 1);
    assert_eq!(snapshot.messages_collected, 2);
    assert_eq!(snapshot.matches_found, 1);
}
