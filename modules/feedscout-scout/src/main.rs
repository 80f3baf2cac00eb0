use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser as ClapParser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use feedscout_common::types::{FilterSpec, SourceId};
use feedscout_common::Config;
use feedscout_scout::fetcher::HttpFetcher;
use feedscout_scout::orchestrator::{Orchestrator, RunOptions};
use feedscout_scout::parser::FeedPageParser;
use feedscout_scout::search::SearchEngine;
use feedscout_scout::stats::StatsCollector;

/// Fetch feed sources concurrently and search the collected messages.
#[derive(ClapParser, Debug)]
#[command(name = "feedscout", version, about)]
struct Cli {
    /// Source URLs or names (resolved against --base-url).
    sources: Vec<String>,

    /// File with one source per line; lines starting with '#' are skipped.
    #[arg(long)]
    sources_file: Option<PathBuf>,

    /// Keywords to search the collected messages for.
    #[arg(short, long)]
    keyword: Vec<String>,

    /// Required hashtag (repeatable; any listed tag matches).
    #[arg(long)]
    hashtag: Vec<String>,

    /// Required mention (repeatable; any listed mention matches).
    #[arg(long)]
    mention: Vec<String>,

    /// Exact author name.
    #[arg(long)]
    author: Option<String>,

    /// Minimum view count.
    #[arg(long)]
    min_views: Option<u64>,

    /// Earliest date, inclusive (YYYY-MM-DD).
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Latest date, inclusive (YYYY-MM-DD).
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Keep only messages with (true) or without (false) a URL.
    #[arg(long)]
    has_url: Option<bool>,

    /// Maximum results to print.
    #[arg(long)]
    limit: Option<usize>,

    /// Match keywords case-sensitively.
    #[arg(long)]
    case_sensitive: bool,

    /// Base URL for bare source names.
    #[arg(long)]
    base_url: Option<String>,

    /// Override FEEDSCOUT_MAX_CONCURRENCY.
    #[arg(long)]
    max_concurrency: Option<usize>,

    /// Override FEEDSCOUT_MAX_RETRIES (total attempts per source).
    #[arg(long)]
    max_retries: Option<u32>,

    /// Emit results and statistics as JSON.
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn collect_sources(&self) -> Result<Vec<SourceId>> {
        let mut sources: Vec<SourceId> = self.sources.iter().map(SourceId::new).collect();
        if let Some(path) = &self.sources_file {
            let listed = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read sources file {}", path.display()))?;
            sources.extend(
                listed
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty() && !line.starts_with('#'))
                    .map(SourceId::new),
            );
        }
        Ok(sources)
    }

    fn filter_spec(&self) -> FilterSpec {
        FilterSpec {
            keywords: (!self.keyword.is_empty()).then(|| self.keyword.clone()),
            hashtags: (!self.hashtag.is_empty()).then(|| self.hashtag.clone()),
            mentions: (!self.mention.is_empty()).then(|| self.mention.clone()),
            author: self.author.clone(),
            min_views: self.min_views,
            date_from: self
                .from
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc)),
            date_to: self
                .to
                .and_then(|d| d.and_hms_opt(23, 59, 59))
                .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc)),
            has_url: self.has_url,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("feedscout=info".parse()?))
        .init();

    let cli = Cli::parse();
    let sources = cli.collect_sources()?;
    anyhow::ensure!(
        !sources.is_empty(),
        "no sources given; pass them as arguments or via --sources-file"
    );

    let config = Config::from_env();
    let mut options = RunOptions::from_config(&config);
    if let Some(max_concurrency) = cli.max_concurrency {
        options.max_concurrency = max_concurrency;
    }
    if let Some(max_retries) = cli.max_retries {
        options.max_retries = max_retries;
    }

    info!(sources = sources.len(), "Feedscout starting");

    let mut fetcher = HttpFetcher::new(&config)?;
    if let Some(base_url) = &cli.base_url {
        fetcher = fetcher.with_base_url(base_url)?;
    }

    let stats = Arc::new(StatsCollector::new());
    let orchestrator = Orchestrator::new(Arc::new(fetcher), Arc::new(FeedPageParser::new()))
        .with_stats(stats.clone());

    let outcome = orchestrator.run(&sources, &options).await?;

    let engine = SearchEngine::new()
        .case_sensitive(cli.case_sensitive)
        .with_stats(stats.clone());
    let mut results = engine.advanced_search(&outcome.messages, &cli.filter_spec());
    if let Some(limit) = cli.limit {
        results.truncate(limit);
    }
    let summary = engine.summarize(&results);
    let run_stats = stats.get_statistics();

    if cli.json {
        let report = serde_json::json!({
            "statistics": run_stats,
            "summary": summary,
            "results": results,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{run_stats}");
    println!(
        "{} results (avg relevance {:.1}, avg views {:.0})\n",
        summary.total_results, summary.avg_relevance, summary.avg_views
    );
    for (rank, result) in results.iter().enumerate() {
        println!(
            "{:>3}. [{:>5.1}] {} · {} · {} views",
            rank + 1,
            result.relevance_score,
            result.message.source_id,
            result.message.author,
            result.message.views
        );
        println!("     {}", result.text_snippet);
        if !result.matched_keywords.is_empty() {
            println!("     matched: {}", result.matched_keywords.join(", "));
        }
    }

    Ok(())
}
