use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum sources in flight at once.
    pub max_concurrency: usize,
    /// Total fetch attempts per source (minimum 1).
    pub max_retries: u32,
    /// Base retry delay; the actual delay is base * attempt number.
    pub retry_backoff: Duration,
    /// Per-source fetch timeout. Expiry counts as a transient failure.
    pub fetch_timeout: Duration,
    /// Optional global cap on collected messages.
    pub max_messages: Option<usize>,
    /// User agent sent by the HTTP fetcher.
    pub user_agent: String,
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults. Panics with a clear message on unparseable values.
    pub fn from_env() -> Self {
        Self {
            max_concurrency: parsed_env("FEEDSCOUT_MAX_CONCURRENCY", 5),
            max_retries: parsed_env("FEEDSCOUT_MAX_RETRIES", 2),
            retry_backoff: Duration::from_millis(parsed_env(
                "FEEDSCOUT_RETRY_BACKOFF_MS",
                500,
            )),
            fetch_timeout: Duration::from_secs(parsed_env(
                "FEEDSCOUT_FETCH_TIMEOUT_SECS",
                10,
            )),
            max_messages: optional_env("FEEDSCOUT_MAX_MESSAGES"),
            user_agent: env::var("FEEDSCOUT_USER_AGENT")
                .unwrap_or_else(|_| format!("feedscout/{}", env!("CARGO_PKG_VERSION"))),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
            fetch_timeout: Duration::from_secs(10),
            max_messages: None,
            user_agent: format!("feedscout/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a number, got: {value}")),
        Err(_) => default,
    }
}

fn optional_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().map(|value| {
        value
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a number, got: {value}"))
    })
}
