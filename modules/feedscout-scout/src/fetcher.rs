// Concrete HTTP transport behind the `Fetcher` boundary.
//
// Plain GET with a shared connection pool. Retry scheduling lives in the
// orchestrator; this layer only classifies each failure as transient or
// permanent so the orchestrator knows whether another attempt can help.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use tracing::debug;
use url::Url;

use feedscout_common::config::Config;
use feedscout_common::error::FetchError;
use feedscout_common::types::SourceId;

use crate::traits::Fetcher;

pub struct HttpFetcher {
    client: reqwest::Client,
    /// Base URL for bare source names. A source that is already an absolute
    /// http(s) URL is fetched as-is.
    base_url: Option<Url>,
}

impl HttpFetcher {
    /// The per-attempt timeout is enforced by the orchestrator, so the
    /// client itself carries none; a client-side timeout here would race
    /// the orchestrator's and misclassify its expiry.
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Permanent(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: None,
        })
    }

    /// Resolve bare source names (no scheme) against this base.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, FetchError> {
        let parsed = Url::parse(base_url)
            .map_err(|e| FetchError::Permanent(format!("invalid base URL {base_url}: {e}")))?;
        check_scheme(&parsed)?;
        self.base_url = Some(parsed);
        Ok(self)
    }

    /// A source is either an absolute http(s) URL or a bare name joined onto
    /// the base URL. Anything else is a permanent failure: retrying cannot
    /// make a malformed source valid.
    fn resolve_url(&self, source: &SourceId) -> Result<Url, FetchError> {
        let raw = source.as_str();
        if let Ok(url) = Url::parse(raw) {
            check_scheme(&url)?;
            return Ok(url);
        }
        match &self.base_url {
            Some(base) => base
                .join(raw)
                .map_err(|e| FetchError::Permanent(format!("invalid source {raw}: {e}"))),
            None => Err(FetchError::Permanent(format!(
                "source {raw} is not an absolute URL and no base URL is configured"
            ))),
        }
    }
}

fn check_scheme(url: &Url) -> Result<(), FetchError> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(FetchError::Permanent(format!(
            "unsupported URL scheme: {other}"
        ))),
    }
}

/// 401/403/404 mean the source itself is wrong or gone; 429 and 5xx are
/// server-side conditions another attempt may clear.
fn classify_status(status: StatusCode) -> FetchError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
            FetchError::Permanent(format!("HTTP {status}"))
        }
        StatusCode::TOO_MANY_REQUESTS => FetchError::Transient(format!("HTTP {status}")),
        s if s.is_server_error() => FetchError::Transient(format!("HTTP {status}")),
        _ => FetchError::Permanent(format!("HTTP {status}")),
    }
}

fn classify_transport(error: reqwest::Error) -> FetchError {
    if error.is_timeout() || error.is_connect() {
        FetchError::Transient(format!("transport error: {error}"))
    } else if error.is_builder() || error.is_request() {
        FetchError::Permanent(format!("request error: {error}"))
    } else {
        FetchError::Transient(format!("transport error: {error}"))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, source: &SourceId) -> Result<Bytes, FetchError> {
        let url = self.resolve_url(source)?;
        debug!(source = %source, url = %url, "Fetching source");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        response
            .bytes()
            .await
            .map_err(|e| FetchError::Transient(format!("failed to read body: {e}")))
    }
}
