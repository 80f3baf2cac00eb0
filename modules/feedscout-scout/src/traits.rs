// Trait abstractions for the fetch/parse boundary.
//
// Fetcher hides the transport (HTTP, identity rotation, cookies); the
// orchestrator only sees content-or-classified-failure. MessageParser hides
// content extraction heuristics. Both enable deterministic testing with
// MockFetcher and MockParser: no network, `cargo test` in seconds.

use async_trait::async_trait;
use bytes::Bytes;

use feedscout_common::error::{FetchError, ParseError};
use feedscout_common::types::{Message, SourceId};

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the raw content of one source.
    ///
    /// Failures are classified: `Transient` consumes a retry attempt,
    /// `Permanent` marks the source failed immediately.
    async fn fetch(&self, source: &SourceId) -> Result<Bytes, FetchError>;
}

#[async_trait]
pub trait MessageParser: Send + Sync {
    /// Turn raw content into zero or more normalized messages.
    ///
    /// An empty result is valid (an empty feed is not an error); a message
    /// with empty text is not.
    async fn parse(&self, content: &[u8], source: &SourceId)
        -> Result<Vec<Message>, ParseError>;
}
