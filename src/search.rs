//! Search-and-summarize API abstraction
//!
//! The controller only sees [`SearchClient`]; [`VectaraClient`] is the HTTP
//! implementation.

mod error;
mod language;
mod types;
mod vectara;

pub use error::{SearchError, SearchErrorKind};
pub use language::{SummaryLanguage, UnknownLanguage};
pub use types::{
    FragmentStream, HybridConfig, RerankConfig, SearchReply, SearchRequest, SearchResponse,
    SearchResult, Snippet, StreamEvent, Summary, SummaryRequest, SNIPPET_END, SNIPPET_START,
};
pub use vectara::VectaraClient;

use async_trait::async_trait;
use std::sync::Arc;

/// Performs one call against the search API
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Send a request. Summarize requests with `stream` set come back as
    /// [`SearchReply::Stream`], everything else as [`SearchReply::Complete`].
    ///
    /// # Errors
    ///
    /// Transport failures, malformed payloads, and streams that fail to open.
    async fn send(&self, request: &SearchRequest) -> Result<SearchReply, SearchError>;
}

#[async_trait]
impl<T: SearchClient + ?Sized> SearchClient for Arc<T> {
    async fn send(&self, request: &SearchRequest) -> Result<SearchReply, SearchError> {
        (**self).send(request).await
    }
}

/// Logging wrapper for search clients
pub struct LoggingClient<C> {
    inner: C,
}

impl<C: SearchClient> LoggingClient<C> {
    #[must_use]
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<C: SearchClient> SearchClient for LoggingClient<C> {
    async fn send(&self, request: &SearchRequest) -> Result<SearchReply, SearchError> {
        let start = std::time::Instant::now();
        let phase = if request.summary.is_some() {
            "summarize"
        } else {
            "retrieval"
        };
        let result = self.inner.send(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(SearchReply::Complete(response)) => {
                tracing::info!(
                    phase,
                    duration_ms = %duration.as_millis(),
                    results = response.results.len(),
                    has_summary = response.summary.is_some(),
                    "Search request completed"
                );
            }
            Ok(SearchReply::Stream(_)) => {
                tracing::info!(
                    phase,
                    duration_ms = %duration.as_millis(),
                    "Search stream opened"
                );
            }
            Err(e) => {
                tracing::error!(
                    phase,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    kind = e.kind.as_str(),
                    status = ?e.status,
                    "Search request failed"
                );
            }
        }

        result
    }
}
