//! Provider-agnostic search and summary types

use super::{SearchError, SummaryLanguage};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Markers asked for in the context configuration; the server wraps the
/// matching sentence with them.
pub const SNIPPET_START: &str = "%START_SNIPPET%";
pub const SNIPPET_END: &str = "%END_SNIPPET%";

// ============================================================================
// Request
// ============================================================================

/// Everything needed for one search call
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub customer_id: String,
    pub corpus_ids: Vec<String>,
    pub query: String,
    pub filter: String,
    pub rerank: RerankConfig,
    pub hybrid: HybridConfig,
    /// Host name (`api.vectara.io`) or full base URL
    pub endpoint: String,
    pub api_key: String,
    /// Present only for the summarize phase
    pub summary: Option<SummaryRequest>,
}

impl SearchRequest {
    /// Whether the caller wants a fragment stream back
    #[must_use]
    pub fn wants_stream(&self) -> bool {
        self.summary.as_ref().is_some_and(|s| s.stream)
    }
}

/// Reranking applied to the candidate pool
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankConfig {
    pub enabled: bool,
    /// Size of the candidate pool handed to the reranker
    pub num_results: u32,
    pub reranker_id: u64,
    pub diversity_bias: f32,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            num_results: 50,
            reranker_id: 272_725_718,
            diversity_bias: 0.3,
        }
    }
}

/// Weighting between neural and lexical matching
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridConfig {
    /// Queries with more words than this use `lambda_long`
    pub num_words: usize,
    pub lambda_long: f32,
    pub lambda_short: f32,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            num_words: 2,
            lambda_long: 0.0,
            lambda_short: 0.1,
        }
    }
}

impl HybridConfig {
    /// Short queries lean on exact term matches, longer ones on semantics
    #[must_use]
    pub fn lambda_for(&self, query: &str) -> f32 {
        if query.split_whitespace().count() > self.num_words {
            self.lambda_long
        } else {
            self.lambda_short
        }
    }
}

/// Summarize-phase parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRequest {
    pub language: SummaryLanguage,
    pub prompt_name: String,
    pub num_results: u32,
    pub num_sentences: u32,
    /// Links this turn to earlier ones server-side; absent on the first turn
    pub conversation_id: Option<String>,
    pub factual_consistency_score: bool,
    pub stream: bool,
}

// ============================================================================
// Response
// ============================================================================

/// Text around and including the matched sentence
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    pub pre: String,
    pub text: String,
    pub post: String,
}

impl Snippet {
    /// Split server text on the snippet markers. Text without markers is
    /// taken as the match itself.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let Some((pre, rest)) = raw.split_once(SNIPPET_START) else {
            return Self {
                text: raw.trim().to_string(),
                ..Self::default()
            };
        };
        let (text, post) = rest.split_once(SNIPPET_END).unwrap_or((rest, ""));
        Self {
            pre: pre.trim().to_string(),
            text: text.trim().to_string(),
            post: post.trim().to_string(),
        }
    }
}

/// One retrieved passage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub date: Option<String>,
    pub snippet: Snippet,
    /// Corpus the passage came from
    pub source: String,
    pub score: f32,
    pub metadata: BTreeMap<String, String>,
}

impl SearchResult {
    /// Link that scrolls the source page to the matched text
    #[must_use]
    pub fn highlight_url(&self) -> Option<String> {
        self.url
            .as_ref()
            .map(|url| format!("{url}#:~:text={}", self.snippet.text))
    }

    /// Title if known, else URL
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.title.as_deref().or(self.url.as_deref())
    }
}

/// Summary portion of a batch response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    pub text: String,
    pub turn_id: Option<String>,
    pub conversation_id: Option<String>,
    pub factual_consistency: Option<f32>,
}

/// A complete (non-streamed) response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub summary: Option<Summary>,
}

/// One event of a streamed summary, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Result set the summary cites
    Results(Vec<SearchResult>),
    /// Next piece of answer text
    Fragment(String),
    Chat {
        conversation_id: Option<String>,
        turn_id: Option<String>,
    },
    FactualConsistency(f32),
    /// Terminal event
    End,
}

pub type FragmentStream = BoxStream<'static, Result<StreamEvent, SearchError>>;

/// What a client hands back for one call
pub enum SearchReply {
    Complete(SearchResponse),
    Stream(FragmentStream),
}

impl SearchReply {
    /// Unwrap a batch response; a stream where none was asked for is a
    /// protocol error.
    ///
    /// # Errors
    ///
    /// Returns a malformed-response error for [`SearchReply::Stream`].
    pub fn into_complete(self) -> Result<SearchResponse, SearchError> {
        match self {
            SearchReply::Complete(response) => Ok(response),
            SearchReply::Stream(_) => Err(SearchError::malformed(
                "Expected a complete response, got a stream",
            )),
        }
    }
}

impl std::fmt::Debug for SearchReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchReply::Complete(response) => f.debug_tuple("Complete").field(response).finish(),
            SearchReply::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}
