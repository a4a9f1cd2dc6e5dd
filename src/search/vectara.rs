//! Vectara v1 query API client

use super::types::{
    FragmentStream, SearchReply, SearchRequest, SearchResponse, SearchResult, Snippet,
    StreamEvent, Summary, SNIPPET_END, SNIPPET_START,
};
use super::{SearchClient, SearchError};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

const QUERY_PATH: &str = "/v1/query";
const STREAM_PATH: &str = "/v1/stream-query";
/// Context sentences around each match on the retrieval call
const RETRIEVAL_CONTEXT_SENTENCES: u32 = 2;
/// Results returned when reranking is off
const DEFAULT_NUM_RESULTS: u32 = 10;

/// HTTP client for the Vectara query endpoints
#[derive(Clone)]
pub struct VectaraClient {
    client: Client,
    timeout: Duration,
}

impl VectaraClient {
    /// # Errors
    ///
    /// Fails when the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, SearchError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SearchError::transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            timeout: Duration::from_secs(60),
        })
    }

    /// Overall deadline for batch calls. Streams are bounded only by the
    /// connect timeout since long answers legitimately take a while.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn post(
        &self,
        request: &SearchRequest,
        path: &str,
    ) -> Result<reqwest::Response, SearchError> {
        let url = format!("{}{path}", base_url(&request.endpoint));
        let mut builder = self
            .client
            .post(&url)
            .header("customer-id", &request.customer_id)
            .header("x-api-key", &request.api_key)
            .header("content-type", "application/json")
            .json(&translate_request(request));
        if !request.wants_stream() {
            builder = builder.timeout(self.timeout);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                SearchError::transport(format!("Request timeout: {e}"))
            } else if e.is_connect() {
                SearchError::transport(format!("Connection failed: {e}"))
            } else {
                SearchError::transport(format!("Request failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status, &body));
        }
        Ok(response)
    }

    async fn query(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        let response = self.post(request, QUERY_PATH).await?;
        let body = response
            .text()
            .await
            .map_err(|e| SearchError::transport(format!("Failed to read response: {e}")))?;
        parse_batch_response(&body, request.summary.is_some())
    }

    async fn stream_query(&self, request: &SearchRequest) -> Result<FragmentStream, SearchError> {
        let response = self.post(request, STREAM_PATH).await?;
        Ok(decode_stream(response.bytes_stream()))
    }
}

#[async_trait]
impl SearchClient for VectaraClient {
    async fn send(&self, request: &SearchRequest) -> Result<SearchReply, SearchError> {
        if request.wants_stream() {
            self.stream_query(request).await.map(SearchReply::Stream)
        } else {
            self.query(request).await.map(SearchReply::Complete)
        }
    }
}

fn base_url(endpoint: &str) -> String {
    let endpoint = endpoint.trim_end_matches('/');
    if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("https://{endpoint}")
    }
}

fn classify_error(status: reqwest::StatusCode, body: &str) -> SearchError {
    let message = match status.as_u16() {
        401 | 403 => format!("Authentication failed: {body}"),
        429 => format!("Rate limited: {body}"),
        400 => format!("Invalid request: {body}"),
        500..=599 => format!("Server error: {body}"),
        _ => format!("HTTP {status}: {body}"),
    };
    SearchError::transport(message).with_status(status.as_u16())
}

// ============================================================================
// Request translation
// ============================================================================

fn translate_request(request: &SearchRequest) -> WireRequest {
    let lambda = request.hybrid.lambda_for(&request.query);
    let corpus_key = request
        .corpus_ids
        .iter()
        .map(|corpus_id| WireCorpusKeyRequest {
            customer_id: request.customer_id.clone(),
            corpus_id: corpus_id.clone(),
            lexical_interpolation_config: WireLexical { lambda },
            metadata_filter: request.filter.clone(),
        })
        .collect();

    let sentences = request
        .summary
        .as_ref()
        .map_or(RETRIEVAL_CONTEXT_SENTENCES, |s| s.num_sentences);

    let summary = request
        .summary
        .as_ref()
        .map(|s| {
            vec![WireSummaryRequest {
                summarizer_prompt_name: s.prompt_name.clone(),
                max_summarized_results: s.num_results,
                response_lang: s.language.code().to_string(),
                chat: WireChatRequest {
                    store: true,
                    conversation_id: s.conversation_id.clone(),
                },
                factual_consistency_score: s.factual_consistency_score,
            }]
        })
        .unwrap_or_default();

    WireRequest {
        query: vec![WireQuery {
            query: request.query.clone(),
            start: 0,
            num_results: if request.rerank.enabled {
                request.rerank.num_results
            } else {
                DEFAULT_NUM_RESULTS
            },
            corpus_key,
            context_config: WireContextConfig {
                sentences_before: sentences,
                sentences_after: sentences,
                start_tag: SNIPPET_START.to_string(),
                end_tag: SNIPPET_END.to_string(),
            },
            reranking_config: request.rerank.enabled.then(|| WireReranking {
                reranker_id: request.rerank.reranker_id,
                mmr_config: WireMmr {
                    diversity_bias: request.rerank.diversity_bias,
                },
            }),
            summary,
        }],
    }
}

// ============================================================================
// Response parsing
// ============================================================================

fn parse_batch_response(body: &str, expect_summary: bool) -> Result<SearchResponse, SearchError> {
    let wire: WireBatchResponse = serde_json::from_str(body)
        .map_err(|e| SearchError::malformed(format!("Failed to parse response: {e}")))?;

    let Some(set) = wire.response_set.into_iter().next() else {
        if expect_summary {
            return Err(SearchError::malformed("Response has no response set"));
        }
        return Ok(SearchResponse::default());
    };

    let results = normalize_results(&set);
    let summary = set.summary.into_iter().next().map(normalize_summary);

    if expect_summary {
        let Some(summary) = &summary else {
            return Err(SearchError::malformed("Response is missing its summary"));
        };
        if summary.turn_id.is_none() {
            return Err(SearchError::malformed("Summary is missing its turn id"));
        }
    }

    Ok(SearchResponse { results, summary })
}

/// Split a newline-delimited body into stream events. Lines are cut on raw
/// bytes and decoded whole, so a character spanning two chunks survives.
fn decode_stream<S, B, E>(mut chunks: S) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut buffer: Vec<u8> = Vec::new();
        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(SearchError::interrupted(format!("Stream read failed: {e}")));
                    return;
                }
            };
            buffer.extend_from_slice(chunk.as_ref());

            while let Some(line_end) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=line_end).collect();
                match decode_line(&line) {
                    Ok(events) => {
                        for event in events {
                            yield Ok(event);
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        }

        // Whatever is left had no newline; if it doesn't parse the server
        // closed mid-line
        match decode_line(&buffer) {
            Ok(events) => {
                for event in events {
                    yield Ok(event);
                }
            }
            Err(e) => {
                let message = format!("Stream closed mid-line: {}", e.message);
                yield Err(SearchError::interrupted(message));
            }
        }
    };
    stream.boxed()
}

/// Decode one complete line. Blank lines carry no events.
fn decode_line(line: &[u8]) -> Result<Vec<StreamEvent>, SearchError> {
    let line = std::str::from_utf8(line)
        .map_err(|e| SearchError::malformed(format!("Stream line is not UTF-8: {e}")))?
        .trim();
    if line.is_empty() {
        return Ok(Vec::new());
    }
    parse_stream_line(line)
}

/// Parse one line of the stream-query body into events
fn parse_stream_line(line: &str) -> Result<Vec<StreamEvent>, SearchError> {
    let wire: WireStreamLine = serde_json::from_str(line)
        .map_err(|e| SearchError::malformed(format!("Failed to parse stream line: {e}")))?;
    let mut events = Vec::new();
    let Some(result) = wire.result else {
        return Ok(events);
    };

    if let Some(set) = &result.response_set {
        events.push(StreamEvent::Results(normalize_results(set)));
    }

    if let Some(summary) = result.summary {
        let done = summary.done;
        let summary = normalize_summary(summary);
        if !summary.text.is_empty() {
            events.push(StreamEvent::Fragment(summary.text));
        }
        if summary.conversation_id.is_some() || summary.turn_id.is_some() {
            events.push(StreamEvent::Chat {
                conversation_id: summary.conversation_id,
                turn_id: summary.turn_id,
            });
        }
        if let Some(score) = summary.factual_consistency {
            events.push(StreamEvent::FactualConsistency(score));
        }
        if done {
            events.push(StreamEvent::End);
        }
    }

    Ok(events)
}

fn normalize_results(set: &WireResponseSet) -> Vec<SearchResult> {
    set.response
        .iter()
        .map(|part| {
            let document = set.document.get(part.document_index);
            let mut metadata: BTreeMap<String, String> = document
                .map(|d| d.metadata.iter().map(WireMetadata::pair).collect())
                .unwrap_or_default();
            metadata.extend(part.metadata.iter().map(WireMetadata::pair));

            SearchResult {
                id: document.map(|d| d.id.clone()).unwrap_or_default(),
                title: metadata.get("title").cloned(),
                url: metadata.get("url").cloned(),
                date: metadata.get("date").cloned(),
                snippet: Snippet::parse(&part.text),
                source: part
                    .corpus_key
                    .as_ref()
                    .map(|k| value_to_string(&k.corpus_id))
                    .unwrap_or_default(),
                score: part.score,
                metadata,
            }
        })
        .collect()
}

fn normalize_summary(summary: WireSummary) -> Summary {
    let (conversation_id, turn_id) = summary
        .chat
        .map(|chat| (non_empty(chat.conversation_id), non_empty(chat.turn_id)))
        .unwrap_or_default();
    Summary {
        text: summary.text,
        turn_id,
        conversation_id,
        factual_consistency: summary.factual_consistency.map(|f| f.score),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest {
    query: Vec<WireQuery>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireQuery {
    query: String,
    start: u32,
    num_results: u32,
    corpus_key: Vec<WireCorpusKeyRequest>,
    context_config: WireContextConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    reranking_config: Option<WireReranking>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    summary: Vec<WireSummaryRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireCorpusKeyRequest {
    customer_id: String,
    corpus_id: String,
    lexical_interpolation_config: WireLexical,
    metadata_filter: String,
}

#[derive(Debug, Serialize)]
struct WireLexical {
    lambda: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireContextConfig {
    sentences_before: u32,
    sentences_after: u32,
    start_tag: String,
    end_tag: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireReranking {
    reranker_id: u64,
    mmr_config: WireMmr,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireMmr {
    diversity_bias: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireSummaryRequest {
    summarizer_prompt_name: String,
    max_summarized_results: u32,
    response_lang: String,
    chat: WireChatRequest,
    factual_consistency_score: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireChatRequest {
    store: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    conversation_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireBatchResponse {
    #[serde(default)]
    response_set: Vec<WireResponseSet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStreamLine {
    result: Option<WireStreamResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStreamResult {
    response_set: Option<WireResponseSet>,
    summary: Option<WireSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponseSet {
    #[serde(default)]
    response: Vec<WireResponse>,
    #[serde(default)]
    document: Vec<WireDocument>,
    #[serde(default)]
    summary: Vec<WireSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Vec<WireMetadata>,
    #[serde(default)]
    document_index: usize,
    corpus_key: Option<WireCorpusKey>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCorpusKey {
    #[serde(default)]
    corpus_id: Value,
}

#[derive(Debug, Deserialize)]
struct WireDocument {
    #[serde(default)]
    id: String,
    #[serde(default)]
    metadata: Vec<WireMetadata>,
}

#[derive(Debug, Deserialize)]
struct WireMetadata {
    name: String,
    #[serde(default)]
    value: String,
}

impl WireMetadata {
    fn pair(&self) -> (String, String) {
        (self.name.clone(), self.value.clone())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSummary {
    #[serde(default)]
    text: String,
    chat: Option<WireChat>,
    factual_consistency: Option<WireFactualConsistency>,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireChat {
    conversation_id: Option<String>,
    turn_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireFactualConsistency {
    score: f32,
}
