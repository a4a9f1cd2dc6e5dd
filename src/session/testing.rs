//! Mock search client and fixtures for session tests

use super::state::ConversationSnapshot;
use crate::config::SessionConfig;
use crate::search::{
    SearchClient, SearchError, SearchReply, SearchRequest, SearchResponse, SearchResult, Snippet,
    StreamEvent, Summary,
};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;

// ============================================================================
// Mock Search Client
// ============================================================================

pub type EventSender = mpsc::UnboundedSender<Result<StreamEvent, SearchError>>;

/// One scripted answer
pub enum MockReply {
    Complete(SearchResponse),
    /// Stream that yields these events then closes
    Stream(Vec<Result<StreamEvent, SearchError>>),
    /// Stream fed by the test through an [`EventSender`]
    Channel(mpsc::UnboundedReceiver<Result<StreamEvent, SearchError>>),
    Error(SearchError),
    /// Holds the reply until the test releases it
    Gated {
        release: oneshot::Receiver<()>,
        reply: Box<MockReply>,
    },
}

impl MockReply {
    pub fn channel() -> (EventSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, MockReply::Channel(rx))
    }

    pub fn gated(reply: MockReply) -> (oneshot::Sender<()>, Self) {
        let (tx, rx) = oneshot::channel();
        (
            tx,
            MockReply::Gated {
                release: rx,
                reply: Box::new(reply),
            },
        )
    }
}

/// Search client that returns queued replies and records every request
#[derive(Default)]
pub struct MockSearchClient {
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<SearchRequest>>,
}

impl MockSearchClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&self, reply: MockReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn queue_response(&self, response: SearchResponse) {
        self.queue(MockReply::Complete(response));
    }

    pub fn queue_stream(&self, events: Vec<Result<StreamEvent, SearchError>>) {
        self.queue(MockReply::Stream(events));
    }

    pub fn queue_error(&self, error: SearchError) {
        self.queue(MockReply::Error(error));
    }

    pub fn recorded_requests(&self) -> Vec<SearchRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_reply(&self) -> Option<MockReply> {
        self.replies.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl SearchClient for MockSearchClient {
    async fn send(&self, request: &SearchRequest) -> Result<SearchReply, SearchError> {
        self.requests.lock().unwrap().push(request.clone());
        let Some(mut reply) = self.next_reply() else {
            return Err(SearchError::transport("No mock reply queued"));
        };
        loop {
            return match reply {
                MockReply::Complete(response) => Ok(SearchReply::Complete(response)),
                MockReply::Stream(events) => {
                    Ok(SearchReply::Stream(futures::stream::iter(events).boxed()))
                }
                MockReply::Channel(rx) => Ok(SearchReply::Stream(
                    UnboundedReceiverStream::new(rx).boxed(),
                )),
                MockReply::Error(e) => Err(e),
                MockReply::Gated { release, reply: inner } => {
                    let _ = release.await;
                    reply = *inner;
                    continue;
                }
            };
        }
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn test_config() -> SessionConfig {
    SessionConfig::new("1366999410", vec!["1".into()], "zqt_test_key")
}

pub fn result(id: &str) -> SearchResult {
    SearchResult {
        id: id.into(),
        title: Some(format!("Doc {id}")),
        url: Some(format!("https://docs.example.com/{id}")),
        date: None,
        snippet: Snippet {
            text: format!("Passage from {id}."),
            ..Snippet::default()
        },
        source: "1".into(),
        score: 0.5,
        metadata: BTreeMap::new(),
    }
}

/// Retrieval-phase response with the given result ids
pub fn retrieval(ids: &[&str]) -> SearchResponse {
    SearchResponse {
        results: ids.iter().map(|id| result(id)).collect(),
        summary: None,
    }
}

/// Batch summarize response
pub fn summary_response(text: &str, turn_id: &str, conversation_id: &str) -> SearchResponse {
    SearchResponse {
        results: vec![result("cited")],
        summary: Some(Summary {
            text: text.into(),
            turn_id: Some(turn_id.into()),
            conversation_id: Some(conversation_id.into()),
            factual_consistency: None,
        }),
    }
}

/// Streamed equivalent of [`summary_response`], one fragment per piece
pub fn summary_stream(
    pieces: &[&str],
    turn_id: &str,
    conversation_id: &str,
) -> Vec<Result<StreamEvent, SearchError>> {
    let mut events = vec![Ok(StreamEvent::Results(vec![result("cited")]))];
    events.extend(
        pieces
            .iter()
            .map(|piece| Ok(StreamEvent::Fragment((*piece).to_string()))),
    );
    events.push(Ok(StreamEvent::Chat {
        conversation_id: Some(conversation_id.into()),
        turn_id: Some(turn_id.into()),
    }));
    events.push(Ok(StreamEvent::End));
    events
}

/// Wait until a published snapshot satisfies `pred`
pub async fn wait_until<F>(
    rx: &mut watch::Receiver<ConversationSnapshot>,
    pred: F,
) -> ConversationSnapshot
where
    F: FnMut(&ConversationSnapshot) -> bool,
{
    let snapshot = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(pred))
        .await
        .expect("timed out waiting for snapshot")
        .expect("store dropped")
        .clone();
    snapshot
}
