//! Chat session controller
//!
//! Runs one turn at a time: retrieval, then summarize (batch or streamed),
//! with every state change going through the [`ConversationStore`].

use super::assembler::{AssemblyUpdate, StreamAssembler};
use super::state::{ConversationSnapshot, TurnResolution};
use super::store::{ConversationStore, Generation, StoreError};
use crate::config::SessionConfig;
use crate::search::{SearchClient, SearchError, SearchReply, SummaryLanguage};
use futures::StreamExt;
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Per-send options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Re-send the failed last turn instead of asking a new question
    pub is_retry: bool,
    /// Overrides the session's default summary language
    pub language: Option<SummaryLanguage>,
}

impl SendOptions {
    #[must_use]
    pub fn retry() -> Self {
        Self {
            is_retry: true,
            language: None,
        }
    }

    /// Answer in `language` instead of the session default; `None` keeps
    /// the default
    #[must_use]
    pub fn with_language(mut self, language: Option<SummaryLanguage>) -> Self {
        self.language = language;
        self
    }
}

/// How a send ended
#[derive(Debug)]
pub enum SendOutcome {
    /// Nothing was sent: a turn is in flight, the question is blank, or
    /// there is no failed turn to retry
    Ignored,
    Answered,
    /// Retrieval found nothing, so no summary was requested
    NoResults,
    /// The turn was marked as failed and can be retried
    Failed(SearchError),
    /// A new conversation was started while the turn was in flight
    Cancelled,
}

/// Why a turn stopped early
enum TurnFailure {
    Search(SearchError),
    Store(StoreError),
}

impl From<SearchError> for TurnFailure {
    fn from(e: SearchError) -> Self {
        TurnFailure::Search(e)
    }
}

impl From<StoreError> for TurnFailure {
    fn from(e: StoreError) -> Self {
        TurnFailure::Store(e)
    }
}

pub struct ChatSessionController<C: SearchClient> {
    config: SessionConfig,
    client: C,
    store: ConversationStore,
    /// Cancels the turn in flight, replaced for every new turn
    cancel: Mutex<CancellationToken>,
}

impl<C: SearchClient> ChatSessionController<C> {
    #[must_use]
    pub fn new(config: SessionConfig, client: C) -> Self {
        Self {
            config,
            client,
            store: ConversationStore::new(),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn snapshot(&self) -> ConversationSnapshot {
        self.store.snapshot()
    }

    /// Receive a snapshot after every state change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConversationSnapshot> {
        self.store.subscribe()
    }

    /// Re-send the question of the failed last turn
    pub async fn retry(&self) -> SendOutcome {
        self.send_message("", SendOptions::retry()).await
    }

    /// Drop the conversation and cancel whatever is in flight. Configuration
    /// is kept.
    pub fn start_new_conversation(&self) {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
        self.store.reset();
        tracing::info!(generation = %self.store.generation(), "Started new conversation");
    }

    /// Ask a question, or with `is_retry` re-ask the failed one.
    /// `question` is ignored for retries.
    pub async fn send_message(&self, question: &str, options: SendOptions) -> SendOutcome {
        let (generation, question) = if options.is_retry {
            let Some(ticket) = self.store.begin_retry() else {
                tracing::debug!("No failed turn to retry");
                return SendOutcome::Ignored;
            };
            ticket
        } else {
            if question.trim().is_empty() {
                return SendOutcome::Ignored;
            }
            let Some(generation) = self.store.append_placeholder(question) else {
                tracing::debug!("Turn already in flight, ignoring question");
                return SendOutcome::Ignored;
            };
            (generation, question.to_string())
        };

        let cancel = {
            let mut current = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
            *current = CancellationToken::new();
            current.clone()
        };

        let span = tracing::info_span!(
            "turn",
            trace_id = %Uuid::new_v4(),
            generation = %generation,
            retry = options.is_retry,
        );

        async move {
            tracing::info!(question_len = question.len(), "Sending question");
            let start = std::time::Instant::now();

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => Err(TurnFailure::Store(StoreError::Stale)),
                result = self.run_turn(generation, &question, options.language) => result,
            };

            let outcome = self.settle(generation, result);
            tracing::info!(
                duration_ms = %start.elapsed().as_millis(),
                outcome = ?outcome,
                "Turn finished"
            );
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run_turn(
        &self,
        generation: Generation,
        question: &str,
        language: Option<SummaryLanguage>,
    ) -> Result<SendOutcome, TurnFailure> {
        let retrieval = self
            .client
            .send(&self.config.retrieval_request(question))
            .await?
            .into_complete()?;

        if retrieval.results.is_empty() {
            tracing::info!("Retrieval returned no results");
            self.store.finalize_turn(generation, TurnResolution::empty())?;
            return Ok(SendOutcome::NoResults);
        }
        tracing::debug!(results = retrieval.results.len(), "Retrieval complete");

        let conversation_id = self.store.conversation_id_at(generation)?;
        let request = self
            .config
            .summary_request(question, language, conversation_id);

        let resolution = match self.client.send(&request).await? {
            SearchReply::Complete(response) => {
                StreamAssembler::from_response(response, retrieval.results)?
            }
            SearchReply::Stream(stream) => {
                self.store.begin_streaming(generation)?;
                let mut updates = StreamAssembler::new(retrieval.results).updates(stream);
                let mut resolution = None;
                while let Some(update) = updates.next().await {
                    match update? {
                        AssemblyUpdate::Fragment(text) => {
                            self.store.apply_fragment(generation, &text)?;
                        }
                        AssemblyUpdate::Complete(complete) => {
                            resolution = Some(complete);
                            break;
                        }
                    }
                }
                resolution.ok_or_else(|| {
                    SearchError::interrupted("Stream closed before its final event")
                })?
            }
        };

        self.store.finalize_turn(generation, resolution)?;
        Ok(SendOutcome::Answered)
    }

    /// Record a failed turn in the store and pick the outcome
    fn settle(
        &self,
        generation: Generation,
        result: Result<SendOutcome, TurnFailure>,
    ) -> SendOutcome {
        let error = match result {
            Ok(outcome) => return outcome,
            Err(TurnFailure::Store(StoreError::Stale)) => return SendOutcome::Cancelled,
            Err(TurnFailure::Search(e)) => e,
            Err(TurnFailure::Store(e)) => {
                tracing::warn!(error = %e, "Store rejected turn update");
                SearchError::malformed(format!("Inconsistent turn state: {e}"))
            }
        };

        tracing::warn!(
            error = %error.message,
            kind = error.kind.as_str(),
            status = ?error.status,
            "Turn failed"
        );
        match self.store.mark_error(generation, &error.message) {
            Err(StoreError::Stale) => SendOutcome::Cancelled,
            _ => SendOutcome::Failed(error),
        }
    }
}
