//! Turns summary events into a turn resolution
//!
//! Both the batch and the streaming path feed the same assembler, so a
//! batch response and its streamed equivalent resolve identically.

use super::state::TurnResolution;
use crate::search::{FragmentStream, SearchError, SearchResponse, SearchResult, StreamEvent};
use futures::stream::{BoxStream, StreamExt};

/// What the caller should apply after an event
#[derive(Debug, Clone, PartialEq)]
pub enum AssemblyUpdate {
    /// Append to the visible answer
    Fragment(String),
    /// Stream finished; fold this into history
    Complete(TurnResolution),
}

#[derive(Debug)]
pub struct StreamAssembler {
    answer: String,
    results: Vec<SearchResult>,
    turn_id: Option<String>,
    conversation_id: Option<String>,
    factual_consistency: Option<f32>,
    finished: bool,
}

impl StreamAssembler {
    /// `fallback_results` are the retrieval-phase results, used when the
    /// summary carries no result set of its own.
    #[must_use]
    pub fn new(fallback_results: Vec<SearchResult>) -> Self {
        Self {
            answer: String::new(),
            results: fallback_results,
            turn_id: None,
            conversation_id: None,
            factual_consistency: None,
            finished: false,
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    #[must_use]
    pub fn answer(&self) -> &str {
        &self.answer
    }

    /// Feed one event. Events after the terminal one are ignored.
    ///
    /// # Errors
    ///
    /// A terminal event without a turn id is a malformed response.
    pub fn push(&mut self, event: StreamEvent) -> Result<Option<AssemblyUpdate>, SearchError> {
        if self.finished {
            return Ok(None);
        }
        match event {
            StreamEvent::Results(results) => {
                if !results.is_empty() {
                    self.results = results;
                }
                Ok(None)
            }
            StreamEvent::Fragment(text) => {
                if text.is_empty() {
                    return Ok(None);
                }
                self.answer.push_str(&text);
                Ok(Some(AssemblyUpdate::Fragment(text)))
            }
            StreamEvent::Chat {
                conversation_id,
                turn_id,
            } => {
                if conversation_id.is_some() {
                    self.conversation_id = conversation_id;
                }
                if turn_id.is_some() {
                    self.turn_id = turn_id;
                }
                Ok(None)
            }
            StreamEvent::FactualConsistency(score) => {
                self.factual_consistency = Some(score);
                Ok(None)
            }
            StreamEvent::End => self.finish().map(|r| Some(AssemblyUpdate::Complete(r))),
        }
    }

    /// Close the turn.
    ///
    /// # Errors
    ///
    /// Fails when the server never sent a turn id.
    pub fn finish(&mut self) -> Result<TurnResolution, SearchError> {
        self.finished = true;
        let turn_id = self
            .turn_id
            .take()
            .ok_or_else(|| SearchError::malformed("Summary finished without a turn id"))?;
        Ok(TurnResolution {
            turn_id,
            answer: std::mem::take(&mut self.answer),
            results: std::mem::take(&mut self.results),
            conversation_id: self.conversation_id.take(),
            factual_consistency: self.factual_consistency.take(),
        })
    }

    /// Resolve a batch response by replaying it as stream events
    ///
    /// # Errors
    ///
    /// A response without a summary or turn id is malformed.
    pub fn from_response(
        response: SearchResponse,
        fallback_results: Vec<SearchResult>,
    ) -> Result<TurnResolution, SearchError> {
        let summary = response
            .summary
            .ok_or_else(|| SearchError::malformed("Response has no summary"))?;

        let mut assembler = Self::new(fallback_results);
        let events = [
            StreamEvent::Results(response.results),
            StreamEvent::Fragment(summary.text),
            StreamEvent::Chat {
                conversation_id: summary.conversation_id,
                turn_id: summary.turn_id,
            },
        ]
        .into_iter()
        .chain(summary.factual_consistency.map(StreamEvent::FactualConsistency))
        .chain(std::iter::once(StreamEvent::End));

        for event in events {
            if let Some(AssemblyUpdate::Complete(resolution)) = assembler.push(event)? {
                return Ok(resolution);
            }
        }
        Err(SearchError::malformed("Response did not complete"))
    }

    /// Drive a fragment stream. The returned stream ends after exactly one
    /// `Complete` or one error; a source that closes early is an interruption.
    #[must_use]
    pub fn updates(
        self,
        mut source: FragmentStream,
    ) -> BoxStream<'static, Result<AssemblyUpdate, SearchError>> {
        let mut assembler = self;
        async_stream::stream! {
            while let Some(event) = source.next().await {
                let update = event.and_then(|event| assembler.push(event));
                match update {
                    Ok(None) => {}
                    Ok(Some(AssemblyUpdate::Complete(resolution))) => {
                        yield Ok(AssemblyUpdate::Complete(resolution));
                        return;
                    }
                    Ok(Some(update)) => yield Ok(update),
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
            yield Err(SearchError::interrupted("Stream closed before its final event"));
        }
        .boxed()
    }
}
