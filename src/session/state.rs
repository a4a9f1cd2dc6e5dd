//! Conversation state types

use crate::search::SearchResult;
use serde::{Deserialize, Serialize};

/// Turn id used until the server assigns one
pub const PENDING_TURN_ID: &str = "0";

/// Where a turn is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    /// Submitted, waiting on retrieval or a batch summary
    #[default]
    Pending,
    /// Answer fragments are being applied
    Streaming,
    Resolved,
    /// Failed; kept so the question can be retried
    Errored,
}

impl TurnPhase {
    #[must_use]
    pub fn is_settled(self) -> bool {
        matches!(self, TurnPhase::Resolved | TurnPhase::Errored)
    }
}

/// One question/answer exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,
    pub question: String,
    pub answer: String,
    pub results: Vec<SearchResult>,
    pub phase: TurnPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factual_consistency: Option<f32>,
}

impl Turn {
    /// Optimistic entry shown the moment a question is submitted
    #[must_use]
    pub fn placeholder(question: impl Into<String>) -> Self {
        Self {
            id: PENDING_TURN_ID.to_string(),
            question: question.into(),
            answer: String::new(),
            results: Vec::new(),
            phase: TurnPhase::Pending,
            factual_consistency: None,
        }
    }
}

/// Final data for a turn, from either the batch or the streaming path
#[derive(Debug, Clone, PartialEq)]
pub struct TurnResolution {
    pub turn_id: String,
    pub answer: String,
    pub results: Vec<SearchResult>,
    /// `None` keeps whatever conversation id is already known
    pub conversation_id: Option<String>,
    pub factual_consistency: Option<f32>,
}

impl TurnResolution {
    /// Resolution for a question that retrieved nothing
    #[must_use]
    pub fn empty() -> Self {
        Self {
            turn_id: PENDING_TURN_ID.to_string(),
            answer: String::new(),
            results: Vec::new(),
            conversation_id: None,
            factual_consistency: None,
        }
    }
}

/// Read-only view handed to the rendering layer
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConversationSnapshot {
    /// Settled turns, oldest first
    pub history: Vec<Turn>,
    pub active_turn: Option<Turn>,
    pub conversation_id: Option<String>,
    pub is_loading: bool,
    pub is_streaming: bool,
    pub has_error: bool,
    pub last_error: Option<String>,
}

impl ConversationSnapshot {
    /// True when the last turn failed and can be sent again
    #[must_use]
    pub fn can_retry(&self) -> bool {
        self.has_error
            && !self.is_loading
            && self
                .history
                .last()
                .is_some_and(|turn| turn.phase == TurnPhase::Errored)
    }

    /// Total turns, settled or not
    #[must_use]
    pub fn turn_count(&self) -> usize {
        self.history.len() + usize::from(self.active_turn.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder() {
        let turn = Turn::placeholder("What is RAG?");
        assert_eq!(turn.id, PENDING_TURN_ID);
        assert_eq!(turn.question, "What is RAG?");
        assert!(turn.answer.is_empty());
        assert!(turn.results.is_empty());
        assert_eq!(turn.phase, TurnPhase::Pending);
    }

    #[test]
    fn test_can_retry_needs_errored_last_turn() {
        let mut errored = Turn::placeholder("q");
        errored.phase = TurnPhase::Errored;
        let mut snapshot = ConversationSnapshot {
            history: vec![errored],
            has_error: true,
            ..ConversationSnapshot::default()
        };
        assert!(snapshot.can_retry());

        snapshot.is_loading = true;
        assert!(!snapshot.can_retry());
    }

    #[test]
    fn test_phase_serializes_snake_case() {
        let json = serde_json::to_string(&TurnPhase::Streaming).unwrap();
        assert_eq!(json, "\"streaming\"");
    }
}
