//! Pure turn transition function
//!
//! `pending -> streaming -> resolved | errored`, and `errored -> pending` when
//! the user retries. Given the same inputs it always produces the same turn.

use super::state::{Turn, TurnPhase, TurnResolution};
use thiserror::Error;

/// Things that happen to the turn being answered
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    StreamStarted,
    Fragment(String),
    Resolved(TurnResolution),
    Failed,
    Retried,
}

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Turn is not streaming, cannot apply fragment")]
    NotStreaming,
    #[error("Turn is already {0:?}")]
    AlreadySettled(TurnPhase),
    #[error("Only a failed turn can be retried (turn is {0:?})")]
    NotErrored(TurnPhase),
    #[error("Stream already started")]
    AlreadyStreaming,
}

/// Apply `event` to `turn`, returning the next turn
///
/// # Errors
///
/// Returns a [`TransitionError`] when the event is not valid in the turn's
/// current phase.
pub fn transition(turn: &Turn, event: TurnEvent) -> Result<Turn, TransitionError> {
    match (turn.phase, event) {
        (TurnPhase::Pending, TurnEvent::StreamStarted) => Ok(Turn {
            phase: TurnPhase::Streaming,
            ..turn.clone()
        }),

        (TurnPhase::Streaming, TurnEvent::StreamStarted) => Err(TransitionError::AlreadyStreaming),

        // Arrival order, no reordering or dedup
        (TurnPhase::Streaming, TurnEvent::Fragment(text)) => {
            let mut next = turn.clone();
            next.answer.push_str(&text);
            Ok(next)
        }

        (TurnPhase::Pending, TurnEvent::Fragment(_)) => Err(TransitionError::NotStreaming),

        // The resolution is authoritative: it replaces any streamed text
        (TurnPhase::Pending | TurnPhase::Streaming, TurnEvent::Resolved(resolution)) => Ok(Turn {
            id: resolution.turn_id,
            question: turn.question.clone(),
            answer: resolution.answer,
            results: resolution.results,
            phase: TurnPhase::Resolved,
            factual_consistency: resolution.factual_consistency,
        }),

        // Partial answers are dropped; only the question survives for retry
        (TurnPhase::Pending | TurnPhase::Streaming, TurnEvent::Failed) => Ok(Turn {
            phase: TurnPhase::Errored,
            ..Turn::placeholder(turn.question.clone())
        }),

        (TurnPhase::Errored, TurnEvent::Retried) => Ok(Turn::placeholder(turn.question.clone())),

        (phase, TurnEvent::Retried) => Err(TransitionError::NotErrored(phase)),

        (phase @ (TurnPhase::Resolved | TurnPhase::Errored), _) => {
            Err(TransitionError::AlreadySettled(phase))
        }
    }
}
