//! Single-writer conversation store
//!
//! Every mutation runs under one lock, checks the caller's generation, and
//! publishes a fresh snapshot to watchers.

use super::state::{ConversationSnapshot, Turn, TurnPhase, TurnResolution};
use super::transition::{transition, TransitionError, TurnEvent};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::watch;

/// Identifies the conversation a request was issued in. `reset` moves the
/// store to a new generation, which turns every older ticket stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Generation(u64);

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Request belongs to a conversation that has been reset")]
    Stale,
    #[error("No turn is being answered")]
    NoActiveTurn,
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

#[derive(Debug, Default)]
#[allow(clippy::struct_excessive_bools)] // Flags mirror the published snapshot
struct StoreInner {
    /// All turns; the last one is the active turn while `active` is set
    turns: Vec<Turn>,
    active: bool,
    conversation_id: Option<String>,
    is_loading: bool,
    is_streaming: bool,
    has_error: bool,
    last_error: Option<String>,
    generation: u64,
}

impl StoreInner {
    fn snapshot(&self) -> ConversationSnapshot {
        let (history, active_turn) = match (self.active, self.turns.split_last()) {
            (true, Some((last, rest))) => (rest.to_vec(), Some(last.clone())),
            _ => (self.turns.clone(), None),
        };
        ConversationSnapshot {
            history,
            active_turn,
            conversation_id: self.conversation_id.clone(),
            is_loading: self.is_loading,
            is_streaming: self.is_streaming,
            has_error: self.has_error,
            last_error: self.last_error.clone(),
        }
    }

    /// Feed an event to the active turn, which is always the last element
    fn advance_active(&mut self, event: TurnEvent) -> Result<(), StoreError> {
        if !self.active {
            return Err(StoreError::NoActiveTurn);
        }
        let turn = self.turns.last_mut().ok_or(StoreError::NoActiveTurn)?;
        *turn = transition(turn, event)?;
        Ok(())
    }

    fn settle(&mut self) {
        self.active = false;
        self.is_loading = false;
        self.is_streaming = false;
    }
}

pub struct ConversationStore {
    inner: Mutex<StoreInner>,
    tx: watch::Sender<ConversationSnapshot>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConversationSnapshot::default());
        Self {
            inner: Mutex::new(StoreInner::default()),
            tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // Mutations never panic mid-update, so a poisoned lock still holds
        // consistent state
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &StoreInner) {
        self.tx.send_replace(inner.snapshot());
    }

    /// Apply `f` if `generation` is current, then publish
    fn update<F>(&self, generation: Generation, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut StoreInner) -> Result<(), StoreError>,
    {
        let mut inner = self.lock();
        if inner.generation != generation.0 {
            tracing::debug!(
                stale = %generation,
                current = inner.generation,
                "Dropping update from a reset conversation"
            );
            return Err(StoreError::Stale);
        }
        f(&mut *inner)?;
        self.publish(&inner);
        Ok(())
    }

    #[must_use]
    pub fn snapshot(&self) -> ConversationSnapshot {
        self.lock().snapshot()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConversationSnapshot> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn generation(&self) -> Generation {
        Generation(self.lock().generation)
    }

    #[must_use]
    pub fn conversation_id(&self) -> Option<String> {
        self.lock().conversation_id.clone()
    }

    /// Conversation id as seen by a request of `generation`
    ///
    /// # Errors
    ///
    /// [`StoreError::Stale`] once the conversation has been reset.
    pub fn conversation_id_at(&self, generation: Generation) -> Result<Option<String>, StoreError> {
        let inner = self.lock();
        if inner.generation != generation.0 {
            return Err(StoreError::Stale);
        }
        Ok(inner.conversation_id.clone())
    }

    /// Insert an empty turn for `question` and mark the store loading.
    /// Returns `None`, changing nothing, while another turn is loading.
    #[must_use]
    pub fn append_placeholder(&self, question: &str) -> Option<Generation> {
        let mut inner = self.lock();
        if inner.is_loading || inner.active {
            return None;
        }
        inner.turns.push(Turn::placeholder(question));
        inner.active = true;
        inner.is_loading = true;
        inner.has_error = false;
        inner.last_error = None;
        self.publish(&inner);
        Some(Generation(inner.generation))
    }

    /// Reopen the failed last turn. Returns its question, or `None` when
    /// there is nothing to retry.
    #[must_use]
    pub fn begin_retry(&self) -> Option<(Generation, String)> {
        let mut inner = self.lock();
        if inner.is_loading || inner.active {
            return None;
        }
        let last = inner.turns.last_mut()?;
        if last.phase != TurnPhase::Errored {
            return None;
        }
        let question = last.question.clone();
        *last = transition(last, TurnEvent::Retried).ok()?;
        inner.active = true;
        inner.is_loading = true;
        inner.has_error = false;
        inner.last_error = None;
        self.publish(&inner);
        Some((Generation(inner.generation), question))
    }

    /// Move the active turn to streaming
    ///
    /// # Errors
    ///
    /// [`StoreError::Stale`] after a reset, [`StoreError::NoActiveTurn`] or a
    /// transition error when no pending turn is active.
    pub fn begin_streaming(&self, generation: Generation) -> Result<(), StoreError> {
        self.update(generation, |inner| {
            inner.advance_active(TurnEvent::StreamStarted)?;
            inner.is_streaming = true;
            Ok(())
        })
    }

    /// Append answer text to the streaming turn
    ///
    /// # Errors
    ///
    /// Same as [`Self::begin_streaming`].
    pub fn apply_fragment(&self, generation: Generation, text: &str) -> Result<(), StoreError> {
        self.update(generation, |inner| {
            inner.advance_active(TurnEvent::Fragment(text.to_string()))
        })
    }

    /// Fold the active turn into history at its own position
    ///
    /// # Errors
    ///
    /// Same as [`Self::begin_streaming`].
    pub fn finalize_turn(
        &self,
        generation: Generation,
        resolution: TurnResolution,
    ) -> Result<(), StoreError> {
        self.update(generation, |inner| {
            let conversation_id = resolution.conversation_id.clone();
            inner.advance_active(TurnEvent::Resolved(resolution))?;
            if conversation_id.is_some() {
                inner.conversation_id = conversation_id;
            }
            inner.settle();
            Ok(())
        })
    }

    /// Fail the active turn. Flags are cleared even if the turn itself
    /// cannot transition, so the UI never stays stuck loading.
    ///
    /// # Errors
    ///
    /// Only [`StoreError::Stale`].
    pub fn mark_error(&self, generation: Generation, message: &str) -> Result<(), StoreError> {
        self.update(generation, |inner| {
            if let Err(e) = inner.advance_active(TurnEvent::Failed) {
                tracing::warn!(error = %e, "Could not mark turn as failed");
            }
            inner.settle();
            inner.has_error = true;
            inner.last_error = Some(message.to_string());
            Ok(())
        })
    }

    /// Forget the conversation. Outstanding requests become stale.
    pub fn reset(&self) {
        let mut inner = self.lock();
        let generation = inner.generation + 1;
        *inner = StoreInner {
            generation,
            ..StoreInner::default()
        };
        self.publish(&inner);
    }
}
